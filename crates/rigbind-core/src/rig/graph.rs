//! Dependency ordering for joints and bone hierarchies.

use std::collections::{HashMap, VecDeque};

use crate::error::{ReferenceKind, RigError, RigResult};

/// Orders `nodes` so every node comes after the nodes it depends on.
///
/// `nodes` is a list of `(name, dependencies)`. Nodes without pending
/// dependencies are emitted in declaration order. A dependency naming no
/// node is reported through `unknown(dependency, referrer)`; leftover nodes
/// form a cycle, reported with its name chain.
pub(crate) fn topological_order<F>(
    nodes: &[(&str, Vec<&str>)],
    kind: ReferenceKind,
    unknown: F,
) -> RigResult<Vec<usize>>
where
    F: Fn(&str, &str) -> RigError,
{
    let index: HashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, (name, _))| (*name, i))
        .collect();

    let mut pending = vec![0usize; nodes.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    for (i, (name, deps)) in nodes.iter().enumerate() {
        for dep in deps {
            let Some(&d) = index.get(dep) else {
                return Err(unknown(*dep, *name));
            };
            pending[i] += 1;
            dependents[d].push(i);
        }
    }

    let mut queue: VecDeque<usize> = (0..nodes.len()).filter(|&i| pending[i] == 0).collect();
    let mut order = Vec::with_capacity(nodes.len());
    while let Some(i) = queue.pop_front() {
        order.push(i);
        for &dep in &dependents[i] {
            pending[dep] -= 1;
            if pending[dep] == 0 {
                queue.push_back(dep);
            }
        }
    }

    if order.len() < nodes.len() {
        return Err(RigError::CyclicReference {
            kind,
            chain: cycle_chain(nodes, &index, &pending),
        });
    }
    Ok(order)
}

/// Walks unresolved dependencies from the first stuck node until a name repeats.
fn cycle_chain(nodes: &[(&str, Vec<&str>)], index: &HashMap<&str, usize>, pending: &[usize]) -> String {
    let Some(start) = pending.iter().position(|&p| p > 0) else {
        return String::new();
    };
    let mut path: Vec<usize> = Vec::new();
    let mut seen: HashMap<usize, usize> = HashMap::new();
    let mut current = start;
    loop {
        if let Some(&at) = seen.get(&current) {
            let mut names: Vec<&str> = path[at..].iter().map(|&i| nodes[i].0).collect();
            names.push(nodes[current].0);
            return names.join(" -> ");
        }
        seen.insert(current, path.len());
        path.push(current);
        let next = nodes[current]
            .1
            .iter()
            .filter_map(|d| index.get(d).copied())
            .find(|&d| pending[d] > 0);
        match next {
            Some(d) => current = d,
            None => return nodes[current].0.to_string(),
        }
    }
}
