//! Vertex weight groups, their transfer onto proxies, and normalization.
//!
//! Weights and shape deltas are defined against base mesh vertices. A
//! proxy's [`ReverseMap`] lists, for each base vertex, the proxy vertices
//! that blend it in; transfer multiplies through those entries and merges
//! duplicates with a sort-then-accumulate pass so the result does not
//! depend on source line order.

use std::collections::{BTreeMap, HashMap};

use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::name_table::NameTable;
use crate::proxy::{ProxyType, ReverseMap};

/// Skin weights at or below this are dropped.
pub const WEIGHT_EPSILON: f64 = 1e-4;

/// Shape deltas with squared length at or below this are dropped.
pub const SHAPE_EPSILON: f64 = 1e-8;

/// Bone name -> weight group, in declaration order.
pub type WeightTable = NameTable<WeightGroup>;

/// A list of `(vertex, weight)` pairs.
///
/// May hold duplicate vertices until [`WeightGroup::fix`] merges them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeightGroup(Vec<(usize, f64)>);

impl WeightGroup {
    /// Creates an empty group.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one contribution.
    pub fn push(&mut self, vertex: usize, weight: f64) {
        self.0.push((vertex, weight));
    }

    /// The raw pairs.
    pub fn entries(&self) -> &[(usize, f64)] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Appends every pair of `other`.
    pub fn extend_from(&mut self, other: &WeightGroup) {
        self.0.extend_from_slice(&other.0);
    }

    /// Merges duplicate vertices and drops weights at or below [`WEIGHT_EPSILON`].
    ///
    /// The result is sorted by vertex index with unique indices.
    pub fn fix(&self) -> WeightGroup {
        let mut sorted = self.0.clone();
        sorted.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.total_cmp(&b.1)));

        let mut fixed: Vec<(usize, f64)> = Vec::with_capacity(sorted.len());
        let mut current: Option<(usize, f64)> = None;
        for (v, w) in sorted {
            current = match current {
                Some((cv, cw)) if cv == v => Some((cv, cw + w)),
                Some(done) => {
                    if done.1 > WEIGHT_EPSILON {
                        fixed.push(done);
                    }
                    Some((v, w))
                }
                None => Some((v, w)),
            };
        }
        if let Some(done) = current {
            if done.1 > WEIGHT_EPSILON {
                fixed.push(done);
            }
        }
        WeightGroup(fixed)
    }
}

impl FromIterator<(usize, f64)> for WeightGroup {
    fn from_iter<I: IntoIterator<Item = (usize, f64)>>(iter: I) -> Self {
        WeightGroup(iter.into_iter().collect())
    }
}

impl From<Vec<(usize, f64)>> for WeightGroup {
    fn from(pairs: Vec<(usize, f64)>) -> Self {
        WeightGroup(pairs)
    }
}

/// A named morph target: vertex -> displacement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShapeTarget {
    pub name: String,
    pub deltas: BTreeMap<usize, DVec3>,
}

impl ShapeTarget {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            deltas: BTreeMap::new(),
        }
    }
}

/// Transfers base-mesh weight groups onto proxy vertices.
///
/// A contribution is kept only when `bone weight * reference weight`
/// exceeds [`WEIGHT_EPSILON`]. Groups left empty are omitted.
pub fn transfer_weights(raw: &WeightTable, reverse: &ReverseMap) -> WeightTable {
    let mut out = WeightTable::new();
    for (bone, group) in raw.iter() {
        let mut vgroup = WeightGroup::new();
        for &(v, wt) in group.entries() {
            for &(pv, w) in reverse.get(v) {
                let pw = w * wt;
                if pw > WEIGHT_EPSILON {
                    vgroup.push(pv, pw);
                }
            }
        }
        if vgroup.is_empty() {
            continue;
        }
        let fixed = vgroup.fix();
        if !fixed.is_empty() {
            out.insert(bone, fixed);
        }
    }
    out
}

/// Transfers base-mesh shape targets onto proxy vertices, scaling every delta.
///
/// Only proxy types that [receive shapes](ProxyType::receives_shapes) get
/// any; others yield an empty list. Targets with no surviving delta are
/// omitted.
pub fn transfer_shapes(
    raw: &[ShapeTarget],
    reverse: &ReverseMap,
    proxy_type: ProxyType,
    scale: f64,
) -> Vec<ShapeTarget> {
    if !proxy_type.receives_shapes() {
        return Vec::new();
    }
    let mut shapes = Vec::new();
    for target in raw {
        let mut contributions: Vec<(usize, DVec3)> = Vec::new();
        for (&v, &delta) in &target.deltas {
            for &(pv, w) in reverse.get(v) {
                contributions.push((pv, delta * (scale * w)));
            }
        }
        if contributions.is_empty() {
            continue;
        }
        shapes.push(ShapeTarget {
            name: target.name.clone(),
            deltas: fix_shape(contributions),
        });
    }
    shapes
}

/// Sums deltas per vertex and drops those at or below [`SHAPE_EPSILON`] squared length.
fn fix_shape(mut contributions: Vec<(usize, DVec3)>) -> BTreeMap<usize, DVec3> {
    contributions.sort_by(|a, b| {
        a.0.cmp(&b.0)
            .then(a.1.x.total_cmp(&b.1.x))
            .then(a.1.y.total_cmp(&b.1.y))
            .then(a.1.z.total_cmp(&b.1.z))
    });
    let mut sums: BTreeMap<usize, DVec3> = BTreeMap::new();
    for (pv, d) in contributions {
        *sums.entry(pv).or_insert(DVec3::ZERO) += d;
    }
    sums.retain(|_, d| d.length_squared() > SHAPE_EPSILON);
    sums
}

/// Divides every contribution by its vertex's total weight across all groups.
///
/// Vertices whose total is zero lose their contributions; groups that
/// end up empty are kept so bone names stay addressable.
pub fn normalize(table: &mut WeightTable) {
    let mut totals: HashMap<usize, f64> = HashMap::new();
    for group in table.values() {
        for &(v, w) in group.entries() {
            *totals.entry(v).or_insert(0.0) += w;
        }
    }
    for group in table.values_mut() {
        group.0 = group
            .0
            .iter()
            .filter_map(|&(v, w)| {
                let total = totals.get(&v).copied().unwrap_or(0.0);
                (total != 0.0).then(|| (v, w / total))
            })
            .collect();
    }
}

/// Drops vertices not in `keep` and renumbers the rest densely.
///
/// `keep[v]` is true for surviving base vertices. Groups left empty are
/// omitted.
pub fn remap_weights(table: &WeightTable, keep: &[bool]) -> WeightTable {
    let mut new_index = vec![None; keep.len()];
    let mut next = 0;
    for (v, &k) in keep.iter().enumerate() {
        if k {
            new_index[v] = Some(next);
            next += 1;
        }
    }
    let mut out = WeightTable::new();
    for (bone, group) in table.iter() {
        let remapped: WeightGroup = group
            .entries()
            .iter()
            .filter_map(|&(v, w)| new_index.get(v).copied().flatten().map(|nv| (nv, w)))
            .collect();
        if !remapped.is_empty() {
            out.insert(bone, remapped);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_fix_merges_and_prunes() {
        let group = WeightGroup::from(vec![(5, 0.3), (5, 0.4), (2, 0.00001)]);
        let fixed = group.fix();
        assert_eq!(fixed.len(), 1);
        assert_eq!(fixed.entries()[0].0, 5);
        assert!((fixed.entries()[0].1 - 0.7).abs() < 1e-12);
    }

    #[test]
    fn test_fix_is_order_independent() {
        let a = WeightGroup::from(vec![(3, 0.1), (1, 0.2), (3, 0.7), (1, 0.05)]).fix();
        let b = WeightGroup::from(vec![(1, 0.05), (3, 0.7), (1, 0.2), (3, 0.1)]).fix();
        assert_eq!(a, b);
        assert_eq!(a.entries().iter().map(|e| e.0).collect::<Vec<_>>(), vec![1, 3]);
    }

    fn reverse_map() -> ReverseMap {
        let mut reverse = ReverseMap::new();
        // proxy vertex 0 sits on base vertex 10; proxy vertex 1 blends 10 and 11
        reverse.add(10, 0, 1.0);
        reverse.add(10, 1, 0.5);
        reverse.add(11, 1, 0.5);
        reverse
    }

    #[test]
    fn test_transfer_weights() {
        let mut raw = WeightTable::new();
        raw.insert("spine", WeightGroup::from(vec![(10, 1.0), (11, 0.5)]));
        raw.insert("untouched", WeightGroup::from(vec![(99, 1.0)]));
        raw.insert("below_eps", WeightGroup::from(vec![(11, 0.0001)]));

        let out = transfer_weights(&raw, &reverse_map());
        assert_eq!(out.keys().collect::<Vec<_>>(), vec!["spine"]);
        let spine = out.get("spine").unwrap().entries();
        assert_eq!(spine[0], (0, 1.0));
        assert_eq!(spine[1].0, 1);
        assert!((spine[1].1 - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_transfer_shapes_scales_and_prunes() {
        let mut target = ShapeTarget::new("smile");
        target.deltas.insert(10, DVec3::new(0.2, 0.0, 0.0));
        target.deltas.insert(11, DVec3::new(1e-6, 0.0, 0.0));
        let mut empty = ShapeTarget::new("nothing");
        empty.deltas.insert(50, DVec3::X);

        let shapes = transfer_shapes(&[target, empty], &reverse_map(), ProxyType::Clothes, 0.5);
        assert_eq!(shapes.len(), 1);
        assert_eq!(shapes[0].name, "smile");
        let d0 = shapes[0].deltas[&0];
        assert!(d0.abs_diff_eq(DVec3::new(0.1, 0.0, 0.0), 1e-12));
        assert!(shapes[0].deltas.contains_key(&1));
    }

    #[test]
    fn test_shapes_limited_to_clothes_and_proxy() {
        // Hair and eyes never receive morph deltas.
        let mut target = ShapeTarget::new("smile");
        target.deltas.insert(10, DVec3::Y);
        let reverse = reverse_map();
        for proxy_type in [ProxyType::Hair, ProxyType::Eyes, ProxyType::Cage, ProxyType::Converter] {
            assert!(transfer_shapes(&[target.clone()], &reverse, proxy_type, 1.0).is_empty());
        }
        assert_eq!(transfer_shapes(&[target.clone()], &reverse, ProxyType::Proxy, 1.0).len(), 1);
    }

    #[test]
    fn test_normalize() {
        let mut table = WeightTable::new();
        table.insert("a", WeightGroup::from(vec![(0, 0.2), (1, 3.0), (2, 0.0)]));
        table.insert("b", WeightGroup::from(vec![(0, 0.6)]));
        normalize(&mut table);

        let mut sums: BTreeMap<usize, f64> = BTreeMap::new();
        for group in table.values() {
            for &(v, w) in group.entries() {
                assert!(w.is_finite());
                *sums.entry(v).or_default() += w;
            }
        }
        assert!((sums[&0] - 1.0).abs() < 1e-12);
        assert!((sums[&1] - 1.0).abs() < 1e-12);
        assert!(!sums.contains_key(&2));
    }

    #[test]
    fn test_remap_weights() {
        let mut table = WeightTable::new();
        table.insert("a", WeightGroup::from(vec![(0, 1.0), (2, 0.5), (3, 0.25)]));
        table.insert("b", WeightGroup::from(vec![(1, 1.0)]));
        let keep = [true, false, true, true];

        let out = remap_weights(&table, &keep);
        assert_eq!(out.get("a").unwrap().entries(), &[(0, 1.0), (1, 0.5), (2, 0.25)]);
        assert!(!out.contains("b"));
    }
}
