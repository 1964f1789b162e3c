//! Reference vertices binding proxy vertices to the base mesh.

use std::collections::HashMap;

use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::error::{RigError, RigResult};
use crate::mesh::BaseMesh;

/// One proxy vertex expressed against the base mesh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReferenceVertex {
    /// Bound to exactly one base vertex with weight 1 and no offset.
    Exact { vertex: usize },
    /// Weighted blend of three base vertices plus a scaled offset.
    Triple {
        vertices: [usize; 3],
        weights: [f64; 3],
        offset: DVec3,
        /// Per-axis calibration in effect when the line was read.
        scale: DVec3,
    },
}

impl ReferenceVertex {
    /// Base vertices contributing to this proxy vertex, with their weights.
    pub fn contributions(&self) -> Vec<(usize, f64)> {
        match self {
            ReferenceVertex::Exact { vertex } => vec![(*vertex, 1.0)],
            ReferenceVertex::Triple {
                vertices, weights, ..
            } => vertices.iter().copied().zip(weights.iter().copied()).collect(),
        }
    }

    /// Reconstructs the coordinate against the base mesh.
    pub fn coord(&self, mesh: &dyn BaseMesh) -> RigResult<DVec3> {
        self.coord_with(|v| mesh.coord_checked(v, "reference vertex"))
    }

    /// Reconstructs the coordinate with a caller-supplied vertex lookup.
    ///
    /// Used to read base coordinates through a converter proxy.
    pub fn coord_with<F>(&self, mut lookup: F) -> RigResult<DVec3>
    where
        F: FnMut(usize) -> RigResult<DVec3>,
    {
        match self {
            ReferenceVertex::Exact { vertex } => lookup(*vertex),
            ReferenceVertex::Triple {
                vertices,
                weights,
                offset,
                scale,
            } => {
                let mut co = DVec3::ZERO;
                for (v, w) in vertices.iter().zip(weights.iter()) {
                    co += *w * lookup(*v)?;
                }
                Ok(co + *scale * *offset)
            }
        }
    }
}

/// Base vertex -> contributing `(proxy vertex, weight)` pairs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReverseMap {
    entries: HashMap<usize, Vec<(usize, f64)>>,
}

impl ReverseMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `proxy_vertex` takes `weight` from `base_vertex`.
    pub fn add(&mut self, base_vertex: usize, proxy_vertex: usize, weight: f64) {
        self.entries
            .entry(base_vertex)
            .or_default()
            .push((proxy_vertex, weight));
    }

    /// Contributions recorded for a base vertex (empty if none).
    pub fn get(&self, base_vertex: usize) -> &[(usize, f64)] {
        self.entries
            .get(&base_vertex)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Number of base vertices with at least one contribution.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Parses one `verts` section line into a reference vertex.
///
/// One token gives an exact reference. Six tokens give a triple without
/// offset, nine or more a triple with offset. Every contribution is added
/// to `reverse` under `proxy_vertex`. Indices are checked against
/// `vertex_count`, the size of the mesh the proxy was authored on.
pub fn parse_reference_line(
    words: &[&str],
    proxy_vertex: usize,
    scale: DVec3,
    vertex_count: usize,
    reverse: &mut ReverseMap,
    source_name: &str,
    line: usize,
) -> RigResult<ReferenceVertex> {
    let index = |token: &str| -> RigResult<usize> {
        let v: usize = token.parse().map_err(|_| {
            RigError::malformed(
                source_name,
                line,
                format!("expected vertex index, found '{}'", token),
            )
        })?;
        if v >= vertex_count {
            return Err(RigError::malformed(
                source_name,
                line,
                format!(
                    "vertex index {} out of range for base mesh with {} vertices",
                    v, vertex_count
                ),
            ));
        }
        Ok(v)
    };
    let number = |token: &str| -> RigResult<f64> {
        token.parse().map_err(|_| {
            RigError::malformed(source_name, line, format!("expected number, found '{}'", token))
        })
    };

    let reference = match words.len() {
        1 => ReferenceVertex::Exact {
            vertex: index(words[0])?,
        },
        6 | 9.. => {
            let vertices = [index(words[0])?, index(words[1])?, index(words[2])?];
            let weights = [number(words[3])?, number(words[4])?, number(words[5])?];
            let offset = if words.len() >= 9 {
                DVec3::new(number(words[6])?, number(words[7])?, number(words[8])?)
            } else {
                DVec3::ZERO
            };
            ReferenceVertex::Triple {
                vertices,
                weights,
                offset,
                scale,
            }
        }
        n => {
            return Err(RigError::malformed(
                source_name,
                line,
                format!("reference vertex needs 1, 6 or 9 tokens, found {}", n),
            ))
        }
    };

    for (v, w) in reference.contributions() {
        reverse.add(v, proxy_vertex, w);
    }
    Ok(reference)
}
