//! Base mesh geometry source.

use glam::DVec3;

use crate::error::{RigError, RigResult};

/// Read-only vertex coordinates of the base mesh.
pub trait BaseMesh {
    /// Number of addressable vertices.
    fn vertex_count(&self) -> usize;

    /// Coordinate of vertex `index`, `None` when out of range.
    fn coord(&self, index: usize) -> Option<DVec3>;

    /// Coordinate of vertex `index`, failing with context when out of range.
    fn coord_checked(&self, index: usize, context: &str) -> RigResult<DVec3> {
        self.coord(index).ok_or_else(|| RigError::VertexOutOfRange {
            index,
            count: self.vertex_count(),
            context: context.to_string(),
        })
    }
}

/// An owned array of vertex coordinates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VertexBuffer {
    coords: Vec<DVec3>,
}

impl VertexBuffer {
    /// Creates a buffer from coordinates.
    pub fn new(coords: Vec<DVec3>) -> Self {
        Self { coords }
    }

    /// Creates a buffer from single-precision positions (e.g. read from glTF).
    pub fn from_f32(positions: &[[f32; 3]]) -> Self {
        Self {
            coords: positions
                .iter()
                .map(|p| DVec3::new(p[0] as f64, p[1] as f64, p[2] as f64))
                .collect(),
        }
    }

    /// Creates a buffer from double-precision positions.
    pub fn from_arrays(positions: &[[f64; 3]]) -> Self {
        Self {
            coords: positions.iter().map(|p| DVec3::from_array(*p)).collect(),
        }
    }

    /// All coordinates in index order.
    pub fn coords(&self) -> &[DVec3] {
        &self.coords
    }

    /// Scales every coordinate uniformly.
    pub fn rescale(&mut self, scale: f64) {
        for co in &mut self.coords {
            *co *= scale;
        }
    }

    /// BLAKE3 hash of the coordinate data (hex string).
    ///
    /// Two buffers with bitwise identical coordinates share an identity.
    pub fn identity(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&(self.coords.len() as u64).to_le_bytes());
        for co in &self.coords {
            for value in co.to_array() {
                hasher.update(&value.to_le_bytes());
            }
        }
        hasher.finalize().to_hex().to_string()
    }
}

impl BaseMesh for VertexBuffer {
    fn vertex_count(&self) -> usize {
        self.coords.len()
    }

    fn coord(&self, index: usize) -> Option<DVec3> {
        self.coords.get(index).copied()
    }
}
