//! Fixed reference pose applied when computing bind matrices.

use std::path::Path;

use glam::DQuat;

use crate::error::RigResult;
use crate::name_table::NameTable;

/// Per-bone rotations, keyed by the bone's declared name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReferencePose {
    rotations: NameTable<DQuat>,
}

impl ReferencePose {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the rotation for `bone` from `[w, x, y, z]`.
    ///
    /// The quaternion is normalized; a zero quaternion means no rotation.
    pub fn insert(&mut self, bone: impl Into<String>, wxyz: [f64; 4]) {
        let [w, x, y, z] = wxyz;
        let q = DQuat::from_xyzw(x, y, z, w);
        let q = if q.length_squared() > 0.0 {
            q.normalize()
        } else {
            DQuat::IDENTITY
        };
        self.rotations.insert(bone, q);
    }

    /// Parses `[[name, [w, x, y, z]], ...]`.
    pub fn from_json(json: &str) -> RigResult<Self> {
        let entries: Vec<(String, [f64; 4])> = serde_json::from_str(json)?;
        let mut pose = Self::new();
        for (bone, wxyz) in entries {
            pose.insert(bone, wxyz);
        }
        Ok(pose)
    }

    pub fn from_file(path: &Path) -> RigResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn get(&self, bone: &str) -> Option<DQuat> {
        self.rotations.get(bone).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DQuat)> {
        self.rotations.iter()
    }

    pub fn len(&self) -> usize {
        self.rotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rotations.is_empty()
    }
}
