//! Bones and bone constraints.

use glam::{DMat4, DVec3};
use serde::{Deserialize, Serialize};

use super::flags::{BoneFlags, Layers};
use crate::error::{RigError, RigResult};
use crate::math::bone_matrix;

/// A constraint attached to a bone.
///
/// Kinds carrying a `subtarget` name another bone of the same armature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum BoneConstraint {
    /// Copies the full transform of another bone.
    Transform { subtarget: String },
    /// Stretches toward another bone.
    StretchTo { subtarget: String },
    /// Points the bone's Y axis at another bone.
    TrackTo { subtarget: String },
    /// Inverse kinematics chain ending at this bone.
    Ik {
        subtarget: String,
        #[serde(default)]
        chain_count: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pole: Option<String>,
    },
    CopyRotation { subtarget: String },
    CopyLocation { subtarget: String },
    /// Per-axis rotation limits in radians, `None` leaves the axis free.
    LimitRotation {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        x: Option<[f64; 2]>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        y: Option<[f64; 2]>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        z: Option<[f64; 2]>,
    },
}

impl BoneConstraint {
    /// The bone this constraint targets, if any.
    pub fn subtarget(&self) -> Option<&str> {
        match self {
            BoneConstraint::Transform { subtarget }
            | BoneConstraint::StretchTo { subtarget }
            | BoneConstraint::TrackTo { subtarget }
            | BoneConstraint::Ik { subtarget, .. }
            | BoneConstraint::CopyRotation { subtarget }
            | BoneConstraint::CopyLocation { subtarget } => Some(subtarget),
            BoneConstraint::LimitRotation { .. } => None,
        }
    }

    /// Rewrites every bone name this constraint holds through `rename`.
    pub fn rename_targets(&mut self, rename: &mut dyn FnMut(&str) -> String) {
        match self {
            BoneConstraint::Transform { subtarget }
            | BoneConstraint::StretchTo { subtarget }
            | BoneConstraint::TrackTo { subtarget }
            | BoneConstraint::CopyRotation { subtarget }
            | BoneConstraint::CopyLocation { subtarget } => *subtarget = rename(subtarget),
            BoneConstraint::Ik { subtarget, pole, .. } => {
                *subtarget = rename(subtarget);
                if let Some(pole) = pole {
                    *pole = rename(pole);
                }
            }
            BoneConstraint::LimitRotation { .. } => {}
        }
    }

    pub fn is_rotation_limit(&self) -> bool {
        matches!(self, BoneConstraint::LimitRotation { .. })
    }
}

/// One bone of an [`Armature`](super::Armature).
///
/// Matrices are filled in by the build phases; reading one before its
/// phase ran fails with [`RigError::UnresolvedMatrix`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bone {
    pub name: String,
    /// Name the bone was declared with, before any locale.
    pub orig_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    pub head: DVec3,
    pub tail: DVec3,
    /// Radians about the head->tail axis.
    pub roll: f64,
    pub length: f64,
    pub flags: BoneFlags,
    pub layers: Layers,
    pub lock_location: [bool; 3],
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<BoneConstraint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) matrix_rest: Option<DMat4>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) matrix_relative: Option<DMat4>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) matrix_posed_rest: Option<DMat4>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) bind_matrix: Option<DMat4>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) bind_inverse: Option<DMat4>,
}

impl Bone {
    /// Creates a bone from its endpoints. Length is derived.
    pub fn new(name: impl Into<String>, head: DVec3, tail: DVec3, roll: f64) -> Self {
        let name = name.into();
        Self {
            orig_name: name.clone(),
            name,
            parent: None,
            head,
            tail,
            roll,
            length: head.distance(tail),
            flags: BoneFlags::empty(),
            layers: Layers::MAIN,
            lock_location: [false; 3],
            constraints: Vec::new(),
            matrix_rest: None,
            matrix_relative: None,
            matrix_posed_rest: None,
            bind_matrix: None,
            bind_inverse: None,
        }
    }

    pub fn is_deform(&self) -> bool {
        self.flags.contains(BoneFlags::DEF)
    }

    /// Unit vector from head to tail, zero for degenerate bones.
    pub fn axis(&self) -> DVec3 {
        (self.tail - self.head).normalize_or_zero()
    }

    /// Moves the endpoints and recomputes the length.
    pub fn set_endpoints(&mut self, head: DVec3, tail: DVec3) {
        self.head = head;
        self.tail = tail;
        self.length = head.distance(tail);
    }

    /// Rest matrix built from the current head, tail and roll.
    pub(crate) fn build_rest_matrix(&self) -> DMat4 {
        bone_matrix(self.head, self.tail, self.roll).1
    }

    pub(crate) fn clear_matrices(&mut self) {
        self.matrix_rest = None;
        self.matrix_relative = None;
        self.matrix_posed_rest = None;
        self.bind_matrix = None;
        self.bind_inverse = None;
    }

    fn matrix<'a>(&self, matrix: Option<&'a DMat4>, stage: &'static str) -> RigResult<&'a DMat4> {
        matrix.ok_or_else(|| RigError::UnresolvedMatrix {
            bone: self.name.clone(),
            stage,
        })
    }

    /// World-space rest transform.
    pub fn rest_matrix(&self) -> RigResult<&DMat4> {
        self.matrix(self.matrix_rest.as_ref(), "rest")
    }

    /// Rest transform relative to the parent's (posed) rest transform.
    pub fn relative_matrix(&self) -> RigResult<&DMat4> {
        self.matrix(self.matrix_relative.as_ref(), "relative")
    }

    /// Rest transform with the reference pose applied; equals the rest
    /// matrix when no pose entry targets this bone.
    pub fn posed_rest_matrix(&self) -> RigResult<&DMat4> {
        self.matrix(self.matrix_posed_rest.as_ref(), "posed rest")
    }

    pub fn bind_matrix(&self) -> RigResult<&DMat4> {
        self.matrix(self.bind_matrix.as_ref(), "bind")
    }

    pub fn bind_inverse(&self) -> RigResult<&DMat4> {
        self.matrix(self.bind_inverse.as_ref(), "bind inverse")
    }
}
