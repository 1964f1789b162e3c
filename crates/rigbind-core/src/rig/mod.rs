//! Skeletal armatures built from declarative rig tables.
//!
//! [`RigDefinition`] holds the static tables, [`ArmatureBuilder`] runs the
//! build phases against a base mesh and [`Locale`] renames the result for
//! a target rig convention.

mod armature;
mod bone;
mod flags;
mod graph;
mod joints;
mod locale;
mod options;
mod pose;
mod retarget;
mod table;


pub use armature::{Armature, ArmatureBuilder, BuildPhase};
pub use bone::{Bone, BoneConstraint};
pub use flags::{BoneFlags, Layers};
pub use joints::{resolve_joints, ResolvedJoints};
pub use locale::{Locale, DEFORM_PREFIX};
pub use options::RigOptions;
pub use pose::ReferencePose;
pub use table::{
    BoneDef, BoneGroup, JointDef, JointRef, JointSpec, MergeGroups, MergeTable, PlaneDef,
    RigDefinition, RigFeature, RollSpec, SplitDef,
};
