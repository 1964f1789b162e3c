//! Declarative rig tables.
//!
//! A [`RigDefinition`] is static data: joint expressions evaluated against
//! the base mesh, bone records referencing those joints, and the weight,
//! merge and split tables used by the retargeter. It is loaded once from
//! JSON and never mutated by a build.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::bone::BoneConstraint;
use super::flags::{BoneFlags, Layers};
use crate::error::RigResult;
use crate::name_table::NameTable;
use crate::weights::WeightTable;

/// One entry of the joint table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointDef {
    pub name: String,
    #[serde(flatten)]
    pub spec: JointSpec,
}

/// How a joint position is computed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JointSpec {
    /// A base mesh vertex.
    Vertex(usize),
    /// A base mesh vertex plus a fixed offset.
    VertexOffset { vertex: usize, offset: [f64; 3] },
    /// Weighted sum of base mesh vertices, `(weight, vertex)`.
    VertexList(Vec<(f64, usize)>),
    /// Alias of another joint.
    Joint(String),
    /// Weighted sum of named joints, `(weight, joint)`.
    Lerp(Vec<(f64, String)>),
    /// A named joint moved along a fixed direction.
    Offset { joint: String, offset: [f64; 3] },
    /// Takes x, y and z from three named joints.
    Position { x: String, y: String, z: String },
}

impl JointSpec {
    /// Names of the joints this expression reads, in order.
    pub fn dependencies(&self) -> Vec<&str> {
        match self {
            JointSpec::Vertex(_) | JointSpec::VertexOffset { .. } | JointSpec::VertexList(_) => {
                Vec::new()
            }
            JointSpec::Joint(name) => vec![name.as_str()],
            JointSpec::Lerp(terms) => terms.iter().map(|(_, n)| n.as_str()).collect(),
            JointSpec::Offset { joint, .. } => vec![joint.as_str()],
            JointSpec::Position { x, y, z } => vec![x.as_str(), y.as_str(), z.as_str()],
        }
    }
}

/// Three joints spanning a plane whose normal can orient a bone's roll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlaneDef {
    pub name: String,
    pub joints: [String; 3],
}

/// A bone endpoint: a joint, optionally displaced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JointRef {
    Named(String),
    Offset(String, [f64; 3]),
}

impl JointRef {
    /// The referenced joint.
    pub fn joint(&self) -> &str {
        match self {
            JointRef::Named(name) | JointRef::Offset(name, _) => name,
        }
    }
}

impl From<&str> for JointRef {
    fn from(name: &str) -> Self {
        JointRef::Named(name.to_string())
    }
}

/// Bone roll: an angle in radians or the name of a plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RollSpec {
    Angle(f64),
    Plane(String),
}

impl Default for RollSpec {
    fn default() -> Self {
        RollSpec::Angle(0.0)
    }
}

fn default_layers() -> Layers {
    Layers::MAIN
}

/// One record of a bone table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BoneDef {
    pub name: String,
    pub head: JointRef,
    pub tail: JointRef,
    #[serde(default)]
    pub roll: RollSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default)]
    pub flags: BoneFlags,
    #[serde(default = "default_layers")]
    pub layers: Layers,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<BoneConstraint>,
}

/// Option-gated features a bone group can depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RigFeature {
    Muscles,
}

/// A named set of bones, optionally enabled only with a feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BoneGroup {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires: Option<RigFeature>,
    pub bones: Vec<BoneDef>,
}

/// Replace one bone by a chain of `count` segments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SplitDef {
    pub bone: String,
    pub count: usize,
    /// Bone reparented to the last segment.
    pub child: String,
}

/// Merge table: target bone -> source bones folded into it.
pub type MergeTable = NameTable<Vec<String>>;

/// Predefined merge tables enabled by the `merge_*` options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MergeGroups {
    pub spine: MergeTable,
    pub shoulders: MergeTable,
    pub fingers: MergeTable,
    pub palms: MergeTable,
    pub head: MergeTable,
}

/// The full declarative description of a rig.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RigDefinition {
    pub name: String,
    pub joints: Vec<JointDef>,
    pub planes: Vec<PlaneDef>,
    pub groups: Vec<BoneGroup>,
    /// Canonical skin weights against the base mesh.
    pub vertex_weights: WeightTable,
    pub split_bones: Vec<SplitDef>,
    pub merge_groups: MergeGroups,
}

impl RigDefinition {
    /// Parses a rig definition from JSON.
    pub fn from_json(json: &str) -> RigResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads a rig definition file.
    pub fn from_file(path: &Path) -> RigResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Every bone record across all groups, in declaration order.
    pub fn all_bones(&self) -> impl Iterator<Item = &BoneDef> {
        self.groups.iter().flat_map(|g| g.bones.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_joint_spec_json() {
        let json = r#"[
            {"name": "pelvis", "vertex": 4372},
            {"name": "kneecap", "vertex_offset": {"vertex": 11223, "offset": [0, 0, 1]}},
            {"name": "palm", "vertex_list": [[0.5, 9906], [0.5, 10500]]},
            {"name": "hand-end", "joint": "finger-3-1"},
            {"name": "spine-23", "lerp": [[0.5, "spine-2"], [0.5, "spine-3"]]},
            {"name": "plane-foot", "offset": {"joint": "ankle", "offset": [0, -1, 0]}},
            {"name": "toe-2", "position": {"x": "foot-2", "y": "foot-1", "z": "foot-2"}}
        ]"#;
        let joints: Vec<JointDef> = serde_json::from_str(json).unwrap();
        assert_eq!(joints.len(), 7);
        assert_eq!(joints[0].spec, JointSpec::Vertex(4372));
        assert_eq!(
            joints[4].spec.dependencies(),
            vec!["spine-2", "spine-3"]
        );
        assert_eq!(joints[6].spec.dependencies(), vec!["foot-2", "foot-1", "foot-2"]);
        assert!(joints[2].spec.dependencies().is_empty());
    }

    #[test]
    fn test_bone_def_defaults() {
        let bone: BoneDef = serde_json::from_str(
            r#"{"name": "neck", "head": "neck", "tail": ["head", [0, 0.1, 0]], "parent": "chest"}"#,
        )
        .unwrap();
        assert_eq!(bone.head, JointRef::from("neck"));
        assert_eq!(bone.tail, JointRef::Offset("head".to_string(), [0.0, 0.1, 0.0]));
        assert_eq!(bone.roll, RollSpec::Angle(0.0));
        assert_eq!(bone.layers, Layers::MAIN);
        assert!(bone.flags.is_empty());

        let bone: BoneDef = serde_json::from_str(
            r#"{"name": "hand", "head": "a", "tail": "b", "roll": "PlaneHand", "flags": "DEF | CON"}"#,
        )
        .unwrap();
        assert_eq!(bone.roll, RollSpec::Plane("PlaneHand".to_string()));
        assert_eq!(bone.flags, BoneFlags::DEF | BoneFlags::CON);
    }

    #[test]
    fn test_rig_definition_rejects_unknown_fields() {
        let err = RigDefinition::from_json(r#"{"name": "x", "bonez": []}"#).unwrap_err();
        assert_eq!(err.code(), "RIG_010");
    }
}
