//! Joint resolution against the base mesh.

use std::collections::HashMap;

use glam::DVec3;

use super::graph::topological_order;
use super::table::{JointRef, JointSpec, RigDefinition};
use crate::error::{ReferenceKind, RigError, RigResult};
use crate::math::plane_normal;
use crate::mesh::BaseMesh;
use crate::name_table::NameTable;

/// Concrete joint positions and plane normals for one base mesh.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedJoints {
    positions: HashMap<String, DVec3>,
    normals: HashMap<String, DVec3>,
}

impl ResolvedJoints {
    /// Position of joint `name`.
    pub fn position(&self, name: &str) -> Option<DVec3> {
        self.positions.get(name).copied()
    }

    /// Unit normal of plane `name`, `None` for unknown or degenerate planes.
    pub fn normal(&self, name: &str) -> Option<DVec3> {
        self.normals.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Resolves a bone endpoint, naming `referrer` when the joint is missing.
    pub fn endpoint(&self, joint: &JointRef, referrer: &str) -> RigResult<DVec3> {
        let base = self
            .position(joint.joint())
            .ok_or_else(|| RigError::UnknownJoint {
                joint: joint.joint().to_string(),
                referrer: referrer.to_string(),
            })?;
        Ok(match joint {
            JointRef::Named(_) => base,
            JointRef::Offset(_, offset) => base + DVec3::from_array(*offset),
        })
    }

    /// Scales every position; normals are unchanged.
    pub fn rescale(&mut self, scale: f64) {
        for p in self.positions.values_mut() {
            *p *= scale;
        }
    }
}

/// Evaluates every joint and plane of `def` against `mesh`.
///
/// Joints are resolved in dependency order. A later definition of a name
/// replaces an earlier one.
pub fn resolve_joints(def: &RigDefinition, mesh: &dyn BaseMesh) -> RigResult<ResolvedJoints> {
    let mut table: NameTable<&JointSpec> = NameTable::new();
    for joint in &def.joints {
        table.insert(joint.name.as_str(), &joint.spec);
    }

    let specs: Vec<(&str, &JointSpec)> = table.iter().map(|(name, spec)| (name, *spec)).collect();
    let nodes: Vec<(&str, Vec<&str>)> = specs
        .iter()
        .map(|(name, spec)| (*name, spec.dependencies()))
        .collect();
    let order = topological_order(&nodes, ReferenceKind::Joint, |joint, referrer| {
        RigError::UnknownJoint {
            joint: joint.to_string(),
            referrer: referrer.to_string(),
        }
    })?;

    let mut resolved = ResolvedJoints::default();
    for i in order {
        let (name, spec) = specs[i];
        let position = evaluate(name, spec, mesh, &resolved.positions)?;
        resolved.positions.insert(name.to_string(), position);
    }

    for plane in &def.planes {
        let mut points = [DVec3::ZERO; 3];
        for (p, joint) in points.iter_mut().zip(plane.joints.iter()) {
            *p = resolved
                .position(joint)
                .ok_or_else(|| RigError::UnknownJoint {
                    joint: joint.clone(),
                    referrer: plane.name.clone(),
                })?;
        }
        match plane_normal(points[0], points[1], points[2]) {
            Some(n) => {
                resolved.normals.insert(plane.name.clone(), n);
            }
            None => log::warn!("plane '{}' is degenerate, rolls using it stay at 0", plane.name),
        }
    }

    log::debug!(
        "resolved {} joints and {} planes",
        resolved.positions.len(),
        resolved.normals.len()
    );
    Ok(resolved)
}

fn evaluate(
    name: &str,
    spec: &JointSpec,
    mesh: &dyn BaseMesh,
    done: &HashMap<String, DVec3>,
) -> RigResult<DVec3> {
    let context = || format!("joint '{}'", name);
    let joint = |other: &str| -> RigResult<DVec3> {
        done.get(other).copied().ok_or_else(|| RigError::UnknownJoint {
            joint: other.to_string(),
            referrer: name.to_string(),
        })
    };

    Ok(match spec {
        JointSpec::Vertex(v) => mesh.coord_checked(*v, &context())?,
        JointSpec::VertexOffset { vertex, offset } => {
            mesh.coord_checked(*vertex, &context())? + DVec3::from_array(*offset)
        }
        JointSpec::VertexList(terms) => {
            let mut sum = DVec3::ZERO;
            for (w, v) in terms {
                sum += *w * mesh.coord_checked(*v, &context())?;
            }
            sum
        }
        JointSpec::Joint(other) => joint(other)?,
        JointSpec::Lerp(terms) => {
            let mut sum = DVec3::ZERO;
            for (w, other) in terms {
                sum += *w * joint(other)?;
            }
            sum
        }
        JointSpec::Offset { joint: other, offset } => joint(other)? + DVec3::from_array(*offset),
        JointSpec::Position { x, y, z } => DVec3::new(joint(x)?.x, joint(y)?.y, joint(z)?.z),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::VertexBuffer;
    use crate::rig::table::{JointDef, PlaneDef};

    fn mesh() -> VertexBuffer {
        VertexBuffer::from_arrays(&[
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 2.0, 0.0],
            [0.0, 0.0, 4.0],
        ])
    }

    fn joint(name: &str, spec: JointSpec) -> JointDef {
        JointDef {
            name: name.to_string(),
            spec,
        }
    }

    #[test]
    fn test_all_kinds() {
        let def = RigDefinition {
            joints: vec![
                // declared before its dependencies
                joint("mid", JointSpec::Lerp(vec![(0.5, "a".into()), (0.5, "b".into())])),
                joint("a", JointSpec::Vertex(1)),
                joint("b", JointSpec::VertexOffset { vertex: 2, offset: [0.0, 0.0, 1.0] }),
                joint("c", JointSpec::VertexList(vec![(0.25, 3), (0.5, 1)])),
                joint("alias", JointSpec::Joint("c".into())),
                joint("up", JointSpec::Offset { joint: "a".into(), offset: [0.0, 1.0, 0.0] }),
                joint(
                    "pick",
                    JointSpec::Position { x: "a".into(), y: "b".into(), z: "c".into() },
                ),
            ],
            ..Default::default()
        };
        let joints = resolve_joints(&def, &mesh()).unwrap();

        assert_eq!(joints.len(), 7);
        assert_eq!(joints.position("a"), Some(DVec3::new(1.0, 0.0, 0.0)));
        assert_eq!(joints.position("b"), Some(DVec3::new(0.0, 2.0, 1.0)));
        assert_eq!(joints.position("mid"), Some(DVec3::new(0.5, 1.0, 0.5)));
        assert_eq!(joints.position("c"), Some(DVec3::new(0.5, 0.0, 1.0)));
        assert_eq!(joints.position("alias"), joints.position("c"));
        assert_eq!(joints.position("up"), Some(DVec3::new(1.0, 1.0, 0.0)));
        assert_eq!(joints.position("pick"), Some(DVec3::new(1.0, 2.0, 1.0)));
    }

    #[test]
    fn test_later_definition_wins() {
        let def = RigDefinition {
            joints: vec![joint("a", JointSpec::Vertex(1)), joint("a", JointSpec::Vertex(3))],
            ..Default::default()
        };
        let joints = resolve_joints(&def, &mesh()).unwrap();
        assert_eq!(joints.position("a"), Some(DVec3::new(0.0, 0.0, 4.0)));
    }

    #[test]
    fn test_cycle_is_fatal() {
        let def = RigDefinition {
            joints: vec![
                joint("a", JointSpec::Joint("b".into())),
                joint("b", JointSpec::Lerp(vec![(1.0, "a".into())])),
            ],
            ..Default::default()
        };
        let err = resolve_joints(&def, &mesh()).unwrap_err();
        assert_eq!(err.code(), "RIG_004");
        assert!(err.to_string().contains("a -> b -> a"));
    }

    #[test]
    fn test_unknown_joint_names_referrer() {
        let def = RigDefinition {
            joints: vec![joint("a", JointSpec::Joint("missing".into()))],
            ..Default::default()
        };
        let err = resolve_joints(&def, &mesh()).unwrap_err();
        assert_eq!(err.to_string(), "unknown joint 'missing' referenced by 'a'");
    }

    #[test]
    fn test_vertex_out_of_range() {
        let def = RigDefinition {
            joints: vec![joint("far", JointSpec::Vertex(40))],
            ..Default::default()
        };
        let err = resolve_joints(&def, &mesh()).unwrap_err();
        assert_eq!(err.code(), "RIG_006");
        assert!(err.to_string().contains("joint 'far'"));
    }

    #[test]
    fn test_planes() {
        let def = RigDefinition {
            joints: vec![
                joint("o", JointSpec::Vertex(0)),
                joint("x", JointSpec::Vertex(1)),
                joint("y", JointSpec::Vertex(2)),
            ],
            planes: vec![
                PlaneDef { name: "PlaneZ".into(), joints: ["o".into(), "x".into(), "y".into()] },
                PlaneDef { name: "Flat".into(), joints: ["o".into(), "o".into(), "x".into()] },
            ],
            ..Default::default()
        };
        let joints = resolve_joints(&def, &mesh()).unwrap();
        assert!(joints.normal("PlaneZ").unwrap().abs_diff_eq(DVec3::Z, 1e-12));
        assert!(joints.normal("Flat").is_none());

        let bad = RigDefinition {
            planes: vec![PlaneDef { name: "P".into(), joints: ["o".into(), "x".into(), "q".into()] }],
            ..def
        };
        let err = resolve_joints(&bad, &mesh()).unwrap_err();
        assert_eq!(err.to_string(), "unknown joint 'q' referenced by 'P'");
    }

    #[test]
    fn test_endpoint_offset() {
        let def = RigDefinition {
            joints: vec![joint("a", JointSpec::Vertex(1))],
            ..Default::default()
        };
        let joints = resolve_joints(&def, &mesh()).unwrap();
        let p = joints
            .endpoint(&JointRef::Offset("a".into(), [0.0, 0.5, 0.0]), "bone")
            .unwrap();
        assert_eq!(p, DVec3::new(1.0, 0.5, 0.0));

        let err = joints.endpoint(&JointRef::from("zz"), "hand.L").unwrap_err();
        assert_eq!(err.to_string(), "unknown joint 'zz' referenced by 'hand.L'");
    }
}
