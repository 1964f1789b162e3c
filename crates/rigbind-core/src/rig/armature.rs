//! Armature construction in explicit phases.
//!
//! An [`Armature`] moves through [`BuildPhase`]s in order: joints are
//! resolved against the base mesh, bones are assigned heads and tails,
//! the retargeter may merge or split bones, then rest and bind matrices
//! are computed root to leaf. Each phase checks that the previous one ran
//! and fails with [`RigError::PhaseOrder`] otherwise.

use std::collections::HashMap;
use std::sync::Arc;

use glam::{DMat4, DVec3};

use super::bone::{Bone, BoneConstraint};
use super::flags::{BoneFlags, Layers};
use super::graph::topological_order;
use super::joints::{resolve_joints, ResolvedJoints};
use super::locale::{Locale, DEFORM_PREFIX};
use super::options::RigOptions;
use super::pose::ReferencePose;
use super::retarget::Retarget;
use super::table::{RigDefinition, RigFeature, RollSpec};
use crate::error::{ReferenceKind, RigError, RigResult};
use crate::math::{bind_correction, compute_roll, inverse_transform};
use crate::mesh::BaseMesh;
use crate::name_table::NameTable;
use crate::weights::{self, WeightTable};

/// Construction progress of an [`Armature`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BuildPhase {
    Empty,
    JointsResolved,
    BonesAssigned,
    RestResolved,
    BindResolved,
}

impl BuildPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildPhase::Empty => "empty",
            BuildPhase::JointsResolved => "joints-resolved",
            BuildPhase::BonesAssigned => "bones-assigned",
            BuildPhase::RestResolved => "rest-resolved",
            BuildPhase::BindResolved => "bind-resolved",
        }
    }
}

impl std::fmt::Display for BuildPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A bone hierarchy with its skin weights against the base mesh.
#[derive(Debug, Clone)]
pub struct Armature {
    pub name: String,
    pub options: RigOptions,
    pub(crate) bones: NameTable<Bone>,
    pub(crate) vertex_weights: WeightTable,
    pub(crate) is_normalized: bool,
    pub(crate) locale: Option<Arc<Locale>>,
    pub(crate) phase: BuildPhase,
    /// Declared names of merged and split bones -> where their weights went.
    pub(crate) retargets: HashMap<String, Retarget>,
    joints: Option<ResolvedJoints>,
    bind_matrix: Option<DMat4>,
    bind_inverse: Option<DMat4>,
}

impl Armature {
    /// Creates an empty armature.
    pub fn new(name: impl Into<String>, options: RigOptions) -> Self {
        Self {
            name: name.into(),
            options,
            bones: NameTable::new(),
            vertex_weights: WeightTable::new(),
            is_normalized: false,
            locale: None,
            phase: BuildPhase::Empty,
            retargets: HashMap::new(),
            joints: None,
            bind_matrix: None,
            bind_inverse: None,
        }
    }

    pub fn phase(&self) -> BuildPhase {
        self.phase
    }

    /// Bones in hierarchy order, parents first.
    pub fn bones(&self) -> &NameTable<Bone> {
        &self.bones
    }

    pub fn bone(&self, name: &str) -> Option<&Bone> {
        self.bones.get(name)
    }

    pub fn vertex_weights(&self) -> &WeightTable {
        &self.vertex_weights
    }

    pub fn is_normalized(&self) -> bool {
        self.is_normalized
    }

    /// The locale currently applied, `None` for declared names.
    pub fn locale(&self) -> Option<&Arc<Locale>> {
        self.locale.as_ref()
    }

    /// Joint positions, available from [`BuildPhase::JointsResolved`] on.
    pub fn joints(&self) -> Option<&ResolvedJoints> {
        self.joints.as_ref()
    }

    /// Armature-level bind correction.
    pub fn bind_matrix(&self) -> Option<&DMat4> {
        self.bind_matrix.as_ref()
    }

    pub fn bind_inverse(&self) -> Option<&DMat4> {
        self.bind_inverse.as_ref()
    }

    pub(crate) fn require(&self, operation: &'static str, expected: BuildPhase) -> RigResult<()> {
        if self.phase == expected {
            Ok(())
        } else {
            Err(self.phase_error(operation, expected))
        }
    }

    fn require_at_least(&self, operation: &'static str, expected: BuildPhase) -> RigResult<()> {
        if self.phase >= expected {
            Ok(())
        } else {
            Err(self.phase_error(operation, expected))
        }
    }

    fn phase_error(&self, operation: &'static str, expected: BuildPhase) -> RigError {
        RigError::PhaseOrder {
            operation,
            expected: expected.as_str(),
            found: self.phase.as_str(),
        }
    }

    /// Bone indices with every parent before its children.
    pub(crate) fn hierarchy_order(&self) -> RigResult<Vec<usize>> {
        let nodes: Vec<(&str, Vec<&str>)> = self
            .bones
            .iter()
            .map(|(name, bone)| (name, bone.parent.as_deref().into_iter().collect()))
            .collect();
        topological_order(&nodes, ReferenceKind::BoneParent, |bone, referrer| {
            RigError::UnknownBone {
                bone: bone.to_string(),
                referrer: referrer.to_string(),
            }
        })
    }

    // =========================================================================
    // Phases
    // =========================================================================

    /// Phase 1: evaluates the joint table against `mesh`.
    pub fn resolve_joints(&mut self, def: &RigDefinition, mesh: &dyn BaseMesh) -> RigResult<()> {
        self.require("resolve_joints", BuildPhase::Empty)?;
        self.joints = Some(resolve_joints(def, mesh)?);
        self.phase = BuildPhase::JointsResolved;
        log::debug!("armature '{}': joints resolved", self.name);
        Ok(())
    }

    /// Phase 2: creates bones from the enabled groups and copies the weight table.
    pub fn assign_bones(&mut self, def: &RigDefinition) -> RigResult<()> {
        self.require("assign_bones", BuildPhase::JointsResolved)?;
        let joints = self
            .joints
            .as_ref()
            .ok_or_else(|| self.phase_error("assign_bones", BuildPhase::JointsResolved))?;

        let mut bones: NameTable<Bone> = NameTable::new();
        for group in &def.groups {
            if group.requires == Some(RigFeature::Muscles) && !self.options.use_muscles {
                continue;
            }
            for bdef in &group.bones {
                let head = joints.endpoint(&bdef.head, &bdef.name)?;
                let tail = joints.endpoint(&bdef.tail, &bdef.name)?;
                let roll = match &bdef.roll {
                    RollSpec::Angle(angle) => *angle,
                    RollSpec::Plane(plane) => match joints.normal(plane) {
                        Some(normal) => compute_roll(head, tail, normal),
                        None if def.planes.iter().any(|p| &p.name == plane) => 0.0,
                        None => {
                            return Err(RigError::UnknownJoint {
                                joint: plane.clone(),
                                referrer: bdef.name.clone(),
                            })
                        }
                    },
                };

                let mut bone = Bone::new(bdef.name.as_str(), head, tail, roll);
                bone.parent = bdef.parent.clone();
                bone.flags = bdef.flags;
                bone.layers = bdef.layers;
                bone.lock_location = lock_location(bone.parent.is_some(), bone.flags);
                bone.constraints = bdef
                    .constraints
                    .iter()
                    .filter(|c| self.options.use_rotation_limits || !c.is_rotation_limit())
                    .cloned()
                    .collect();
                bones.insert(bdef.name.as_str(), bone);
            }
        }

        for (name, bone) in bones.iter() {
            if let Some(parent) = &bone.parent {
                if !bones.contains(parent) {
                    return Err(RigError::UnknownBone {
                        bone: parent.clone(),
                        referrer: name.to_string(),
                    });
                }
            }
        }

        if self.options.add_connecting_bones {
            let added = add_connecting_bones(&mut bones)?;
            log::debug!("armature '{}': {} connecting bones added", self.name, added);
        }
        if self.options.use_master_bone {
            add_master_bone(&mut bones)?;
        }

        self.bones = bones;
        self.reorder_bones()?;

        let mut vertex_weights = def.vertex_weights.clone();
        if self.options.use_deform_bones {
            self.add_deform_bones()?;
            if self.options.use_deform_names {
                vertex_weights = vertex_weights
                    .into_iter()
                    .map(|(name, group)| {
                        let deform = format!("{}{}", DEFORM_PREFIX, name);
                        if self.bones.contains(&deform) {
                            (deform, group)
                        } else {
                            (name, group)
                        }
                    })
                    .collect();
            }
        }
        vertex_weights.retain(|name, _| {
            let known = self.bones.contains(name);
            if !known {
                log::debug!("dropping weight group '{}': no such bone", name);
            }
            known
        });
        self.vertex_weights = vertex_weights;
        self.is_normalized = false;

        self.phase = BuildPhase::BonesAssigned;
        log::debug!(
            "armature '{}': {} bones assigned, {} weight groups",
            self.name,
            self.bones.len(),
            self.vertex_weights.len()
        );
        Ok(())
    }

    /// Rebuilds the bone table in hierarchy order, failing on parent cycles.
    pub(crate) fn reorder_bones(&mut self) -> RigResult<()> {
        let order = self.hierarchy_order()?;
        let mut slots: Vec<Option<(String, Bone)>> =
            std::mem::take(&mut self.bones).into_entries().into_iter().map(Some).collect();
        self.bones = order
            .into_iter()
            .filter_map(|i| slots[i].take())
            .collect();
        Ok(())
    }

    /// Adds a `DEF-` copy of every deforming bone.
    ///
    /// The copy follows its control bone through a transform constraint and
    /// is parented to the copy of the control's parent when that parent
    /// deforms too. The control bone stops deforming.
    fn add_deform_bones(&mut self) -> RigResult<()> {
        let deforming: Vec<String> = self
            .bones
            .iter()
            .filter(|(name, bone)| bone.is_deform() && !name.starts_with(DEFORM_PREFIX))
            .map(|(name, _)| name.to_string())
            .collect();

        let mut copies = Vec::with_capacity(deforming.len());
        for name in &deforming {
            let Some(bone) = self.bones.get(name) else { continue };
            let deform_name = format!("{}{}", DEFORM_PREFIX, name);
            let mut copy = Bone::new(deform_name.as_str(), bone.head, bone.tail, bone.roll);
            copy.flags = bone.flags.for_deform_copy();
            copy.layers = Layers::DEFORM;
            copy.parent = bone.parent.as_ref().map(|parent| {
                if deforming.contains(parent) {
                    format!("{}{}", DEFORM_PREFIX, parent)
                } else {
                    parent.clone()
                }
            });
            copy.lock_location = lock_location(copy.parent.is_some(), copy.flags);
            copy.constraints = vec![BoneConstraint::Transform {
                subtarget: name.clone(),
            }];
            copies.push((deform_name, copy));
        }
        for name in &deforming {
            if let Some(bone) = self.bones.get_mut(name) {
                bone.flags.remove(BoneFlags::DEF);
            }
        }
        for (name, copy) in copies {
            self.bones.insert(name, copy);
        }
        log::debug!("armature '{}': {} deform bones added", self.name, deforming.len());
        self.reorder_bones()
    }

    /// Phase 3: rest matrices and parent-relative matrices, root to leaf.
    pub fn resolve_rest_matrices(&mut self) -> RigResult<()> {
        self.require("resolve_rest_matrices", BuildPhase::BonesAssigned)?;
        let order = self.hierarchy_order()?;
        let mut rests: HashMap<String, DMat4> = HashMap::with_capacity(order.len());
        let names: Vec<String> = self.bones.keys().map(str::to_string).collect();

        for i in order {
            let name = &names[i];
            let Some(bone) = self.bones.get_mut(name) else { continue };
            let rest = bone.build_rest_matrix();
            let relative = match bone.parent.as_ref().and_then(|p| rests.get(p)) {
                Some(parent_rest) => inverse_transform(parent_rest) * rest,
                None => rest,
            };
            bone.matrix_rest = Some(rest);
            bone.matrix_relative = Some(relative);
            rests.insert(name.clone(), rest);
        }

        self.phase = BuildPhase::RestResolved;
        log::debug!("armature '{}': rest matrices resolved", self.name);
        Ok(())
    }

    /// Phase 4: bind matrices, optionally under a reference pose.
    ///
    /// A bone listed in `pose` gets its relative matrix recomputed against
    /// the parent's posed rest matrix; other bones keep the relative matrix
    /// of phase 3. Pose entries are matched against declared bone names.
    pub fn resolve_bind_matrices(&mut self, pose: Option<&ReferencePose>) -> RigResult<()> {
        self.require("resolve_bind_matrices", BuildPhase::RestResolved)?;
        if let Some(pose) = pose {
            for (name, _) in pose.iter() {
                if !self.bones.values().any(|b| b.orig_name == name) {
                    return Err(RigError::UnknownReferencePoseBone {
                        bone: name.to_string(),
                    });
                }
            }
        }

        let correction = bind_correction();
        let order = self.hierarchy_order()?;
        let names: Vec<String> = self.bones.keys().map(str::to_string).collect();
        let mut posed_rests: HashMap<String, DMat4> = HashMap::with_capacity(order.len());

        for i in order {
            let name = &names[i];
            let Some(bone) = self.bones.get_mut(name) else { continue };
            let rest = *bone.rest_matrix()?;
            let rotation = pose.and_then(|p| p.get(&bone.orig_name));
            let posed = match rotation {
                Some(q) => rest * DMat4::from_quat(q),
                None => rest,
            };
            if rotation.is_some() {
                bone.matrix_relative = Some(match bone.parent.as_ref().and_then(|p| posed_rests.get(p)) {
                    Some(parent_posed) => inverse_transform(parent_posed) * posed,
                    None => rest,
                });
            }
            let bind = correction * posed;
            bone.matrix_posed_rest = Some(posed);
            bone.bind_inverse = Some(inverse_transform(&bind));
            bone.bind_matrix = Some(bind);
            posed_rests.insert(name.clone(), posed);
        }

        self.bind_matrix = Some(correction);
        self.bind_inverse = Some(inverse_transform(&correction));
        self.phase = BuildPhase::BindResolved;
        log::debug!(
            "armature '{}': bind matrices resolved{}",
            self.name,
            if pose.is_some() { " with reference pose" } else { "" }
        );
        Ok(())
    }

    /// Runs phases 3 and 4 again, e.g. after [`rescale`](Self::rescale).
    pub fn rebuild_matrices(&mut self, pose: Option<&ReferencePose>) -> RigResult<()> {
        self.resolve_rest_matrices()?;
        self.resolve_bind_matrices(pose)
    }

    /// Scales heads, tails and lengths and clears every matrix.
    ///
    /// The armature drops back to [`BuildPhase::BonesAssigned`].
    pub fn rescale(&mut self, scale: f64) -> RigResult<()> {
        self.require_at_least("rescale", BuildPhase::BonesAssigned)?;
        for bone in self.bones.values_mut() {
            bone.set_endpoints(bone.head * scale, bone.tail * scale);
            bone.clear_matrices();
        }
        if let Some(joints) = &mut self.joints {
            joints.rescale(scale);
        }
        self.bind_matrix = None;
        self.bind_inverse = None;
        self.phase = BuildPhase::BonesAssigned;
        log::debug!("armature '{}': rescaled by {}", self.name, scale);
        Ok(())
    }

    /// Makes every vertex's weights sum to one across all groups. Runs once.
    pub fn normalize_vertex_weights(&mut self) {
        if self.is_normalized {
            return;
        }
        weights::normalize(&mut self.vertex_weights);
        self.is_normalized = true;
    }
}

fn lock_location(parented: bool, flags: BoneFlags) -> [bool; 3] {
    [parented && !flags.contains(BoneFlags::NOLOCK); 3]
}

/// Name of the root bone added by `use_master_bone`.
pub const MASTER_BONE: &str = "master";

/// Suffix of the bones added by `add_connecting_bones`.
pub const LINK_SUFFIX: &str = ".link";

/// Heads closer than this to the parent's tail count as connected.
const CONNECT_EPSILON: f64 = 1e-6;

/// Bridges every gap between a parent's tail and a child's head.
///
/// The link bone runs from the parent's tail to the child's head and the
/// child becomes connected to it. Returns the number of links added.
fn add_connecting_bones(bones: &mut NameTable<Bone>) -> RigResult<usize> {
    let mut links = Vec::new();
    for (name, bone) in bones.iter() {
        let Some(parent_name) = bone.parent.as_deref() else { continue };
        let Some(parent) = bones.get(parent_name) else { continue };
        if bone.flags.contains(BoneFlags::CON) || parent.tail.distance(bone.head) < CONNECT_EPSILON {
            continue;
        }
        let link_name = format!("{}{}", name, LINK_SUFFIX);
        if bones.contains(&link_name) {
            return Err(RigError::NameCollision {
                name: link_name.clone(),
                first: link_name,
                second: name.to_string(),
            });
        }
        let mut link = Bone::new(link_name.as_str(), parent.tail, bone.head, bone.roll);
        link.parent = Some(parent_name.to_string());
        link.flags = BoneFlags::CON;
        link.layers = bone.layers;
        link.lock_location = lock_location(true, link.flags);
        links.push((name.to_string(), link));
    }

    let added = links.len();
    for (child, link) in links {
        let position = bones.position(&child).unwrap_or(bones.len());
        let link_name = link.name.clone();
        bones.insert_at(position, link_name.as_str(), link);
        if let Some(bone) = bones.get_mut(&child) {
            bone.parent = Some(link_name);
            bone.flags |= BoneFlags::CON;
        }
    }
    Ok(added)
}

/// Parents every root bone to a new [`MASTER_BONE`] at the origin.
fn add_master_bone(bones: &mut NameTable<Bone>) -> RigResult<()> {
    if let Some(existing) = bones.get(MASTER_BONE) {
        return Err(RigError::NameCollision {
            name: MASTER_BONE.to_string(),
            first: existing.name.clone(),
            second: MASTER_BONE.to_string(),
        });
    }
    for bone in bones.values_mut() {
        if bone.parent.is_none() {
            bone.parent = Some(MASTER_BONE.to_string());
            bone.lock_location = lock_location(true, bone.flags);
        }
    }
    let master = Bone::new(MASTER_BONE, DVec3::ZERO, DVec3::NEG_Z, 0.0);
    bones.insert_at(0, MASTER_BONE, master);
    Ok(())
}

/// Runs every build phase for one rig definition.
pub struct ArmatureBuilder<'a> {
    name: String,
    def: &'a RigDefinition,
    options: RigOptions,
    mesh: &'a dyn BaseMesh,
    reference_pose: Option<&'a ReferencePose>,
}

impl<'a> ArmatureBuilder<'a> {
    pub fn new(
        name: impl Into<String>,
        def: &'a RigDefinition,
        options: RigOptions,
        mesh: &'a dyn BaseMesh,
    ) -> Self {
        Self {
            name: name.into(),
            def,
            options,
            mesh,
            reference_pose: None,
        }
    }

    /// Uses `pose` for bind matrices.
    pub fn reference_pose(mut self, pose: &'a ReferencePose) -> Self {
        self.reference_pose = Some(pose);
        self
    }

    /// Builds the armature, normalizes its weights, then applies the
    /// options' locale.
    pub fn build(self) -> RigResult<Armature> {
        let mut amt = Armature::new(self.name, self.options);
        amt.resolve_joints(self.def, self.mesh)?;
        amt.assign_bones(self.def)?;

        let merges = amt.options.merge_table(self.def);
        if !merges.is_empty() {
            amt.apply_merges(&merges)?;
        }
        if amt.options.use_split_bones {
            amt.apply_splits(self.def, self.mesh)?;
        }
        amt.normalize_vertex_weights();

        amt.rebuild_matrices(self.reference_pose)?;

        if let Some(locale) = amt.options.locale.clone() {
            amt.rename(Some(locale))?;
        }
        log::debug!(
            "armature '{}' built: {} bones, {} weight groups",
            amt.name,
            amt.bones.len(),
            amt.vertex_weights.len()
        );
        Ok(amt)
    }
}
