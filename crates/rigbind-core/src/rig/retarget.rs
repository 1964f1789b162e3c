//! Retargeting: bone renaming, merging and splitting.

use std::collections::HashMap;
use std::sync::Arc;

use glam::DVec3;

use super::armature::{Armature, BuildPhase};
use super::bone::Bone;
use super::flags::BoneFlags;
use super::locale::{Locale, DEFORM_PREFIX};
use super::table::{MergeTable, RigDefinition};
use crate::error::{RigError, RigResult};
use crate::mesh::BaseMesh;
use crate::name_table::NameTable;
use crate::weights::{WeightGroup, WeightTable};

/// Where the weights of a bone removed by the retargeter went.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Retarget {
    /// Folded into the bone with this declared name.
    Merged(String),
    /// Replaced by these segments, root first.
    Split(Vec<String>),
}

impl Armature {
    // =========================================================================
    // Renaming
    // =========================================================================

    /// Applies `locale` to every bone, parent reference, constraint target
    /// and weight group.
    ///
    /// Names are always derived from the declared names, so `None` restores
    /// them and applying the locale already in use does nothing.
    pub fn rename(&mut self, locale: Option<Arc<Locale>>) -> RigResult<()> {
        let same = match (&self.locale, &locale) {
            (None, None) => true,
            (Some(current), Some(next)) => current.id() == next.id(),
            _ => false,
        };
        if same {
            return Ok(());
        }

        // The whole map is checked before any table changes.
        let mut map: HashMap<String, String> = HashMap::with_capacity(self.bones.len());
        let mut taken: HashMap<String, String> = HashMap::with_capacity(self.bones.len());
        for (name, bone) in self.bones.iter() {
            let new_name = match &locale {
                Some(locale) => locale.rename(&bone.orig_name)?,
                None => bone.orig_name.clone(),
            };
            if let Some(first) = taken.get(&new_name) {
                return Err(RigError::NameCollision {
                    name: new_name,
                    first: first.clone(),
                    second: name.to_string(),
                });
            }
            taken.insert(new_name.clone(), name.to_string());
            map.insert(name.to_string(), new_name);
        }

        let lookup = |name: &str| -> String {
            map.get(name).cloned().unwrap_or_else(|| name.to_string())
        };

        let mut bones = NameTable::new();
        for (old, mut bone) in std::mem::take(&mut self.bones) {
            bone.name = lookup(old.as_str());
            bone.parent = bone.parent.as_deref().map(lookup);
            for constraint in &mut bone.constraints {
                constraint.rename_targets(&mut |target| lookup(target));
            }
            bones.insert(bone.name.clone(), bone);
        }
        self.bones = bones;

        let mut vertex_weights = WeightTable::new();
        for (old, group) in std::mem::take(&mut self.vertex_weights) {
            let new_name = match map.get(&old) {
                Some(new_name) => new_name.clone(),
                None => match &locale {
                    Some(locale) => locale.rename(&old)?,
                    None => old,
                },
            };
            match vertex_weights.get_mut(&new_name) {
                Some(existing) => {
                    existing.extend_from(&group);
                    *existing = existing.fix();
                }
                None => {
                    vertex_weights.insert(new_name, group);
                }
            }
        }
        self.vertex_weights = vertex_weights;

        log::debug!(
            "armature '{}': locale {} applied",
            self.name,
            locale.as_ref().map(|l| l.id()).unwrap_or("<none>")
        );
        self.locale = locale;
        Ok(())
    }

    // =========================================================================
    // Merging
    // =========================================================================

    /// Folds each table entry's source bones into its target bone.
    ///
    /// Sources that do not exist are skipped. When deform bones are in use
    /// the `DEF-` copies are merged the same way.
    pub fn apply_merges(&mut self, table: &MergeTable) -> RigResult<()> {
        self.require("apply_merges", BuildPhase::BonesAssigned)?;
        for (target, sources) in table.iter() {
            self.merge_into(target, sources)?;
            let deform_target = format!("{}{}", DEFORM_PREFIX, target);
            if self.options.use_deform_bones && self.bones.contains(&deform_target) {
                let deform_sources: Vec<String> = sources
                    .iter()
                    .map(|s| format!("{}{}", DEFORM_PREFIX, s))
                    .collect();
                self.merge_into(&deform_target, &deform_sources)?;
            }
        }
        self.reorder_bones()
    }

    fn merge_into(&mut self, target: &str, sources: &[String]) -> RigResult<()> {
        if !self.bones.contains(target) {
            return Err(RigError::UnknownBone {
                bone: target.to_string(),
                referrer: "merge table".to_string(),
            });
        }
        let sources: Vec<&str> = sources
            .iter()
            .map(String::as_str)
            .filter(|s| {
                let present = self.bones.contains(s) && *s != target;
                if !present {
                    log::debug!("merge into '{}': skipping missing bone '{}'", target, s);
                }
                present
            })
            .collect();
        if sources.is_empty() {
            return Ok(());
        }

        let mut group = self.vertex_weights.get(target).cloned().unwrap_or_default();
        for source in &sources {
            if let Some(source_group) = self.vertex_weights.remove(source) {
                group.extend_from(&source_group);
            }
        }
        let fixed = group.fix();
        if fixed.is_empty() {
            self.vertex_weights.remove(target);
        } else {
            self.vertex_weights.insert(target, fixed);
        }

        let last_tail = sources
            .last()
            .and_then(|s| self.bones.get(s))
            .map(|b| b.tail);

        // A target parented inside the merged chain climbs out of it.
        let mut target_parent = self.bones.get(target).and_then(|b| b.parent.clone());
        while let Some(parent) = target_parent.as_deref() {
            if !sources.contains(&parent) {
                break;
            }
            target_parent = self.bones.get(parent).and_then(|b| b.parent.clone());
        }

        for (name, bone) in self.bones.iter_mut() {
            if name == target {
                bone.parent = target_parent.clone();
                if let Some(tail) = last_tail {
                    bone.set_endpoints(bone.head, tail);
                }
            } else if bone.parent.as_deref().is_some_and(|p| sources.contains(&p)) {
                bone.parent = Some(target.to_string());
            }
            for constraint in &mut bone.constraints {
                constraint.rename_targets(&mut |name| {
                    if sources.contains(&name) {
                        target.to_string()
                    } else {
                        name.to_string()
                    }
                });
            }
        }
        let target_orig = self
            .bones
            .get(target)
            .map(|b| b.orig_name.clone())
            .unwrap_or_else(|| target.to_string());
        for source in &sources {
            if let Some(bone) = self.bones.remove(source) {
                self.retargets
                    .insert(bone.orig_name, Retarget::Merged(target_orig.clone()));
            }
        }
        log::debug!("merged {:?} into '{}'", sources, target);
        Ok(())
    }

    // =========================================================================
    // Splitting
    // =========================================================================

    /// Replaces each bone of the split table by a connected chain.
    ///
    /// Weights of a split bone go to the segment containing the vertex's
    /// projection onto the bone axis, measured on `mesh`.
    pub fn apply_splits(&mut self, def: &RigDefinition, mesh: &dyn BaseMesh) -> RigResult<()> {
        self.require("apply_splits", BuildPhase::BonesAssigned)?;
        for split in &def.split_bones {
            self.split_bone(&split.bone, split.count, Some(split.child.as_str()), mesh)?;
            let deform_bone = format!("{}{}", DEFORM_PREFIX, split.bone);
            if self.options.use_deform_bones && self.bones.contains(&deform_bone) {
                let deform_child = format!("{}{}", DEFORM_PREFIX, split.child);
                let deform_child = self.bones.contains(&deform_child).then_some(deform_child);
                self.split_bone(&deform_bone, split.count, deform_child.as_deref(), mesh)?;
            }
        }
        self.reorder_bones()
    }

    fn split_bone(
        &mut self,
        name: &str,
        count: usize,
        child: Option<&str>,
        mesh: &dyn BaseMesh,
    ) -> RigResult<()> {
        let Some(position) = self.bones.position(name) else {
            return Err(RigError::UnknownBone {
                bone: name.to_string(),
                referrer: "split table".to_string(),
            });
        };
        if let Some(child) = child {
            if !self.bones.contains(child) {
                return Err(RigError::UnknownBone {
                    bone: child.to_string(),
                    referrer: name.to_string(),
                });
            }
        }
        if count < 2 {
            log::debug!("split of '{}' into {} segments ignored", name, count);
            return Ok(());
        }
        let Some(bone) = self.bones.remove(name) else {
            return Ok(());
        };

        let names = segment_names(name, count);
        let vector = bone.tail - bone.head;
        let mut previous: Option<String> = None;
        for (k, segment_name) in names.iter().enumerate() {
            let head = bone.head + vector * (k as f64 / count as f64);
            let tail = bone.head + vector * ((k + 1) as f64 / count as f64);
            let mut segment = Bone::new(segment_name.as_str(), head, tail, bone.roll);
            segment.layers = bone.layers;
            match &previous {
                None => {
                    segment.parent = bone.parent.clone();
                    segment.flags = bone.flags;
                    segment.lock_location = bone.lock_location;
                    segment.constraints = bone.constraints.clone();
                }
                Some(prev) => {
                    segment.parent = Some(prev.clone());
                    segment.flags = bone.flags | BoneFlags::CON;
                    segment.lock_location = [!bone.flags.contains(BoneFlags::NOLOCK); 3];
                }
            }
            self.bones.insert_at(position + k, segment_name.as_str(), segment);
            previous = Some(segment_name.clone());
        }

        let last = names[count - 1].clone();
        for (other, b) in self.bones.iter_mut() {
            if names.iter().any(|n| n == other) {
                continue;
            }
            if b.parent.as_deref() == Some(name) || child == Some(other) {
                b.parent = Some(last.clone());
            }
            for constraint in &mut b.constraints {
                constraint.rename_targets(&mut |target| {
                    if target == name {
                        last.clone()
                    } else {
                        target.to_string()
                    }
                });
            }
        }

        if let Some(group) = self.vertex_weights.get(name).cloned() {
            let weight_position = self.vertex_weights.position(name).unwrap_or(0);
            self.vertex_weights.remove(name);
            let mut segments: Vec<WeightGroup> = vec![WeightGroup::new(); count];
            for &(v, w) in group.entries() {
                let co = mesh.coord_checked(v, &format!("weights of '{}'", name))?;
                segments[segment_index(co, bone.head, vector, count)].push(v, w);
            }
            let mut at = weight_position;
            for (segment_name, group) in names.iter().zip(segments) {
                if group.is_empty() {
                    continue;
                }
                self.vertex_weights.insert_at(at, segment_name.as_str(), group);
                at += 1;
            }
        }

        self.retargets
            .insert(bone.orig_name.clone(), Retarget::Split(names));
        log::debug!("split '{}' into {} segments", name, count);
        Ok(())
    }

    // =========================================================================
    // Declared weights
    // =========================================================================

    /// Moves weight groups keyed by declared bone names onto this
    /// armature's current bones.
    ///
    /// A group follows its bone into the `DEF-` copy when deform names are
    /// in use, into the merge target, into the split segment each vertex of
    /// `coords` projects onto, and through the locale. Groups naming no bone
    /// are dropped.
    pub fn retarget_weights(&self, declared: &WeightTable, coords: &[DVec3]) -> WeightTable {
        let current: HashMap<&str, &str> = self
            .bones
            .values()
            .map(|b| (b.orig_name.as_str(), b.name.as_str()))
            .collect();

        let mut out = WeightTable::new();
        for (name, group) in declared.iter() {
            for (target, part) in self.route_group(name, group, coords, &current) {
                match out.get_mut(&target) {
                    Some(existing) => {
                        existing.extend_from(&part);
                        *existing = existing.fix();
                    }
                    None => {
                        out.insert(target, part);
                    }
                }
            }
        }
        out
    }

    fn route_group(
        &self,
        name: &str,
        group: &WeightGroup,
        coords: &[DVec3],
        current: &HashMap<&str, &str>,
    ) -> Vec<(String, WeightGroup)> {
        let mut name = name.to_string();
        if self.options.use_deform_bones && self.options.use_deform_names {
            let deform = format!("{}{}", DEFORM_PREFIX, name);
            if current.contains_key(deform.as_str()) || self.retargets.contains_key(&deform) {
                name = deform;
            }
        }

        // every merge removes a bone, so chains are at most this long
        for _ in 0..=self.retargets.len() {
            match self.retargets.get(&name) {
                Some(Retarget::Merged(target)) => name = target.clone(),
                Some(Retarget::Split(segments)) => {
                    return self.split_group(segments, group, coords, current)
                }
                None => break,
            }
        }

        match current.get(name.as_str()) {
            Some(bone) => vec![(bone.to_string(), group.clone())],
            None => {
                log::debug!("dropping declared weight group '{}': no such bone", name);
                Vec::new()
            }
        }
    }

    fn split_group(
        &self,
        segments: &[String],
        group: &WeightGroup,
        coords: &[DVec3],
        current: &HashMap<&str, &str>,
    ) -> Vec<(String, WeightGroup)> {
        let bones: Vec<&Bone> = segments
            .iter()
            .filter_map(|s| current.get(s.as_str()).and_then(|n| self.bones.get(n)))
            .collect();
        let (Some(first), Some(last)) = (bones.first(), bones.last()) else {
            return Vec::new();
        };
        let head = first.head;
        let vector = last.tail - head;

        let mut parts = vec![WeightGroup::new(); bones.len()];
        for &(v, w) in group.entries() {
            match coords.get(v) {
                Some(&co) => parts[segment_index(co, head, vector, bones.len())].push(v, w),
                None => log::debug!("declared weight on proxy vertex {} out of range, dropped", v),
            }
        }
        bones
            .iter()
            .zip(parts)
            .filter(|(_, part)| !part.is_empty())
            .map(|(bone, part)| (bone.name.clone(), part))
            .collect()
    }
}

/// Segment of a bone split in `count` holding the projection of `co` onto
/// the axis `head + t * vector`.
fn segment_index(co: DVec3, head: DVec3, vector: DVec3, count: usize) -> usize {
    let length2 = vector.length_squared();
    let t = if length2 > 0.0 {
        (co - head).dot(vector) / length2
    } else {
        0.0
    };
    ((t * count as f64).floor().max(0.0) as usize).min(count - 1)
}

/// `forearm.L` split in 3 gives `forearm.01.L`, `forearm.02.L`, `forearm.03.L`.
fn segment_names(name: &str, count: usize) -> Vec<String> {
    let (base, suffix) = match name.find('.') {
        Some(dot) => name.split_at(dot),
        None => (name, ""),
    };
    (1..=count)
        .map(|k| format!("{}.{:02}{}", base, k, suffix))
        .collect()
}
