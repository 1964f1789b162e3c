//! Rig build options and rig presets.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::locale::Locale;
use super::table::{MergeTable, RigDefinition};
use crate::error::RigResult;

/// Feature switches for one armature build.
///
/// Field names also accept the camelCase spelling used by preset files.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RigOptions {
    #[serde(alias = "rigtype")]
    pub rig_type: String,
    pub description: String,
    pub scale: f64,
    #[serde(alias = "useMuscles")]
    pub use_muscles: bool,
    #[serde(alias = "useDeformBones")]
    pub use_deform_bones: bool,
    #[serde(alias = "useDeformNames")]
    pub use_deform_names: bool,
    #[serde(alias = "useSplitBones")]
    pub use_split_bones: bool,
    #[serde(alias = "useRotationLimits")]
    pub use_rotation_limits: bool,
    /// Parents every root bone to a `master` bone at the origin.
    #[serde(alias = "useMasterBone")]
    pub use_master_bone: bool,
    /// Inserts a link bone wherever a child's head is away from its parent's tail.
    #[serde(alias = "addConnectingBones")]
    pub add_connecting_bones: bool,
    #[serde(alias = "mergeSpine")]
    pub merge_spine: bool,
    #[serde(alias = "mergeShoulders")]
    pub merge_shoulders: bool,
    #[serde(alias = "mergeFingers")]
    pub merge_fingers: bool,
    #[serde(alias = "mergePalms")]
    pub merge_palms: bool,
    #[serde(alias = "mergeHead")]
    pub merge_head: bool,
    /// Explicit merge table, applied after the predefined groups.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge: Option<MergeTable>,
    #[serde(alias = "useTPose")]
    pub use_t_pose: bool,
    #[serde(skip)]
    pub locale: Option<Arc<Locale>>,
}

impl Default for RigOptions {
    fn default() -> Self {
        Self {
            rig_type: "Default".to_string(),
            description: String::new(),
            scale: 1.0,
            use_muscles: false,
            use_deform_bones: false,
            use_deform_names: false,
            use_split_bones: false,
            use_rotation_limits: false,
            use_master_bone: false,
            add_connecting_bones: false,
            merge_spine: false,
            merge_shoulders: false,
            merge_fingers: false,
            merge_palms: false,
            merge_head: false,
            merge: None,
            use_t_pose: false,
            locale: None,
        }
    }
}

/// A rig preset document.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PresetFile {
    name: Option<String>,
    description: Option<String>,
    merge: Option<MergeTable>,
    settings: Option<RigOptions>,
    bones: HashMap<String, String>,
}

impl RigOptions {
    /// Parses a preset `{ name, description, merge, settings, bones }`.
    ///
    /// Settings start from the defaults. A non-empty `bones` table becomes
    /// the locale, identified by the preset name.
    pub fn from_preset_json(json: &str) -> RigResult<Self> {
        let preset: PresetFile = serde_json::from_str(json)?;
        let mut options = preset.settings.unwrap_or_default();
        if let Some(name) = preset.name {
            options.rig_type = name;
        }
        if let Some(description) = preset.description {
            options.description = description;
        }
        if preset.merge.is_some() {
            options.merge = preset.merge;
        }
        if !preset.bones.is_empty() {
            let id = format!("preset:{}", options.rig_type);
            options.locale = Some(Arc::new(Locale::from_table(id, preset.bones)));
        }
        Ok(options)
    }

    /// Reads a preset file.
    pub fn from_preset_file(path: &Path) -> RigResult<Self> {
        let json = std::fs::read_to_string(path)?;
        let options = Self::from_preset_json(&json)?;
        log::debug!("loaded rig preset '{}' from {}", options.rig_type, path.display());
        Ok(options)
    }

    /// Merge table selected by the `merge_*` switches plus the explicit table.
    pub fn merge_table(&self, def: &RigDefinition) -> MergeTable {
        let groups = &def.merge_groups;
        let selected = [
            (self.merge_spine, &groups.spine),
            (self.merge_shoulders, &groups.shoulders),
            (self.merge_fingers, &groups.fingers),
            (self.merge_palms, &groups.palms),
            (self.merge_head, &groups.head),
        ];
        let mut table = MergeTable::new();
        for (_, group) in selected.into_iter().filter(|(on, _)| *on) {
            for (target, sources) in group.iter() {
                table.insert(target, sources.clone());
            }
        }
        if let Some(merge) = &self.merge {
            for (target, sources) in merge.iter() {
                table.insert(target, sources.clone());
            }
        }
        table
    }
}
