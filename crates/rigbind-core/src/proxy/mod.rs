//! Proxy definitions: secondary meshes bound to the base mesh.
//!
//! A proxy description is a line-oriented text file listing one reference
//! vertex per proxy vertex plus metadata (materials, deletion masks, scale
//! calibration, modifiers). [`ProxyParser`] reads it into a
//! [`ProxyDefinition`]; [`ConverterCache`] supplies the shared converter
//! used by proxies authored on the legacy base mesh.

mod converter;
mod parser;
mod ref_vertex;

#[cfg(test)]
mod tests;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::error::{RigError, RigResult};
use crate::mesh::BaseMesh;
use crate::name_table::NameTable;
use crate::weights::WeightGroup;

pub use converter::{BaseMeshKind, ConverterCache};
pub use parser::{scan_tags, scan_uuid, ProxyLoad, ProxyParser};
pub use ref_vertex::{parse_reference_line, ReferenceVertex, ReverseMap};

/// Default display layer for proxies.
pub const DEFAULT_LAYER: i32 = 4;

/// Default z-depth ordering value.
pub const DEFAULT_Z_DEPTH: i32 = 50;

/// Base mesh id assumed when a proxy does not declare one.
pub const DEFAULT_BASEMESH: &str = "alpha_7";

/// The role a proxy plays in the exported scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProxyType {
    /// A clothing item.
    Clothes,
    /// Hair geometry.
    Hair,
    /// Eye geometry.
    Eyes,
    /// A full-body replacement mesh.
    Proxy,
    /// A simulation cage.
    Cage,
    /// The legacy base mesh converter.
    Converter,
}

impl ProxyType {
    /// Returns the lowercase type name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyType::Clothes => "clothes",
            ProxyType::Hair => "hair",
            ProxyType::Eyes => "eyes",
            ProxyType::Proxy => "proxy",
            ProxyType::Cage => "cage",
            ProxyType::Converter => "converter",
        }
    }

    /// Parses a type name (case-insensitive).
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "clothes" => Some(ProxyType::Clothes),
            "hair" => Some(ProxyType::Hair),
            "eyes" => Some(ProxyType::Eyes),
            "proxy" => Some(ProxyType::Proxy),
            "cage" => Some(ProxyType::Cage),
            "converter" => Some(ProxyType::Converter),
            _ => None,
        }
    }

    /// True for the types that receive morph-target deltas.
    ///
    /// Only full-body replacements and clothing carry shapes; hair and eyes
    /// are left static.
    pub fn receives_shapes(&self) -> bool {
        matches!(self, ProxyType::Proxy | ProxyType::Clothes)
    }
}

impl std::fmt::Display for ProxyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Raw axis calibration: two base vertices and a reference distance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleCalibration {
    pub v1: usize,
    pub v2: usize,
    pub denominator: f64,
}

impl ScaleCalibration {
    /// Calibration factor for `axis` (0, 1 or 2) from two coordinates.
    ///
    /// `|co1[axis] - co2[axis]| / denominator`.
    pub fn factor_from(&self, co1: DVec3, co2: DVec3, axis: usize) -> f64 {
        (co1[axis] - co2[axis]).abs() / self.denominator
    }

    /// Calibration factor for `axis` measured on the base mesh.
    ///
    /// With a converter the two vertices are converter vertices, read
    /// through their own references.
    pub fn factor(
        &self,
        axis: usize,
        mesh: &dyn BaseMesh,
        converter: Option<&ProxyDefinition>,
    ) -> RigResult<f64> {
        let co1 = calibration_coord(mesh, converter, self.v1)?;
        let co2 = calibration_coord(mesh, converter, self.v2)?;
        Ok(self.factor_from(co1, co2, axis))
    }
}

fn calibration_coord(
    mesh: &dyn BaseMesh,
    converter: Option<&ProxyDefinition>,
    v: usize,
) -> RigResult<DVec3> {
    match converter {
        Some(conv) => conv
            .ref_verts
            .get(v)
            .ok_or_else(|| RigError::VertexOutOfRange {
                index: v,
                count: conv.vertex_count(),
                context: "scale calibration".to_string(),
            })?
            .coord(mesh),
        None => mesh.coord_checked(v, "scale calibration"),
    }
}

/// Display-only modifier requested by the proxy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProxyModifier {
    Subsurf { levels: u32, render: u32 },
    Shrinkwrap { offset: f64 },
    Solidify { thickness: f64, offset: f64 },
}

/// A named outfit piece referenced by a costume proxy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClothingPiece {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
}

/// A complete parsed proxy description.
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyDefinition {
    /// Display name.
    pub name: String,
    pub proxy_type: ProxyType,
    /// The description file this proxy was read from.
    pub file: PathBuf,
    pub uuid: Option<String>,
    /// Base mesh convention id the reference vertices index into.
    pub basemesh: String,
    pub tags: Vec<String>,

    /// One reference per proxy vertex, in proxy vertex order.
    pub ref_verts: Vec<ReferenceVertex>,
    /// Base vertex -> contributing proxy vertices.
    pub vertex_weights: ReverseMap,

    pub x_scale: Option<ScaleCalibration>,
    pub y_scale: Option<ScaleCalibration>,
    pub z_scale: Option<ScaleCalibration>,
    /// Live calibration vector at the end of the parse.
    pub scale: DVec3,

    pub z_depth: i32,
    pub cull: bool,
    pub transparent: bool,
    pub layer: i32,
    pub use_base_materials: bool,

    /// UV layer index -> `.mhuv` file.
    pub uv_layers: BTreeMap<i32, PathBuf>,
    pub obj_file: Option<PathBuf>,
    pub material_file: Option<PathBuf>,
    pub mhx_material_file: Option<PathBuf>,
    pub mask_layer: i32,
    pub texture_layer: i32,

    pub delete_groups: Vec<String>,
    /// Per base vertex: true when the proxy hides that vertex.
    pub delete_verts: Vec<bool>,
    /// Seed vertices from `delete_connected` directives.
    pub delete_connected: Vec<usize>,
    pub use_projection: bool,
    pub ignore_offset: bool,

    pub wire: bool,
    pub cage: bool,
    pub modifiers: Vec<ProxyModifier>,
    pub shapekeys: Vec<String>,
    /// Raw `weights` blocks, bone -> (base vertex, weight).
    pub weights: Option<NameTable<WeightGroup>>,
    pub clothings: Vec<ClothingPiece>,
    pub transparencies: BTreeMap<String, bool>,
    pub textures: Vec<(String, String)>,
}

impl ProxyDefinition {
    /// Creates an empty definition for `file`, before any line is read.
    pub fn new(file: &Path, proxy_type: ProxyType, layer: i32, base_vertex_count: usize) -> Self {
        Self {
            name: display_name(file),
            proxy_type,
            file: file.to_path_buf(),
            uuid: None,
            basemesh: DEFAULT_BASEMESH.to_string(),
            tags: Vec::new(),
            ref_verts: Vec::new(),
            vertex_weights: ReverseMap::new(),
            x_scale: None,
            y_scale: None,
            z_scale: None,
            scale: DVec3::ONE,
            z_depth: DEFAULT_Z_DEPTH,
            cull: false,
            transparent: false,
            layer,
            use_base_materials: false,
            uv_layers: BTreeMap::new(),
            obj_file: None,
            material_file: None,
            mhx_material_file: None,
            mask_layer: -1,
            texture_layer: 0,
            delete_groups: Vec::new(),
            delete_verts: vec![false; base_vertex_count],
            delete_connected: Vec::new(),
            use_projection: true,
            ignore_offset: false,
            wire: false,
            cage: false,
            modifiers: Vec::new(),
            shapekeys: Vec::new(),
            weights: None,
            clothings: Vec::new(),
            transparencies: BTreeMap::new(),
            textures: Vec::new(),
        }
    }

    /// The uuid, or the name when no uuid was declared.
    pub fn uuid(&self) -> &str {
        self.uuid.as_deref().unwrap_or(&self.name)
    }

    /// Number of proxy vertices.
    pub fn vertex_count(&self) -> usize {
        self.ref_verts.len()
    }

    /// Base mesh convention declared by this proxy.
    pub fn basemesh_kind(&self) -> RigResult<BaseMeshKind> {
        BaseMeshKind::from_id(&self.basemesh)
    }

    /// Recomputes the per-axis scale from the raw calibration records.
    ///
    /// Axes without a record keep a factor of 1.
    pub fn calibrated_scale(
        &self,
        mesh: &dyn BaseMesh,
        converter: Option<&ProxyDefinition>,
    ) -> RigResult<DVec3> {
        let converter = match self.basemesh_kind()? {
            BaseMeshKind::Alpha7 => converter,
            BaseMeshKind::Hm08 => None,
        };
        let mut scale = DVec3::ONE;
        for (axis, calibration) in [self.x_scale, self.y_scale, self.z_scale].iter().enumerate() {
            if let Some(calibration) = calibration {
                scale[axis] = calibration.factor(axis, mesh, converter)?;
            }
        }
        Ok(scale)
    }

    /// Indices of base vertices flagged for deletion.
    pub fn deleted_vertices(&self) -> Vec<usize> {
        self.delete_verts
            .iter()
            .enumerate()
            .filter_map(|(i, &d)| d.then_some(i))
            .collect()
    }

    /// Reconstructs every proxy vertex coordinate.
    ///
    /// A proxy on the legacy base mesh reads its base coordinates through
    /// `converter` when one is given.
    pub fn coords(
        &self,
        mesh: &dyn BaseMesh,
        converter: Option<&ProxyDefinition>,
    ) -> RigResult<Vec<DVec3>> {
        let converter = match self.basemesh_kind()? {
            BaseMeshKind::Alpha7 => converter,
            BaseMeshKind::Hm08 => None,
        };
        match converter {
            Some(conv) => {
                let base = conv.coords(mesh, None)?;
                self.ref_verts
                    .iter()
                    .map(|rv| {
                        rv.coord_with(|v| {
                            base.get(v).copied().ok_or_else(|| RigError::VertexOutOfRange {
                                index: v,
                                count: base.len(),
                                context: format!("converter for '{}'", self.name),
                            })
                        })
                    })
                    .collect()
            }
            None => self.ref_verts.iter().map(|rv| rv.coord(mesh)).collect(),
        }
    }
}

/// Capitalized file stem with spaces replaced by underscores.
fn display_name(file: &Path) -> String {
    let stem = file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut chars = stem.chars();
    let capitalized = match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect::<String>(),
        None => String::new(),
    };
    capitalized.replace(' ', "_")
}
