//! Line-oriented proxy description parser.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use glam::DVec3;

use super::{
    parse_reference_line, BaseMeshKind, ClothingPiece, ProxyDefinition, ProxyModifier,
    ProxyType, ScaleCalibration, DEFAULT_LAYER,
};
use crate::error::{ParseWarning, RigError, RigResult, WarningCode};
use crate::mesh::BaseMesh;
use crate::name_table::NameTable;
use crate::weights::WeightGroup;

/// Values accepted as "true" by boolean directives.
const TRUE_WORDS: &[&str] = &["1", "yes", "true", "enable", "enabled"];

/// Result of loading a proxy description.
#[derive(Debug, Clone)]
pub struct ProxyLoad {
    /// The parsed definition.
    pub proxy: ProxyDefinition,
    /// Non-fatal diagnostics, in line order.
    pub warnings: Vec<ParseWarning>,
    /// BLAKE3 hash of the source text (hex).
    pub source_hash: String,
}

impl ProxyLoad {
    /// True if any warnings were collected.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Section {
    None,
    RefVerts,
    Weights(String),
    DeleteVerts,
}

/// Reads proxy descriptions against a base mesh.
///
/// # Example
/// ```
/// use std::path::Path;
/// use rigbind_core::mesh::VertexBuffer;
/// use rigbind_core::proxy::ProxyParser;
///
/// let mesh = VertexBuffer::from_arrays(&[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]]);
/// let load = ProxyParser::new(&mesh)
///     .parse_str("basemesh hm08\nverts\n1\n0\n", Path::new("tiny.mhclo"))
///     .unwrap();
/// assert_eq!(load.proxy.vertex_count(), 2);
/// assert_eq!(load.proxy.name, "Tiny");
/// ```
pub struct ProxyParser<'a> {
    mesh: &'a dyn BaseMesh,
    converter: Option<&'a ProxyDefinition>,
    proxy_type: ProxyType,
    layer: i32,
}

impl<'a> ProxyParser<'a> {
    /// Creates a parser for clothes on layer 4.
    pub fn new(mesh: &'a dyn BaseMesh) -> Self {
        Self {
            mesh,
            converter: None,
            proxy_type: ProxyType::Clothes,
            layer: DEFAULT_LAYER,
        }
    }

    /// Sets the converter used for proxies on the legacy base mesh.
    pub fn converter(mut self, converter: Option<&'a ProxyDefinition>) -> Self {
        self.converter = converter;
        self
    }

    /// Sets the proxy type recorded on the definition.
    pub fn proxy_type(mut self, proxy_type: ProxyType) -> Self {
        self.proxy_type = proxy_type;
        self
    }

    /// Sets the display layer.
    pub fn layer(mut self, layer: i32) -> Self {
        self.layer = layer;
        self
    }

    /// Reads and parses a proxy file.
    ///
    /// Returns `Ok(None)` if the file cannot be opened; proxy slots are
    /// optional, so the caller decides whether that matters.
    pub fn read_file(&self, path: &Path) -> RigResult<Option<ProxyLoad>> {
        let source = match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) => {
                log::warn!("cannot open proxy file {}: {}", path.display(), e);
                return Ok(None);
            }
        };
        self.parse_str(&source, path).map(Some)
    }

    /// Parses proxy text. `path` names the source and anchors relative file references.
    pub fn parse_str(&self, source: &str, path: &Path) -> RigResult<ProxyLoad> {
        let mut state = ParseState::new(self, path);
        for (i, line) in source.lines().enumerate() {
            state.line(line, i + 1)?;
        }
        let load = state.finish(source);
        for warning in &load.warnings {
            log::warn!("{}: {}", path.display(), warning);
        }
        log::debug!(
            "parsed proxy '{}' ({} vertices, {} deleted)",
            load.proxy.name,
            load.proxy.vertex_count(),
            load.proxy.deleted_vertices().len()
        );
        Ok(load)
    }
}

struct ParseState<'p, 'a> {
    parser: &'p ProxyParser<'a>,
    source_name: String,
    folder: PathBuf,
    proxy: ProxyDefinition,
    warnings: Vec<ParseWarning>,
    section: Section,
    scale: DVec3,
    /// Last index seen in a `delete_verts` block, start of a `-` range.
    delete_start: Option<usize>,
}

impl<'p, 'a> ParseState<'p, 'a> {
    fn new(parser: &'p ProxyParser<'a>, path: &Path) -> Self {
        let folder = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Self {
            parser,
            source_name: path.display().to_string(),
            folder,
            proxy: ProxyDefinition::new(
                path,
                parser.proxy_type,
                parser.layer,
                parser.mesh.vertex_count(),
            ),
            warnings: Vec::new(),
            section: Section::None,
            scale: DVec3::ONE,
            delete_start: None,
        }
    }

    fn malformed(&self, line: usize, message: impl Into<String>) -> RigError {
        RigError::malformed(&self.source_name, line, message)
    }

    fn warn(&mut self, code: WarningCode, message: impl Into<String>, line: usize) {
        self.warnings.push(ParseWarning::at_line(code, message, line));
    }

    /// Converter to read base coordinates through, if the proxy needs one.
    fn active_converter(&self) -> RigResult<Option<&'a ProxyDefinition>> {
        let kind = BaseMeshKind::from_id(&self.proxy.basemesh)?;
        Ok(if kind.needs_conversion() {
            self.parser.converter
        } else {
            None
        })
    }

    fn line(&mut self, text: &str, n: usize) -> RigResult<()> {
        let words: Vec<&str> = text.split_whitespace().collect();
        let Some(&key) = words.first() else {
            return Ok(());
        };
        if key.starts_with('#') || key.starts_with("//") {
            return Ok(());
        }
        let rest = &words[1..];

        match key {
            "name" => self.text_value(rest, n, "name", |p, v| p.name = v),
            "uuid" => self.text_value(rest, n, "uuid", |p, v| p.uuid = Some(v)),
            "tag" => self.text_value(rest, n, "tag", |p, v| p.tags.push(v)),
            "z_depth" => self.proxy.z_depth = self.int(rest, 0, n, key)?,

            "verts" => self.section = Section::RefVerts,
            "weights" => {
                let bone = self.word(rest, 0, n, key)?.to_string();
                let table = self.proxy.weights.get_or_insert_with(NameTable::new);
                if table.insert(bone.clone(), WeightGroup::new()).is_some() {
                    self.warn(
                        WarningCode::DuplicateWeightBlock,
                        format!("weights block for '{}' declared again, earlier block replaced", bone),
                        n,
                    );
                }
                self.section = Section::Weights(bone);
            }
            "delete_verts" => {
                self.section = Section::DeleteVerts;
                self.delete_start = None;
            }

            "obj_file" => self.proxy.obj_file = Some(self.file_ref(rest, n, key, "obj")?),
            "material" => self.proxy.material_file = Some(self.file_ref(rest, n, key, "mhmat")?),
            "mhx_material" => {
                self.proxy.mhx_material_file = Some(self.file_ref(rest, n, key, "mhx")?)
            }
            "useBaseMaterials" => self.proxy.use_base_materials = true,
            "backface_culling" => self.proxy.cull = self.flag(rest, n, key)?,
            "transparent" => self.proxy.transparent = self.flag(rest, n, key)?,
            "uvLayer" => {
                let (layer, file) = if rest.len() > 1 {
                    (self.int(rest, 0, n, key)?, rest[1])
                } else {
                    (0, self.word(rest, 0, n, key)?)
                };
                let path = resolve_file(&self.folder, file, "mhuv");
                self.proxy.uv_layers.insert(layer, path);
            }

            "x_scale" => self.scale_directive(rest, n, 0)?,
            "y_scale" => self.scale_directive(rest, n, 1)?,
            "z_scale" => self.scale_directive(rest, n, 2)?,
            "use_projection" => self.proxy.use_projection = self.int::<i64>(rest, 0, n, key)? != 0,
            "ignoreOffset" => self.proxy.ignore_offset = self.int::<i64>(rest, 0, n, key)? != 0,
            "delete" => {
                let group = self.word(rest, 0, n, key)?.to_string();
                self.proxy.delete_groups.push(group);
            }
            "delete_connected" => {
                let v = self.int(rest, 0, n, key)?;
                self.proxy.delete_connected.push(v);
            }
            "mask_uv_layer" => match rest.first() {
                Some(_) => self.proxy.mask_layer = self.int(rest, 0, n, key)?,
                None => self.warn(WarningCode::MissingDirectiveValue, "mask_uv_layer without a layer", n),
            },
            "texture_uv_layer" => match rest.first() {
                Some(_) => self.proxy.texture_layer = self.int(rest, 0, n, key)?,
                None => self.warn(
                    WarningCode::MissingDirectiveValue,
                    "texture_uv_layer without a layer",
                    n,
                ),
            },

            "clothing" => {
                let name = self.word(rest, 0, n, key)?.to_string();
                let uuid = rest.get(1).map(|s| s.to_string());
                self.proxy.clothings.push(ClothingPiece { name, uuid });
            }
            "transparencies" => {
                let uuid = self.word(rest, 0, n, key)?.to_string();
                let value = is_true(self.word(rest, 1, n, key)?);
                self.proxy.transparencies.insert(uuid, value);
            }
            "textures" => {
                let a = self.word(rest, 0, n, key)?.to_string();
                let b = self.word(rest, 1, n, key)?.to_string();
                self.proxy.textures.push((a, b));
            }

            "wire" => self.proxy.wire = true,
            "cage" => self.proxy.cage = true,
            "subsurf" => {
                let levels: u32 = self.int(rest, 0, n, key)?;
                let render = if rest.len() > 1 {
                    self.int(rest, 1, n, key)?
                } else {
                    levels + 1
                };
                self.proxy.modifiers.push(ProxyModifier::Subsurf { levels, render });
            }
            "shrinkwrap" => {
                let offset = self.float(rest, 0, n, key)?;
                self.proxy.modifiers.push(ProxyModifier::Shrinkwrap { offset });
            }
            "solidify" => {
                let thickness = self.float(rest, 0, n, key)?;
                let offset = self.float(rest, 1, n, key)?;
                self.proxy
                    .modifiers
                    .push(ProxyModifier::Solidify { thickness, offset });
            }
            "shapekey" => {
                let name = self.word(rest, 0, n, key)?.to_string();
                self.proxy.shapekeys.push(name);
            }
            "basemesh" => {
                let id = self.word(rest, 0, n, key)?;
                BaseMeshKind::from_id(id)?;
                self.proxy.basemesh = id.to_string();
            }

            _ => self.section_line(&words, n)?,
        }
        Ok(())
    }

    fn section_line(&mut self, words: &[&str], n: usize) -> RigResult<()> {
        match self.section.clone() {
            Section::RefVerts => {
                let vertex_count = match self.active_converter()? {
                    Some(conv) => conv.vertex_count(),
                    None => self.parser.mesh.vertex_count(),
                };
                let proxy_vertex = self.proxy.ref_verts.len();
                let rv = parse_reference_line(
                    words,
                    proxy_vertex,
                    self.scale,
                    vertex_count,
                    &mut self.proxy.vertex_weights,
                    &self.source_name,
                    n,
                )?;
                if words.len() > 9 {
                    self.warn(
                        WarningCode::ExtraReferenceTokens,
                        format!("reference vertex has {} tokens, extras after the offset ignored", words.len()),
                        n,
                    );
                }
                self.proxy.ref_verts.push(rv);
            }
            Section::Weights(bone) => {
                if words.len() != 2 {
                    return Err(self.malformed(
                        n,
                        format!("weight line needs 'vertex weight', found {} tokens", words.len()),
                    ));
                }
                let v: usize = self.int(words, 0, n, "weights")?;
                let w = self.float(words, 1, n, "weights")?;
                if let Some(group) = self
                    .proxy
                    .weights
                    .as_mut()
                    .and_then(|table| table.get_mut(&bone))
                {
                    group.push(v, w);
                }
            }
            Section::DeleteVerts => self.delete_line(words, n)?,
            Section::None => self.warn(
                WarningCode::UnknownKeyword,
                format!("unknown keyword '{}'", words[0]),
                n,
            ),
        }
        Ok(())
    }

    /// Flags indices and inclusive `a - b` ranges in the deletion mask.
    fn delete_line(&mut self, words: &[&str], n: usize) -> RigResult<()> {
        let count = self.proxy.delete_verts.len();
        let mut pending_range = false;
        for (i, token) in words.iter().enumerate() {
            if *token == "-" {
                if self.delete_start.is_none() {
                    return Err(self.malformed(n, "'-' without a preceding vertex index"));
                }
                if i + 1 == words.len() {
                    return Err(self.malformed(n, "'-' without a closing vertex index"));
                }
                pending_range = true;
                continue;
            }
            let v: usize = self.int(words, i, n, "delete_verts")?;
            let start = match (pending_range, self.delete_start) {
                (true, Some(start)) => start,
                _ => v,
            };
            pending_range = false;

            let (lo, hi) = (start.min(v), start.max(v));
            if hi >= count {
                self.warn(
                    WarningCode::DeleteIndexOutOfRange,
                    format!(
                        "delete index {} outside base mesh with {} vertices, ignored",
                        hi, count
                    ),
                    n,
                );
            }
            for flag in self.proxy.delete_verts.iter_mut().take(hi.saturating_add(1)).skip(lo) {
                *flag = true;
            }
            self.delete_start = Some(v);
        }
        Ok(())
    }

    fn scale_directive(&mut self, rest: &[&str], n: usize, axis: usize) -> RigResult<()> {
        let key = ["x_scale", "y_scale", "z_scale"][axis];
        if rest.len() < 3 {
            return Err(self.malformed(n, format!("{} needs 'v1 v2 denominator'", key)));
        }
        let calibration = ScaleCalibration {
            v1: self.int(rest, 0, n, key)?,
            v2: self.int(rest, 1, n, key)?,
            denominator: self.float(rest, 2, n, key)?,
        };
        let converter = self.active_converter()?;
        let factor = calibration
            .factor(axis, self.parser.mesh, converter)
            .map_err(|e| self.malformed(n, e.to_string()))?;
        self.scale[axis] = factor;
        match axis {
            0 => self.proxy.x_scale = Some(calibration),
            1 => self.proxy.y_scale = Some(calibration),
            _ => self.proxy.z_scale = Some(calibration),
        }
        Ok(())
    }

    fn text_value(
        &mut self,
        rest: &[&str],
        n: usize,
        key: &str,
        apply: impl FnOnce(&mut ProxyDefinition, String),
    ) {
        if rest.is_empty() {
            self.warn(
                WarningCode::MissingDirectiveValue,
                format!("{} without a value", key),
                n,
            );
        } else {
            apply(&mut self.proxy, rest.join(" "));
        }
    }

    fn word<'w>(&self, words: &[&'w str], i: usize, n: usize, key: &str) -> RigResult<&'w str> {
        words
            .get(i)
            .copied()
            .ok_or_else(|| self.malformed(n, format!("{} is missing argument {}", key, i + 1)))
    }

    fn int<T: std::str::FromStr>(&self, words: &[&str], i: usize, n: usize, key: &str) -> RigResult<T> {
        let token = self.word(words, i, n, key)?;
        token
            .parse()
            .map_err(|_| self.malformed(n, format!("{}: expected integer, found '{}'", key, token)))
    }

    fn float(&self, words: &[&str], i: usize, n: usize, key: &str) -> RigResult<f64> {
        let token = self.word(words, i, n, key)?;
        token
            .parse()
            .map_err(|_| self.malformed(n, format!("{}: expected number, found '{}'", key, token)))
    }

    fn flag(&self, words: &[&str], n: usize, key: &str) -> RigResult<bool> {
        Ok(is_true(self.word(words, 0, n, key)?))
    }

    fn file_ref(&self, words: &[&str], n: usize, key: &str, suffix: &str) -> RigResult<PathBuf> {
        Ok(resolve_file(&self.folder, self.word(words, 0, n, key)?, suffix))
    }

    fn finish(mut self, source: &str) -> ProxyLoad {
        self.proxy.scale = self.scale;
        ProxyLoad {
            proxy: self.proxy,
            warnings: self.warnings,
            source_hash: blake3::hash(source.as_bytes()).to_hex().to_string(),
        }
    }
}

fn is_true(value: &str) -> bool {
    let value = value.to_ascii_lowercase();
    TRUE_WORDS.contains(&value.as_str())
}

/// Resolves a file reference relative to `folder`, adding `suffix` when it has no extension.
fn resolve_file(folder: &Path, file: &str, suffix: &str) -> PathBuf {
    let path = folder.join(file);
    if path.extension().is_some() {
        path
    } else {
        path.with_extension(suffix)
    }
}

/// Reads the `uuid` of a proxy file without parsing it.
///
/// Scanning stops at the `verts` section.
pub fn scan_uuid(path: &Path) -> RigResult<Option<String>> {
    let source = std::fs::read_to_string(path)?;
    for line in source.lines() {
        let mut words = line.split_whitespace();
        match words.next() {
            Some("uuid") => return Ok(words.next().map(str::to_string)),
            Some("verts") => break,
            _ => {}
        }
    }
    Ok(None)
}

/// Reads the leading `tag` lines of a proxy file.
///
/// Comments and blank lines are skipped; the first other line ends the scan.
pub fn scan_tags(path: &Path) -> RigResult<BTreeSet<String>> {
    let source = std::fs::read_to_string(path)?;
    let mut tags = BTreeSet::new();
    for line in source.lines() {
        let mut words = line.split_whitespace();
        match words.next() {
            None => continue,
            Some(w) if w.starts_with('#') || w.starts_with("//") => continue,
            Some("tag") => {
                if let Some(tag) = words.next() {
                    tags.insert(tag.to_string());
                }
            }
            Some(_) => break,
        }
    }
    Ok(tags)
}
