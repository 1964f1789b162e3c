//! Base mesh loading from Wavefront OBJ or glTF sources.
//!
//! Only vertex positions are read; faces, normals and materials are
//! ignored. The loader dispatches by file extension.

use std::path::{Path, PathBuf};

use rigbind_core::VertexBuffer;
use serde::{Deserialize, Serialize};

/// Recognized Wavefront extensions.
pub const OBJ_EXTENSIONS: &[&str] = &["obj"];

/// Recognized glTF extensions.
pub const GLTF_EXTENSIONS: &[&str] = &["gltf", "glb"];

/// Identifies the source format of a base mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeshFormat {
    Obj,
    Gltf,
}

impl MeshFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            MeshFormat::Obj => "obj",
            MeshFormat::Gltf => "gltf",
        }
    }
}

impl std::fmt::Display for MeshFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A loaded base mesh.
#[derive(Debug)]
pub struct MeshLoad {
    pub mesh: VertexBuffer,
    pub format: MeshFormat,
}

/// Errors that can occur while loading a base mesh.
#[derive(Debug)]
pub enum InputError {
    /// File could not be read.
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Unknown file extension.
    UnknownExtension { extension: Option<String> },

    /// A `v` line in an OBJ file could not be parsed.
    ObjParse { line: usize, message: String },

    /// The glTF document or its buffers could not be read.
    Gltf { message: String },

    /// The source holds no vertex positions.
    NoPositions { path: PathBuf },
}

impl std::fmt::Display for InputError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InputError::FileRead { path, source } => {
                write!(f, "failed to read file '{}': {}", path.display(), source)
            }
            InputError::UnknownExtension { extension } => match extension {
                Some(ext) => write!(
                    f,
                    "unknown mesh extension '.{}' (expected .obj, .gltf or .glb)",
                    ext
                ),
                None => write!(f, "mesh file has no extension (expected .obj, .gltf or .glb)"),
            },
            InputError::ObjParse { line, message } => {
                write!(f, "OBJ parse error at line {}: {}", line, message)
            }
            InputError::Gltf { message } => write!(f, "glTF error: {}", message),
            InputError::NoPositions { path } => {
                write!(f, "mesh '{}' has no vertex positions", path.display())
            }
        }
    }
}

impl std::error::Error for InputError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            InputError::FileRead { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Load a base mesh from a file path, dispatching by extension.
pub fn load_mesh(path: &Path) -> Result<MeshLoad, InputError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|s| s.to_lowercase());

    let load = match extension.as_deref() {
        Some(ext) if OBJ_EXTENSIONS.contains(&ext) => {
            let content = std::fs::read_to_string(path).map_err(|e| InputError::FileRead {
                path: path.to_path_buf(),
                source: e,
            })?;
            MeshLoad {
                mesh: parse_obj(&content)?,
                format: MeshFormat::Obj,
            }
        }
        Some(ext) if GLTF_EXTENSIONS.contains(&ext) => MeshLoad {
            mesh: load_gltf(path)?,
            format: MeshFormat::Gltf,
        },
        _ => return Err(InputError::UnknownExtension { extension }),
    };

    if load.mesh.coords().is_empty() {
        return Err(InputError::NoPositions {
            path: path.to_path_buf(),
        });
    }
    log::debug!(
        "loaded {} mesh {} ({} vertices)",
        load.format,
        path.display(),
        load.mesh.coords().len()
    );
    Ok(load)
}

/// Reads the `v x y z [w]` lines of an OBJ document.
pub fn parse_obj(content: &str) -> Result<VertexBuffer, InputError> {
    let mut positions: Vec<[f64; 3]> = Vec::new();
    for (i, line) in content.lines().enumerate() {
        let mut words = line.split_whitespace();
        if words.next() != Some("v") {
            continue;
        }
        let values: Vec<&str> = words.collect();
        if values.len() < 3 {
            return Err(InputError::ObjParse {
                line: i + 1,
                message: format!("vertex needs 3 coordinates, found {}", values.len()),
            });
        }
        let mut co = [0.0; 3];
        for (slot, word) in co.iter_mut().zip(&values) {
            *slot = word.parse().map_err(|_| InputError::ObjParse {
                line: i + 1,
                message: format!("invalid coordinate '{}'", word),
            })?;
        }
        positions.push(co);
    }
    Ok(VertexBuffer::from_arrays(&positions))
}

/// Reads the positions of every mesh primitive, in document order.
fn load_gltf(path: &Path) -> Result<VertexBuffer, InputError> {
    let bytes = std::fs::read(path).map_err(|e| InputError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    let gltf::Gltf { document, blob } =
        gltf::Gltf::from_slice(&bytes).map_err(|e| InputError::Gltf {
            message: e.to_string(),
        })?;
    let buffers =
        gltf::import_buffers(&document, path.parent(), blob).map_err(|e| InputError::Gltf {
            message: e.to_string(),
        })?;

    let mut positions: Vec<[f32; 3]> = Vec::new();
    for mesh in document.meshes() {
        for primitive in mesh.primitives() {
            let reader =
                primitive.reader(|buffer| buffers.get(buffer.index()).map(|data| data.0.as_slice()));
            if let Some(iter) = reader.read_positions() {
                positions.extend(iter);
            }
        }
    }
    Ok(VertexBuffer::from_f32(&positions))
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DVec3;
    use std::io::Write;

    #[test]
    fn test_parse_obj() {
        let obj = "# cube\nv 0 0 0\nvn 0 1 0\nv 1.5 -2 3 1.0\nf 1 2 1\n";
        let mesh = parse_obj(obj).unwrap();
        assert_eq!(
            mesh.coords(),
            &[DVec3::ZERO, DVec3::new(1.5, -2.0, 3.0)]
        );
    }

    #[test]
    fn test_parse_obj_errors() {
        let err = parse_obj("v 0 0 0\nv 1 2\n").unwrap_err();
        assert!(matches!(err, InputError::ObjParse { line: 2, .. }));

        let err = parse_obj("v 0 zero 0\n").unwrap_err();
        assert!(err.to_string().contains("invalid coordinate 'zero'"));
    }

    #[test]
    fn test_load_mesh_dispatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("base.OBJ");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "v 0 1 2").unwrap();
        drop(file);

        let load = load_mesh(&path).unwrap();
        assert_eq!(load.format, MeshFormat::Obj);
        assert_eq!(load.mesh.coords().len(), 1);

        let err = load_mesh(&dir.path().join("base.fbx")).unwrap_err();
        assert!(matches!(err, InputError::UnknownExtension { .. }));

        let empty = dir.path().join("empty.obj");
        std::fs::write(&empty, "# nothing\n").unwrap();
        assert!(matches!(
            load_mesh(&empty).unwrap_err(),
            InputError::NoPositions { .. }
        ));
    }
}
