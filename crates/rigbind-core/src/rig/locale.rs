//! Bone renaming conventions.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use serde::Deserialize;

use crate::error::RigResult;

/// Prefix marking deform copies of control bones.
pub const DEFORM_PREFIX: &str = "DEF-";

#[derive(Debug, Deserialize)]
struct LocaleFile {
    #[serde(default)]
    bones: HashMap<String, String>,
}

/// A bone-name mapping to a target rig's naming scheme.
///
/// File-backed locales are read once, on first use.
#[derive(Debug)]
pub struct Locale {
    id: String,
    path: Option<PathBuf>,
    table: OnceCell<HashMap<String, String>>,
}

impl Locale {
    /// A locale read lazily from `{"bones": {old: new}}`. Its identity is the path.
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            id: path.display().to_string(),
            path: Some(path),
            table: OnceCell::new(),
        }
    }

    /// An in-memory locale identified by `id`.
    pub fn from_table(id: impl Into<String>, bones: HashMap<String, String>) -> Self {
        Self {
            id: id.into(),
            path: None,
            table: OnceCell::with_value(bones),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// The mapping, loading it on first call.
    pub fn bones(&self) -> RigResult<&HashMap<String, String>> {
        self.table.get_or_try_init(|| {
            let Some(path) = &self.path else {
                return Ok(HashMap::new());
            };
            let json = std::fs::read_to_string(path)?;
            let file: LocaleFile = serde_json::from_str(&json)?;
            log::debug!("loaded locale '{}' with {} bones", self.id, file.bones.len());
            Ok(file.bones)
        })
    }

    /// Maps one bone name.
    ///
    /// The name is looked up verbatim, then by the part before the first
    /// `.` with the suffix reattached, and is otherwise kept. A `DEF-`
    /// prefix is set aside around the lookup.
    pub fn rename(&self, name: &str) -> RigResult<String> {
        let bones = self.bones()?;
        let (prefix, base) = match name.strip_prefix(DEFORM_PREFIX) {
            Some(rest) => (DEFORM_PREFIX, rest),
            None => ("", name),
        };
        if let Some(new) = bones.get(base) {
            return Ok(format!("{}{}", prefix, new));
        }
        if let Some((stem, suffix)) = base.split_once('.') {
            if let Some(new) = bones.get(stem) {
                return Ok(format!("{}{}.{}", prefix, new, suffix));
            }
        }
        Ok(name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn locale() -> Locale {
        let bones = [
            ("upperarm01", "UpperArm"),
            ("upperarm01.L", "LeftArm"),
            ("spine05", "Hips"),
        ]
        .into_iter()
        .map(|(a, b)| (a.to_string(), b.to_string()))
        .collect();
        Locale::from_table("test", bones)
    }

    #[test]
    fn test_rename_rules() {
        let locale = locale();
        assert_eq!(locale.rename("spine05").unwrap(), "Hips");
        assert_eq!(locale.rename("upperarm01.L").unwrap(), "LeftArm");
        assert_eq!(locale.rename("upperarm01.R").unwrap(), "UpperArm.R");
        assert_eq!(locale.rename("DEF-spine05").unwrap(), "DEF-Hips");
        assert_eq!(locale.rename("DEF-upperarm01.R").unwrap(), "DEF-UpperArm.R");
        assert_eq!(locale.rename("neck01").unwrap(), "neck01");
        assert_eq!(locale.rename("neck01.L").unwrap(), "neck01.L");
    }

    #[test]
    fn test_file_locale_loads_lazily() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"bones": {{"root": "Root"}}}}"#).unwrap();

        let locale = Locale::from_file(file.path());
        assert_eq!(locale.id(), file.path().display().to_string());
        assert_eq!(locale.rename("root").unwrap(), "Root");
        assert_eq!(locale.bones().unwrap().len(), 1);
    }

    #[test]
    fn test_missing_locale_file() {
        let locale = Locale::from_file("/nonexistent/locale.json");
        let err = locale.rename("root").unwrap_err();
        assert_eq!(err.code(), "RIG_011");
    }
}
