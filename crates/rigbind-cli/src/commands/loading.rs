//! Input loading and failure reporting shared by the commands.

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use colored::Colorize;
use rigbind_core::{
    ConverterCache, ProxyDefinition, ProxyLoad, ProxyParser, ProxyType, ReferencePose,
    RigDefinition, RigOptions, VertexBuffer,
};
use serde::Serialize;

use super::json_output::{error_codes, error_to_json, CommandOutput, JsonWarning};
use crate::input;

/// A command-line usage failure with a stable code.
#[derive(Debug)]
pub struct UsageError {
    pub code: &'static str,
    pub message: String,
}

impl UsageError {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for UsageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for UsageError {}

pub fn load_mesh(path: &str) -> Result<VertexBuffer> {
    Ok(input::load_mesh(Path::new(path))?.mesh)
}

pub fn load_rig(path: &str) -> Result<RigDefinition> {
    RigDefinition::from_file(Path::new(path))
        .with_context(|| format!("failed to load rig definition: {}", path))
}

/// Options from a preset file, or the defaults.
pub fn load_options(preset: Option<&str>) -> Result<RigOptions> {
    match preset {
        Some(path) => RigOptions::from_preset_file(Path::new(path))
            .with_context(|| format!("failed to load rig preset: {}", path)),
        None => Ok(RigOptions::default()),
    }
}

pub fn load_pose(path: Option<&str>) -> Result<Option<ReferencePose>> {
    path.map(|p| {
        ReferencePose::from_file(Path::new(p))
            .with_context(|| format!("failed to load reference pose: {}", p))
    })
    .transpose()
}

pub fn parse_proxy_type(name: Option<&str>) -> Result<ProxyType> {
    match name {
        None => Ok(ProxyType::Clothes),
        Some(name) => ProxyType::parse(name).ok_or_else(|| {
            UsageError::new(
                error_codes::UNKNOWN_PROXY_TYPE,
                format!(
                    "unknown proxy type '{}' (expected clothes, hair, eyes, proxy or cage)",
                    name
                ),
            )
            .into()
        }),
    }
}

/// Converter cache for `mesh`, preloaded from `path` when given.
pub fn converter_cache(path: Option<&str>) -> ConverterCache {
    match path {
        Some(path) => ConverterCache::new(path),
        None => ConverterCache::empty(),
    }
}

/// Parses one proxy file against `mesh`.
///
/// The converter, when the cache yields one, validates legacy indices.
pub fn load_proxy(
    mesh: &VertexBuffer,
    file: &str,
    proxy_type: ProxyType,
    converters: &ConverterCache,
) -> Result<ProxyLoad> {
    let converter: Option<Arc<ProxyDefinition>> = converters.get_or_load(mesh)?;
    ProxyParser::new(mesh)
        .converter(converter.as_deref())
        .proxy_type(proxy_type)
        .read_file(Path::new(file))?
        .ok_or_else(|| {
            UsageError::new(
                error_codes::FILE_READ,
                format!("cannot open proxy file: {}", file),
            )
            .into()
        })
}

/// Code to report for a failure.
pub fn error_code(error: &anyhow::Error) -> String {
    match error.downcast_ref::<UsageError>() {
        Some(usage) => usage.code.to_string(),
        None => error_to_json(error).code,
    }
}

/// Prints a failure and returns the failing exit code.
pub fn report_failure<T: Serialize>(error: &anyhow::Error, json: bool) -> ExitCode {
    if json {
        let mut json_error = error_to_json(error);
        json_error.code = error_code(error);
        let output: CommandOutput<T> = CommandOutput::failure(vec![json_error], Vec::new());
        println!("{}", output.to_json());
    } else {
        eprintln!(
            "{} {:#}",
            format!("error[{}]:", error_code(error)).red().bold(),
            error
        );
    }
    ExitCode::from(1)
}

/// Prints a success document in JSON mode.
pub fn print_json<T: Serialize>(result: T, warnings: Vec<JsonWarning>) {
    println!("{}", CommandOutput::success(result, warnings).to_json());
}

/// Text form of a serializable flag set, e.g. `DEF | CON`.
pub fn flags_text<T: Serialize>(flags: &T) -> String {
    match serde_json::to_value(flags) {
        Ok(serde_json::Value::String(text)) => text,
        Ok(other) => other.to_string(),
        Err(_) => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rigbind_core::rig::BoneFlags;

    #[test]
    fn test_parse_proxy_type() {
        assert_eq!(parse_proxy_type(None).unwrap(), ProxyType::Clothes);
        assert_eq!(parse_proxy_type(Some("Hair")).unwrap(), ProxyType::Hair);
        let err = parse_proxy_type(Some("hat")).unwrap_err();
        assert_eq!(error_code(&err), error_codes::UNKNOWN_PROXY_TYPE);
    }

    #[test]
    fn test_missing_proxy_file() {
        let mesh = VertexBuffer::from_arrays(&[[0.0, 0.0, 0.0]]);
        let err = load_proxy(
            &mesh,
            "/nonexistent/shirt.mhclo",
            ProxyType::Clothes,
            &ConverterCache::empty(),
        )
        .unwrap_err();
        assert_eq!(error_code(&err), error_codes::FILE_READ);
    }

    #[test]
    fn test_flags_text() {
        assert_eq!(flags_text(&(BoneFlags::DEF | BoneFlags::CON)), "DEF | CON");
    }
}
