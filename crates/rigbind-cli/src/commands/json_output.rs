//! JSON output types for machine-readable CLI output.
//!
//! Every command's `--json` mode prints one [`CommandOutput`] document on
//! stdout.

use rigbind_core::{ParseWarning, RigError};
use serde::{Deserialize, Serialize};

use crate::input::InputError;

/// Error codes for CLI operations.
///
/// These codes are stable. Engine errors pass their own `RIG_XXX` codes through.
pub mod error_codes {
    /// File could not be read
    pub const FILE_READ: &str = "CLI_001";
    /// Unknown mesh file extension
    pub const UNKNOWN_EXTENSION: &str = "CLI_002";
    /// Mesh parse error
    pub const MESH_PARSE: &str = "CLI_003";
    /// Unknown proxy type name
    pub const UNKNOWN_PROXY_TYPE: &str = "CLI_004";
    /// JSON serialization error
    pub const JSON_SERIALIZE: &str = "CLI_005";
    /// No proxy matched the search
    pub const NOT_FOUND: &str = "CLI_006";
    /// Any other failure
    pub const INTERNAL: &str = "CLI_007";
}

/// A structured error in JSON output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JsonError {
    /// Stable error code (e.g., "CLI_001", "RIG_002")
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Error category (if known)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Source file path (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// Line number (if available)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
}

impl JsonError {
    /// Creates a new error with code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            category: None,
            file: None,
            line: None,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Sets the file path for this error.
    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn with_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }
}

/// A structured warning in JSON output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JsonWarning {
    /// Stable warning code (e.g., "W001")
    pub code: String,
    /// Human-readable warning message
    pub message: String,
    /// Source file path (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// Line number (if available)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
}

impl JsonWarning {
    /// Creates a new warning with code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            file: None,
            line: None,
        }
    }

    /// Sets the file path for this warning.
    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }
}

/// JSON output shared by every command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandOutput<T> {
    /// Whether the command succeeded
    pub success: bool,
    /// Errors encountered
    pub errors: Vec<JsonError>,
    /// Non-fatal diagnostics
    pub warnings: Vec<JsonWarning>,
    /// Command result (on success)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<T>,
}

impl<T> CommandOutput<T> {
    /// Creates a successful output.
    pub fn success(result: T, warnings: Vec<JsonWarning>) -> Self {
        Self {
            success: true,
            errors: Vec::new(),
            warnings,
            result: Some(result),
        }
    }

    /// Creates a failed output.
    pub fn failure(errors: Vec<JsonError>, warnings: Vec<JsonWarning>) -> Self {
        Self {
            success: false,
            errors,
            warnings,
            result: None,
        }
    }
}

impl<T: Serialize> CommandOutput<T> {
    /// Serializes with pretty formatting.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|e| {
            format!(
                r#"{{"success":false,"errors":[{{"code":"{}","message":"{}"}}],"warnings":[]}}"#,
                error_codes::JSON_SERIALIZE,
                e.to_string().replace('"', "'")
            )
        })
    }
}

/// Converts an engine error to JSON, keeping its stable code.
pub fn rig_error_to_json(error: &RigError) -> JsonError {
    let json = JsonError::new(error.code(), error.message()).with_category(error.category());
    match error {
        RigError::MalformedLine {
            source_name, line, ..
        } => json.with_file(source_name.clone()).with_line(*line),
        _ => json,
    }
}

/// Converts a mesh loading error to JSON.
pub fn input_error_to_json(error: &InputError) -> JsonError {
    let code = match error {
        InputError::FileRead { .. } => error_codes::FILE_READ,
        InputError::UnknownExtension { .. } => error_codes::UNKNOWN_EXTENSION,
        InputError::ObjParse { .. } | InputError::Gltf { .. } | InputError::NoPositions { .. } => {
            error_codes::MESH_PARSE
        }
    };
    let json = JsonError::new(code, error.to_string()).with_category("input");
    match error {
        InputError::FileRead { path, .. } | InputError::NoPositions { path } => {
            json.with_file(path.display().to_string())
        }
        InputError::ObjParse { line, .. } => json.with_line(*line),
        _ => json,
    }
}

/// Converts any command failure to JSON, recognizing engine and input errors.
pub fn error_to_json(error: &anyhow::Error) -> JsonError {
    if let Some(rig) = error.downcast_ref::<RigError>() {
        return rig_error_to_json(rig);
    }
    if let Some(input) = error.downcast_ref::<InputError>() {
        return input_error_to_json(input);
    }
    JsonError::new(error_codes::INTERNAL, format!("{:#}", error))
}

/// Converts a proxy parse warning to JSON.
pub fn parse_warning_to_json(warning: &ParseWarning, file: &str) -> JsonWarning {
    JsonWarning {
        code: warning.code.code().to_string(),
        message: warning.message.clone(),
        file: Some(file.to_string()),
        line: warning.line,
    }
}
