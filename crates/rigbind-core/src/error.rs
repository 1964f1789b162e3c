//! Error and warning types for proxy loading and rig construction.

use thiserror::Error;

/// Result type for engine operations.
pub type RigResult<T> = Result<T, RigError>;

/// The kind of named reference taking part in a dependency cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceKind {
    /// A joint expression referencing another joint.
    Joint,
    /// A bone naming its parent.
    BoneParent,
}

impl std::fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReferenceKind::Joint => write!(f, "joint"),
            ReferenceKind::BoneParent => write!(f, "bone parent"),
        }
    }
}

/// Fatal errors raised while loading proxies or building armatures.
#[derive(Debug, Error)]
pub enum RigError {
    /// A proxy description line has unparseable tokens or a wrong token count.
    #[error("{source_name}:{line}: malformed line: {message}")]
    MalformedLine {
        source_name: String,
        line: usize,
        message: String,
    },

    /// A joint expression, bone or plane names a joint that does not exist.
    #[error("unknown joint '{joint}' referenced by '{referrer}'")]
    UnknownJoint { joint: String, referrer: String },

    /// A bone table entry names a bone that does not exist.
    #[error("unknown bone '{bone}' referenced by '{referrer}'")]
    UnknownBone { bone: String, referrer: String },

    /// Joint or parent references form a cycle.
    #[error("cyclic {kind} reference: {chain}")]
    CyclicReference { kind: ReferenceKind, chain: String },

    /// The proxy declares a base mesh convention this engine does not know.
    #[error("unknown basemesh '{name}' (expected alpha_7, alpha7 or hm08)")]
    UnknownBaseMesh { name: String },

    /// A vertex index does not address the base mesh.
    #[error("vertex index {index} out of range for mesh with {count} vertices ({context})")]
    VertexOutOfRange {
        index: usize,
        count: usize,
        context: String,
    },

    /// A matrix was read before the phase that computes it ran.
    #[error("bone '{bone}' has no {stage} matrix yet")]
    UnresolvedMatrix { bone: String, stage: &'static str },

    /// A builder phase was invoked out of order.
    #[error("{operation} requires phase {expected}, armature is at {found}")]
    PhaseOrder {
        operation: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    /// The reference pose names a bone the armature does not have.
    #[error("reference pose names unknown bone '{bone}'")]
    UnknownReferencePoseBone { bone: String },

    /// Renaming would give two bones the same name.
    #[error("renaming '{second}' to '{name}' collides with '{first}'")]
    NameCollision {
        name: String,
        first: String,
        second: String,
    },

    /// JSON parsing error.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RigError {
    /// Creates a malformed-line error.
    pub fn malformed(source_name: impl Into<String>, line: usize, message: impl Into<String>) -> Self {
        Self::MalformedLine {
            source_name: source_name.into(),
            line,
            message: message.into(),
        }
    }

    /// Stable error code for reporting (e.g. "RIG_001").
    pub fn code(&self) -> &'static str {
        match self {
            RigError::MalformedLine { .. } => "RIG_001",
            RigError::UnknownJoint { .. } => "RIG_002",
            RigError::UnknownBone { .. } => "RIG_003",
            RigError::CyclicReference { .. } => "RIG_004",
            RigError::UnknownBaseMesh { .. } => "RIG_005",
            RigError::VertexOutOfRange { .. } => "RIG_006",
            RigError::UnresolvedMatrix { .. } => "RIG_007",
            RigError::PhaseOrder { .. } => "RIG_008",
            RigError::UnknownReferencePoseBone { .. } => "RIG_009",
            RigError::Json(_) => "RIG_010",
            RigError::Io(_) => "RIG_011",
            RigError::NameCollision { .. } => "RIG_012",
        }
    }

    /// Error category for grouping related errors.
    pub fn category(&self) -> &'static str {
        match self {
            RigError::MalformedLine { .. }
            | RigError::UnknownBaseMesh { .. }
            | RigError::VertexOutOfRange { .. } => "proxy",
            RigError::UnknownJoint { .. }
            | RigError::UnknownBone { .. }
            | RigError::CyclicReference { .. }
            | RigError::UnresolvedMatrix { .. }
            | RigError::PhaseOrder { .. }
            | RigError::UnknownReferencePoseBone { .. }
            | RigError::NameCollision { .. } => "rig",
            RigError::Json(_) | RigError::Io(_) => "io",
        }
    }

    /// Human-readable message, prefixed by nothing.
    pub fn message(&self) -> String {
        self.to_string()
    }
}

/// Warning codes for non-fatal proxy diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WarningCode {
    /// W001: Unknown keyword outside any section
    UnknownKeyword,
    /// W002: A weight block was declared twice
    DuplicateWeightBlock,
    /// W003: Deletion index outside the base mesh
    DeleteIndexOutOfRange,
    /// W004: Optional directive value missing
    MissingDirectiveValue,
    /// W005: Reference vertex line carries tokens past the offset
    ExtraReferenceTokens,
}

impl WarningCode {
    /// Returns the warning code string (e.g., "W001").
    pub fn code(&self) -> &'static str {
        match self {
            WarningCode::UnknownKeyword => "W001",
            WarningCode::DuplicateWeightBlock => "W002",
            WarningCode::DeleteIndexOutOfRange => "W003",
            WarningCode::MissingDirectiveValue => "W004",
            WarningCode::ExtraReferenceTokens => "W005",
        }
    }
}

impl std::fmt::Display for WarningCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// A parse warning with code, message, and optional 1-based line number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseWarning {
    /// The warning code.
    pub code: WarningCode,
    /// Human-readable warning message.
    pub message: String,
    /// Line the warning was raised on.
    pub line: Option<usize>,
}

impl ParseWarning {
    /// Creates a new warning without location.
    pub fn new(code: WarningCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            line: None,
        }
    }

    /// Creates a new warning attached to a line.
    pub fn at_line(code: WarningCode, message: impl Into<String>, line: usize) -> Self {
        Self {
            code,
            message: message.into(),
            line: Some(line),
        }
    }
}

impl std::fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(line) = self.line {
            write!(f, "{}: {} (at line {})", self.code, self.message, line)
        } else {
            write!(f, "{}: {}", self.code, self.message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = RigError::malformed("shirt.mhclo", 12, "expected integer, found 'x'");
        assert_eq!(err.code(), "RIG_001");
        assert_eq!(err.category(), "proxy");
        assert_eq!(
            err.to_string(),
            "shirt.mhclo:12: malformed line: expected integer, found 'x'"
        );

        let err = RigError::CyclicReference {
            kind: ReferenceKind::BoneParent,
            chain: "a -> b -> a".to_string(),
        };
        assert_eq!(err.code(), "RIG_004");
        assert_eq!(err.category(), "rig");
        assert_eq!(err.to_string(), "cyclic bone parent reference: a -> b -> a");

        let err = RigError::NameCollision {
            name: "chest".to_string(),
            first: "spine".to_string(),
            second: "chest".to_string(),
        };
        assert_eq!(err.code(), "RIG_012");
        assert_eq!(err.category(), "rig");
        assert_eq!(err.to_string(), "renaming 'chest' to 'chest' collides with 'spine'");
    }

    #[test]
    fn test_warning_display() {
        let warning = ParseWarning::new(WarningCode::UnknownKeyword, "unknown keyword 'foo'");
        assert_eq!(warning.to_string(), "W001: unknown keyword 'foo'");

        let warning = ParseWarning::at_line(WarningCode::DeleteIndexOutOfRange, "index 99", 7);
        assert_eq!(warning.to_string(), "W003: index 99 (at line 7)");
    }
}
