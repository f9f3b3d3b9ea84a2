use std::fmt;
use std::path::Path;

use serde::Serialize;
use ts_rs::TS;

use crate::dsl::error::CompileError;

/// Structured error type for the build driver. Tooling can match on the
/// `code` tag instead of parsing messages.
#[derive(Debug, Clone, Serialize, TS)]
#[serde(tag = "code", content = "detail")]
#[ts(export)]
pub enum LoomError {
    NotFound { what: String },
    IoError { message: String },
    ConfigError { message: String },
    /// A host file without a `<script lang="loom">` block.
    NoScript { path: String },
    Compile { errors: Vec<CompileError> },
}

impl fmt::Display for LoomError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoomError::NotFound { what } => write!(f, "{what} not found"),
            LoomError::IoError { message } => write!(f, "I/O error: {message}"),
            LoomError::ConfigError { message } => write!(f, "Invalid config: {message}"),
            LoomError::NoScript { path } => write!(f, "No loom script block in {path}"),
            LoomError::Compile { errors } => match errors.as_slice() {
                [single] => write!(f, "{single}"),
                _ => write!(f, "{} compile errors", errors.len()),
            },
        }
    }
}

impl std::error::Error for LoomError {}

impl LoomError {
    /// I/O failure on a known file. A missing file becomes `NotFound` naming it.
    pub fn io(path: &Path, e: &std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::NotFound {
            return LoomError::NotFound {
                what: path.display().to_string(),
            };
        }
        LoomError::IoError {
            message: format!("{}: {e}", path.display()),
        }
    }
}

impl From<std::io::Error> for LoomError {
    fn from(e: std::io::Error) -> Self {
        LoomError::IoError {
            message: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for LoomError {
    fn from(e: serde_json::Error) -> Self {
        LoomError::ConfigError {
            message: e.to_string(),
        }
    }
}

impl From<Vec<CompileError>> for LoomError {
    fn from(errors: Vec<CompileError>) -> Self {
        LoomError::Compile { errors }
    }
}
