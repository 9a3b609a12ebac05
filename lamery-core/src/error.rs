//! Error types for lamery operations

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Structured failure payload returned by the service.
///
/// Serialized as `{"type": "failure", "code": ..., "message": ..., "hint": ...}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub code: String,
    pub message: String,
    pub hint: String,
}

impl ErrorEnvelope {
    pub fn new(
        code: impl Into<String>,
        message: impl Into<String>,
        hint: impl Into<String>,
    ) -> Self {
        Self {
            kind: "failure".to_string(),
            code: code.into(),
            message: message.into(),
            hint: hint.into(),
        }
    }

    pub fn not_found(path: &str) -> Self {
        Self::new(
            "not_found",
            format!("No such file: {}", path),
            "The path may not be indexed yet; retry shortly",
        )
    }

    pub fn internal(msg: &str) -> Self {
        Self::new("internal_error", msg, "Check service logs for details")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LameryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Watcher error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Storage root not found: {}", .0.display())]
    RootNotFound(PathBuf),

    #[error("Config parse error: {0}")]
    ConfigParse(String),

    #[error("Glob pattern error: {0}")]
    GlobPattern(String),
}
