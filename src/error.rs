//! Error types for nx-core
//!
//! Every fallible public operation returns `Result<T>`; the error carries a
//! stable `kind` tag and a human-readable message. Thin outer layers (CLI,
//! TUI) map kinds to exit codes and messages; the core never prints.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during nx operations
#[derive(Error, Debug)]
pub enum NxError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to read {path}: {reason}")]
    FileRead { path: PathBuf, reason: String },

    #[error("failed to write {path}: {reason}")]
    FileWrite { path: PathBuf, reason: String },

    #[error("permission denied: {path}")]
    FilePermissionDenied { path: PathBuf },

    #[error("file error: {0}")]
    File(String),

    #[error("directory not found: {path}")]
    DirectoryNotFound { path: PathBuf },

    #[error("failed to create directory {path}: {reason}")]
    DirectoryCreate { path: PathBuf, reason: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("index error: {0}")]
    Index(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("encryption error: {0}")]
    Encryption(String),

    #[error("git error: {0}")]
    Git(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("external tool error: {0}")]
    ExternalTool(String),

    #[error("security error: {0}")]
    Security(String),

    #[error("system error: {0}")]
    System(String),

    #[error("process error: {0}")]
    Process(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("not implemented: {0}")]
    NotImplemented(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Unknown(String),
}

impl NxError {
    /// Stable kind tag for structured error output
    pub fn kind(&self) -> &'static str {
        match self {
            NxError::InvalidArgument(_) => "invalid_argument",
            NxError::FileNotFound { .. } => "file_not_found",
            NxError::FileRead { .. } => "file_read_error",
            NxError::FileWrite { .. } => "file_write_error",
            NxError::FilePermissionDenied { .. } => "file_permission_denied",
            NxError::File(_) => "file_error",
            NxError::DirectoryNotFound { .. } => "directory_not_found",
            NxError::DirectoryCreate { .. } => "directory_create_error",
            NxError::Parse(_) => "parse_error",
            NxError::Validation(_) => "validation_error",
            NxError::Index(_) => "index_error",
            NxError::Database(_) => "database_error",
            NxError::Network(_) => "network_error",
            NxError::Encryption(_) => "encryption_error",
            NxError::Git(_) => "git_error",
            NxError::Config(_) => "config_error",
            NxError::ExternalTool(_) => "external_tool_error",
            NxError::Security(_) => "security_error",
            NxError::System(_) => "system_error",
            NxError::Process(_) => "process_error",
            NxError::InvalidState(_) => "invalid_state",
            NxError::NotImplemented(_) => "not_implemented",
            NxError::NotFound(_) => "not_found",
            NxError::Unknown(_) => "unknown_error",
        }
    }

    /// Create an error for a failed read with path context
    pub fn file_read(path: impl Into<PathBuf>, error: impl std::fmt::Display) -> Self {
        NxError::FileRead {
            path: path.into(),
            reason: error.to_string(),
        }
    }

    /// Create an error for a failed write with path context
    pub fn file_write(path: impl Into<PathBuf>, error: impl std::fmt::Display) -> Self {
        NxError::FileWrite {
            path: path.into(),
            reason: error.to_string(),
        }
    }

    /// Create an error for an entity that was not found
    pub fn not_found(context: &str, value: impl std::fmt::Display) -> Self {
        NxError::NotFound(format!("{}: {}", context, value))
    }

    /// Convert error to JSON representation for structured error output
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "error": {
                "kind": self.kind(),
                "message": self.to_string(),
            }
        })
    }
}

impl From<std::io::Error> for NxError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => NxError::FilePermissionDenied {
                path: PathBuf::new(),
            },
            _ => NxError::File(err.to_string()),
        }
    }
}

impl From<serde_yaml::Error> for NxError {
    fn from(err: serde_yaml::Error) -> Self {
        NxError::Parse(err.to_string())
    }
}

impl From<serde_json::Error> for NxError {
    fn from(err: serde_json::Error) -> Self {
        NxError::Parse(err.to_string())
    }
}

impl From<toml::de::Error> for NxError {
    fn from(err: toml::de::Error) -> Self {
        NxError::Config(err.to_string())
    }
}

impl From<rusqlite::Error> for NxError {
    fn from(err: rusqlite::Error) -> Self {
        NxError::Database(err.to_string())
    }
}

/// Result type alias for nx operations
pub type Result<T> = std::result::Result<T, NxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tags() {
        assert_eq!(
            NxError::InvalidArgument("x".into()).kind(),
            "invalid_argument"
        );
        assert_eq!(NxError::Database("x".into()).kind(), "database_error");
        assert_eq!(
            NxError::ExternalTool("rg missing".into()).kind(),
            "external_tool_error"
        );
        assert_eq!(NxError::NotFound("note".into()).kind(), "not_found");
    }

    #[test]
    fn test_to_json_surface() {
        let err = NxError::Validation("title cannot be empty".into());
        let json = err.to_json();
        assert_eq!(json["error"]["kind"], "validation_error");
        assert_eq!(
            json["error"]["message"],
            "validation error: title cannot be empty"
        );
    }
}
