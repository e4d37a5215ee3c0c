//! Error types for the intent engine.
//!
//! This module defines the canonical error type used throughout the core.
//! All subsystems return `Result<T, CoreError>`.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Canonical error type for all core operations.
///
/// Uses `thiserror` for `Display`/`Error` impls. The variant set is closed:
/// every failure mode the core can produce has a stable kind here, so
/// callers can match on it instead of parsing message text.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("project root not found above {0}")]
    ProjectNotFound(PathBuf),

    #[error("intent not found: {0}")]
    IntentNotFound(String),

    #[error("intent reference is ambiguous: {0}")]
    IntentAmbiguous(String),

    #[error("stage not found: {0}")]
    StageNotFound(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("invalid protocol: {0}")]
    InvalidProtocol(String),

    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("missing file reference: {0}")]
    MissingFileReference(String),

    #[error("intent already locked by {by} at {at}")]
    AlreadyLocked { by: String, at: String },

    #[error("intent is not locked")]
    NotLocked,

    #[error("recovery data missing: {0}")]
    RecoveryDataMissing(String),

    #[error("framing error: {0}")]
    FramingError(String),

    #[error("connection refused: {0}")]
    ConnectionRefused(String),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("operation timed out: {0}")]
    Timeout(String),

    #[error("I/O error at {path}: {cause}")]
    IoError { path: PathBuf, cause: io::Error },

    #[error("permission denied: {0}")]
    PermissionDenied(PathBuf),

    #[error("validation failed: {0}")]
    ValidationFailed(String),

    #[error("merge not approved: {0}")]
    MergeNotApproved(String),

    #[error("backup failed: {0}")]
    BackupFailed(String),

    #[error("cancelled")]
    Cancelled,
}

impl CoreError {
    /// Error exit code at the boundary between the core and a CLI shell (§6).
    ///
    /// `0` is reserved for success and is never produced by this mapping.
    pub fn exit_code(&self) -> i32 {
        match self {
            CoreError::Cancelled => 3,
            CoreError::FramingError(_)
            | CoreError::IoError { .. }
            | CoreError::PermissionDenied(_)
            | CoreError::ConnectionRefused(_)
            | CoreError::ConnectionClosed
            | CoreError::Timeout(_) => 2,
            _ => 1,
        }
    }

    pub fn io(path: impl Into<PathBuf>, cause: io::Error) -> Self {
        CoreError::IoError {
            path: path.into(),
            cause,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_locked_display() {
        let err = CoreError::AlreadyLocked {
            by: "host-a".to_string(),
            at: "2025-01-01T00:00:00Z".to_string(),
        };
        assert_eq!(
            format!("{}", err),
            "intent already locked by host-a at 2025-01-01T00:00:00Z"
        );
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(CoreError::Cancelled.exit_code(), 3);
        assert_eq!(CoreError::ConnectionClosed.exit_code(), 2);
        assert_eq!(CoreError::IntentNotFound("x".into()).exit_code(), 1);
        assert_eq!(CoreError::NotLocked.exit_code(), 1);
    }

    #[test]
    fn test_checksum_mismatch_display() {
        let err = CoreError::ChecksumMismatch {
            expected: "aaa".into(),
            actual: "bbb".into(),
        };
        assert_eq!(format!("{}", err), "checksum mismatch: expected aaa, got bbb");
    }
}
