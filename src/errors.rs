//! Typed error hierarchy for deployhook.
//!
//! Three top-level enums cover the three request surfaces:
//! - `DeployError`: signed deploy requests, from validation to process start
//! - `LogsError`: log file browsing
//! - `ContainerError`: container runtime passthrough

use std::path::PathBuf;

use axum::http::StatusCode;
use thiserror::Error;

/// Errors that terminate a deploy request before its output stream starts.
///
/// `Display` carries detail for the server log. Callers only ever see
/// [`DeployError::public_message`].
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("code must match [A-Za-z0-9_-]+")]
    InvalidCode,

    #[error("signature does not match")]
    InvalidSignature,

    #[error("timestamp '{0}' is not an integer millisecond value")]
    InvalidTimestamp(String),

    #[error("timestamp is {skew_ms}ms away from server time")]
    ExpiredTimestamp { skew_ms: i64 },

    #[error("failed to read upload: {0}")]
    BadUpload(String),

    #[error("failed to store artifact at {path}: {source}")]
    StorageError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no script for code '{code}'")]
    ScriptNotFound { code: String },

    #[error("neither bash nor sh found on PATH")]
    NoInterpreter,

    #[error("failed to spawn {script}: {source}")]
    SpawnError {
        script: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("child {0} pipe was not attached")]
    PipeError(&'static str),
}

impl DeployError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            DeployError::InvalidCode | DeployError::BadUpload(_) | DeployError::ScriptNotFound { .. } => {
                StatusCode::BAD_REQUEST
            }
            DeployError::InvalidSignature
            | DeployError::InvalidTimestamp(_)
            | DeployError::ExpiredTimestamp { .. } => StatusCode::UNAUTHORIZED,
            DeployError::StorageError { .. }
            | DeployError::NoInterpreter
            | DeployError::SpawnError { .. }
            | DeployError::PipeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Fixed response text. Never includes paths or OS error detail.
    pub fn public_message(&self) -> &'static str {
        match self {
            DeployError::InvalidCode => "invalid code",
            DeployError::InvalidSignature => "invalid signature",
            DeployError::InvalidTimestamp(_) => "invalid timestamp",
            DeployError::ExpiredTimestamp { .. } => "timestamp expired",
            DeployError::BadUpload(_) => "failed to parse upload body",
            DeployError::StorageError { .. } => "failed to save file",
            DeployError::ScriptNotFound { .. } => "script not found",
            DeployError::NoInterpreter => "no bash/sh interpreter available",
            DeployError::SpawnError { .. } => "failed to start script",
            DeployError::PipeError(_) => "failed to attach script output",
        }
    }
}

/// Errors from the log browser.
#[derive(Debug, Error)]
pub enum LogsError {
    #[error("empty file name")]
    EmptyName,

    #[error("illegal file name '{0}'")]
    IllegalName(String),

    #[error("log file {0} not found")]
    NotFound(PathBuf),

    #[error("log I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the container runtime CLI wrapper.
#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("container runtime '{0}' not found")]
    NotFound(String),

    #[error("container id is missing or malformed")]
    InvalidId,

    #[error("`{command}` failed")]
    Failed { command: String, output: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deploy_error_auth_failures_map_to_unauthorized() {
        assert_eq!(DeployError::InvalidSignature.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            DeployError::ExpiredTimestamp { skew_ms: 600_000 }.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            DeployError::InvalidTimestamp("abc".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn deploy_error_request_failures_map_to_bad_request() {
        assert_eq!(DeployError::InvalidCode.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            DeployError::BadUpload("length limit exceeded".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            DeployError::ScriptNotFound { code: "web".into() }.status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn deploy_error_public_message_hides_paths() {
        let err = DeployError::StorageError {
            path: PathBuf::from("/srv/uploads/123_app.tar.gz"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.to_string().contains("/srv/uploads"));
        assert!(!err.public_message().contains("/srv"));
    }

    #[test]
    fn deploy_error_spawn_carries_source() {
        use std::error::Error as _;
        let err = DeployError::SpawnError {
            script: PathBuf::from("scripts/web.sh"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "bash missing"),
        };
        let source = err.source().expect("spawn error keeps its io source");
        assert!(source.to_string().contains("bash missing"));
    }

    #[test]
    fn logs_error_converts_from_io() {
        let err: LogsError = std::io::Error::new(std::io::ErrorKind::Other, "disk").into();
        assert!(matches!(err, LogsError::Io(_)));
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&DeployError::NoInterpreter);
        assert_std_error(&LogsError::EmptyName);
        assert_std_error(&ContainerError::InvalidId);
    }
}
