//! Error types whose variant decides what happens next.
//!
//! Setup and database plumbing use `anyhow`; the capture pipeline and the
//! control plane need to branch on the kind of failure, so they get enums.

use std::{fmt, path::PathBuf, time::Duration};

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::utils::logging::FailureKind;

/// Pipeline stage that produced a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Capture,
    Status,
    Validate,
    Persist,
    /// The iteration as a whole, for failures not tied to one stage.
    Iteration,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Capture => "capture",
            Stage::Status => "status",
            Stage::Validate => "validate",
            Stage::Persist => "persist",
            Stage::Iteration => "iteration",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of a single pipeline stage.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error("{stage} request timed out after {timeout:?}")]
    Timeout { stage: Stage, timeout: Duration },

    #[error("{stage} request failed: {message}")]
    Transport { stage: Stage, message: String },

    #[error("{stage} file I/O failed for {}: {source}", path.display())]
    Io {
        stage: Stage,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("status document is malformed: {0}")]
    MalformedStatus(String),

    #[error("device reported unknown frame size code {0}")]
    UnknownFrameSize(i64),

    #[error("image is invalid: {0}")]
    InvalidImage(String),

    #[error("failed to persist capture record: {0:#}")]
    Persist(anyhow::Error),

    #[error("{stage} stage panicked: {message}")]
    Panicked { stage: Stage, message: String },
}

impl StageError {
    pub fn stage(&self) -> Stage {
        match self {
            StageError::Timeout { stage, .. }
            | StageError::Transport { stage, .. }
            | StageError::Io { stage, .. }
            | StageError::Panicked { stage, .. } => *stage,
            StageError::MalformedStatus(_) | StageError::UnknownFrameSize(_) => Stage::Status,
            StageError::InvalidImage(_) => Stage::Validate,
            StageError::Persist(_) => Stage::Persist,
        }
    }

    /// Hard failures abort the iteration without writing a row. Only
    /// validation failures are soft: the record is still written, tagged
    /// invalid.
    pub fn is_hard(&self) -> bool {
        self.stage() != Stage::Validate
    }

    pub fn failure_kind(&self) -> FailureKind {
        match self {
            StageError::Timeout { .. }
            | StageError::Transport { .. }
            | StageError::MalformedStatus(_)
            | StageError::UnknownFrameSize(_) => FailureKind::Record,
            StageError::Io { .. } | StageError::InvalidImage(_) => FailureKind::ImageFile,
            StageError::Persist(_) => FailureKind::Database,
            StageError::Panicked { .. } => FailureKind::Unexpected,
        }
    }
}

/// Control plane errors, rendered as JSON.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid user input: {0}")]
    InvalidInput(String),

    #[error("Database error: {0:#}")]
    Database(#[from] anyhow::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = match &self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "INVALID_INPUT"),
            ApiError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR"),
            ApiError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR"),
        };
        let message = self.to_string();

        match &self {
            ApiError::InvalidInput(_) => {
                crate::log_failure!(FailureKind::InvalidInput, "{message}");
            }
            ApiError::Database(_) => crate::log_failure!(FailureKind::Database, "{message}"),
            _ => log::warn!("request failed: {status} {message}"),
        }

        let body = Json(json!({
            "error_code": error_code,
            "message": message,
        }));

        (status, body).into_response()
    }
}
