//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while resolving, compiling or running a render.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found: {0}")]
    EngineNotFound(String),

    #[error("FFprobe not found: {0}")]
    ProbeNotFound(String),

    #[error("Failed to start FFmpeg: {0}")]
    SpawnFailed(String),

    #[error("FFmpeg failed: {message}")]
    EngineFailed {
        message: String,
        stderr_tail: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("FFprobe failed: {message}")]
    ProbeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("Render timed out after {0} seconds")]
    Timeout(u64),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Resource too large: {path} is {size} bytes (limit {limit})")]
    ResourceTooLarge { path: PathBuf, size: u64, limit: u64 },

    #[error("Path escapes the output directory: {0}")]
    PathTraversal(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl MediaError {
    /// Create an engine failure error.
    pub fn engine_failed(
        message: impl Into<String>,
        stderr_tail: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::EngineFailed {
            message: message.into(),
            stderr_tail,
            exit_code,
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// The supervisor's wall-clock timeout fired.
    pub fn is_timeout(&self) -> bool {
        matches!(self, MediaError::Timeout(_))
    }

    /// Errors raised before a job is queued (bad reference, bad payload).
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            MediaError::ResourceNotFound(_)
                | MediaError::ResourceTooLarge { .. }
                | MediaError::PathTraversal(_)
                | MediaError::InvalidRequest(_)
        )
    }

    /// Bounded diagnostic excerpt, when the engine produced one.
    pub fn diagnostic_tail(&self) -> Option<&str> {
        match self {
            MediaError::EngineFailed { stderr_tail, .. } => stderr_tail.as_deref(),
            MediaError::ProbeFailed { stderr, .. } => stderr.as_deref(),
            _ => None,
        }
    }
}
