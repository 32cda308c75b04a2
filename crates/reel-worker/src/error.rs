//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Media error: {0}")]
    Media(#[from] reel_media::MediaError),

    #[error("Queue error: {0}")]
    Queue(#[from] reel_queue::QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Errors the caller must fix before resubmitting.
    pub fn is_validation(&self) -> bool {
        match self {
            WorkerError::Validation(_) => true,
            WorkerError::Media(e) => e.is_validation(),
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, WorkerError::Queue(e) if e.is_not_found())
    }

    pub fn is_queue_full(&self) -> bool {
        matches!(self, WorkerError::Queue(e) if e.is_queue_full())
    }

    /// Message and diagnostic tail to persist on a failed job.
    pub fn to_job_error(&self) -> reel_models::JobError {
        let detail = match self {
            WorkerError::Media(e) => e.diagnostic_tail().map(str::to_string),
            _ => None,
        };
        let message = match self {
            WorkerError::Media(reel_media::MediaError::EngineFailed { message, .. }) => {
                format!("Render failed: {}", message)
            }
            WorkerError::Media(e) => e.to_string(),
            other => other.to_string(),
        };
        reel_models::JobError::new(message).with_detail(detail)
    }
}
