//! Structured job logging utilities.
//!
//! Keeps job lifecycle log lines consistent: every line carries the job id
//! and the job kind as structured fields.

use tracing::{error, info, Span};

use reel_models::{Job, JobId};

/// Job logger for structured logging with consistent formatting.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    kind: String,
}

impl JobLogger {
    /// Create a logger for a job id and kind (e.g. `render_video`, `merge`).
    pub fn new(job_id: &JobId, kind: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            kind: kind.to_string(),
        }
    }

    pub fn for_job(job: &Job) -> Self {
        Self::new(&job.id, job.kind().as_str())
    }

    pub fn log_start(&self, message: &str) {
        info!(job_id = %self.job_id, kind = %self.kind, "Job started: {}", message);
    }

    pub fn log_progress(&self, percent: u8) {
        info!(job_id = %self.job_id, kind = %self.kind, progress = percent, "Job progress");
    }

    pub fn log_error(&self, message: &str) {
        error!(job_id = %self.job_id, kind = %self.kind, "Job error: {}", message);
    }

    pub fn log_completion(&self, message: &str) {
        info!(job_id = %self.job_id, kind = %self.kind, "Job completed: {}", message);
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Create a tracing span for this job.
    pub fn create_span(&self) -> Span {
        tracing::info_span!("job", job_id = %self.job_id, kind = %self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reel_models::{JobRequest, RenderWaveformPayload};

    #[test]
    fn test_job_logger_creation() {
        let job_id = JobId::new();
        let logger = JobLogger::new(&job_id, "merge");

        assert_eq!(logger.job_id(), job_id.to_string());
        assert_eq!(logger.kind(), "merge");
    }

    #[test]
    fn test_job_logger_for_job() {
        let job = Job::new(JobRequest::RenderWaveform(RenderWaveformPayload::default()));
        let logger = JobLogger::for_job(&job);

        assert_eq!(logger.job_id(), job.id.as_str());
        assert_eq!(logger.kind(), "render_waveform");
    }
}
