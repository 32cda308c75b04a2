//! Job records persisted by the job store.

use chrono::{DateTime, Duration, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::request::JobRequest;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Job lifecycle status.
///
/// `queued -> running -> {done | failed}`; terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for the scheduler
    #[default]
    Queued,
    /// Currently executing
    Running,
    /// Finished successfully
    Done,
    /// Finished with an error
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The closed set of queued job kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Captioned video over a background
    RenderVideo,
    /// Audio-reactive waveform video
    RenderWaveform,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::RenderVideo => "render_video",
            JobKind::RenderWaveform => "render_waveform",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of a successful job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    /// Absolute path of the produced file inside the output store
    pub out_file: String,
    /// Public URL under the output prefix
    pub url: String,
    /// Rendered duration in seconds
    pub duration_sec: f64,
}

/// Error attached to a failed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobError {
    /// Human-readable message
    pub message: String,
    /// Bounded tail of the engine's diagnostic output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl JobError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: Option<String>) -> Self {
        self.detail = detail.filter(|d| !d.trim().is_empty());
        self
    }
}

/// A unit of asynchronous render work.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    /// Unique job ID
    pub id: JobId,

    /// Job type and payload (`{"type": ..., "payload": ...}`)
    #[serde(flatten)]
    pub request: JobRequest,

    #[serde(default)]
    pub status: JobStatus,

    /// Progress (0-100)
    #[serde(default)]
    pub progress: u8,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,

    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a new queued job.
    pub fn new(request: JobRequest) -> Self {
        Self {
            id: JobId::new(),
            request,
            status: JobStatus::Queued,
            progress: 0,
            result: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    pub fn kind(&self) -> JobKind {
        self.request.kind()
    }

    /// Transition to `running`.
    pub fn start(&mut self, now: DateTime<Utc>) {
        self.status = JobStatus::Running;
        self.started_at = Some(now);
        self.progress = 0;
    }

    /// Transition to `done`.
    pub fn complete(&mut self, result: JobResult, now: DateTime<Utc>) {
        self.status = JobStatus::Done;
        self.progress = 100;
        self.result = Some(result);
        self.error = None;
        self.finished_at = Some(now);
    }

    /// Transition to `failed`, keeping the last known progress if any.
    pub fn fail(&mut self, error: JobError, last_progress: Option<u8>, now: DateTime<Utc>) {
        self.status = JobStatus::Failed;
        self.result = None;
        self.error = Some(error);
        if let Some(progress) = last_progress {
            self.progress = progress.min(100);
        }
        self.finished_at = Some(now);
    }

    /// A running job whose start (or creation) is older than `threshold`.
    pub fn is_stale(&self, threshold: Duration, now: DateTime<Utc>) -> bool {
        if self.status != JobStatus::Running {
            return false;
        }
        let since = self.started_at.unwrap_or(self.created_at);
        now - since > threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::RenderVideoPayload;

    fn sample_job() -> Job {
        Job::new(JobRequest::RenderVideo(RenderVideoPayload {
            background_path: "/media/bg.mp4".into(),
            lines: vec!["Hello".into()],
            duration_sec: Some(20.0),
            ..Default::default()
        }))
    }

    #[test]
    fn test_job_status_terminal() {
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Done.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn test_job_transitions() {
        let mut job = sample_job();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.kind(), JobKind::RenderVideo);

        job.start(Utc::now());
        assert_eq!(job.status, JobStatus::Running);
        assert!(job.started_at.is_some());

        job.complete(
            JobResult {
                out_file: "/out/a.mp4".into(),
                url: "/outputs/a.mp4".into(),
                duration_sec: 20.0,
            },
            Utc::now(),
        );
        assert_eq!(job.status, JobStatus::Done);
        assert_eq!(job.progress, 100);
        assert!(job.error.is_none());
    }

    #[test]
    fn test_fail_keeps_last_progress() {
        let mut job = sample_job();
        job.start(Utc::now());
        job.fail(JobError::new("boom"), Some(42), Utc::now());

        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.progress, 42);
        assert!(job.result.is_none());
        assert_eq!(job.error.as_ref().unwrap().message, "boom");
    }

    #[test]
    fn test_stale_detection() {
        let mut job = sample_job();
        let threshold = Duration::seconds(60);

        // Only running jobs can be stale
        job.created_at = Utc::now() - Duration::seconds(600);
        assert!(!job.is_stale(threshold, Utc::now()));

        job.start(Utc::now());
        assert!(!job.is_stale(threshold, Utc::now()));

        job.started_at = Some(Utc::now() - Duration::seconds(120));
        assert!(job.is_stale(threshold, Utc::now()));

        // Falls back to created_at without a start timestamp
        job.started_at = None;
        assert!(job.is_stale(threshold, Utc::now()));
    }

    #[test]
    fn test_job_json_shape() {
        let job = sample_job();
        let value = serde_json::to_value(&job).unwrap();

        assert_eq!(value["type"], "render_video");
        assert_eq!(value["status"], "queued");
        assert_eq!(value["payload"]["backgroundPath"], "/media/bg.mp4");
        assert!(value.get("result").is_none());

        let back: Job = serde_json::from_value(value).unwrap();
        assert_eq!(back.id, job.id);
        assert_eq!(back.request, job.request);
    }

    #[test]
    fn test_job_error_drops_blank_detail() {
        let err = JobError::new("failed").with_detail(Some("   ".into()));
        assert!(err.detail.is_none());
    }
}
