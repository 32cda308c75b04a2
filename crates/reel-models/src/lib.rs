//! Shared data models for the render service.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs, job identifiers and lifecycle status
//! - Render request payloads (tagged by job type)
//! - Synchronous audio tool requests (merge, timeline, preview)
//! - Aspect presets and audio mastering parameters

pub mod error;
pub mod job;
pub mod media;
pub mod request;

// Re-export common types
pub use error::{ModelError, ModelResult};
pub use job::{Job, JobError, JobId, JobKind, JobResult, JobStatus};
pub use media::{AspectPreset, AudioClip, MasteringParams};
pub use request::{
    JobRequest, MergeRequest, PreviewRequest, RenderVideoPayload, RenderWaveformPayload,
    TimelineRequest,
};
