//! Render job engine.
//!
//! This crate provides:
//! - Submission-time validation and enqueueing (`JobService`)
//! - A single-flight scheduler that executes queued jobs
//! - Recovery of stale running jobs left by a previous process
//! - Synchronous rendering for the audio tools

pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod reaper;
pub mod render;
pub mod scheduler;
pub mod service;

pub use config::WorkerConfig;
pub use context::WorkerContext;
pub use error::{WorkerError, WorkerResult};
pub use logging::JobLogger;
pub use reaper::{reap_orphans, reap_stale_jobs, REAPER_MESSAGE, STALE_MESSAGE};
pub use render::RenderOutput;
pub use scheduler::{Scheduler, SchedulerHandle};
pub use service::JobService;
