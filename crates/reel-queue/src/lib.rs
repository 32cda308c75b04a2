//! Durable job storage for the render service.
//!
//! This crate provides:
//! - A crash-safe JSON job store with backup, quarantine and retention
//! - An in-memory progress map merged into running jobs on read

pub mod error;
pub mod progress;
pub mod store;

pub use error::{QueueError, QueueResult};
pub use progress::ProgressMap;
pub use store::{
    JobStore, LoadSource, StoreConfig, StoreSnapshot, DEFAULT_MAX_JOBS, STORE_FORMAT_VERSION,
    STORE_FILE_NAME,
};
