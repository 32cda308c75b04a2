//! Axum HTTP API for the render service.
//!
//! This crate provides:
//! - Job submission, listing and lookup
//! - Synchronous audio tools (merge, timeline, preview)
//! - Static serving of rendered outputs
//! - Health and Prometheus metrics endpoints

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
