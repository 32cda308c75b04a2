//! Health check handlers.

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use reel_models::JobStatus;

use crate::state::AppState;

/// Health response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
    pub queue: QueueSummary,
}

/// Job counts by status.
#[derive(Serialize, Default)]
pub struct QueueSummary {
    pub queued: usize,
    pub running: usize,
    pub done: usize,
    pub failed: usize,
}

/// Health check endpoint (liveness probe).
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let mut queue = QueueSummary::default();
    for job in state.jobs.list().await {
        match job.status {
            JobStatus::Queued => queue.queued += 1,
            JobStatus::Running => queue.running += 1,
            JobStatus::Done => queue.done += 1,
            JobStatus::Failed => queue.failed += 1,
        }
    }

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
        queue,
    })
}
