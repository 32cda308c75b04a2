//! Job submission and inspection handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use serde_json::Value;

use reel_models::{Job, JobId, JobRequest};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Job list response, newest first.
#[derive(Debug, Serialize)]
pub struct JobListResponse {
    pub jobs: Vec<Job>,
}

/// Submit a job: `{"type": ..., "payload": {...}}`.
pub async fn create_job(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> ApiResult<(StatusCode, Json<Job>)> {
    let request: JobRequest = serde_json::from_value(body)
        .map_err(|e| ApiError::bad_request(format!("invalid job request: {}", e)))?;

    let job = state.jobs.submit(request).await?;
    Ok((StatusCode::CREATED, Json(job)))
}

pub async fn list_jobs(State(state): State<AppState>) -> Json<JobListResponse> {
    Json(JobListResponse {
        jobs: state.jobs.list().await,
    })
}

pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<Job>> {
    let job = state.jobs.get(&JobId::from(job_id)).await?;
    Ok(Json(job))
}
