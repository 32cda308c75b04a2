//! Synchronous audio tools: merge, timeline and preview.
//!
//! These run through the same compiler and supervisor as queued jobs but
//! block the request until the render finishes.

use axum::extract::State;
use axum::Json;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use reel_media::MediaRequest;
use reel_models::{MergeRequest, PreviewRequest, TimelineRequest};
use reel_worker::RenderOutput;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Tool response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResponse {
    pub out_file: String,
    pub url: String,
    pub duration_sec: f64,
}

impl From<RenderOutput> for ToolResponse {
    fn from(output: RenderOutput) -> Self {
        Self {
            out_file: output.out_file.to_string_lossy().into_owned(),
            url: output.url,
            duration_sec: output.duration_sec,
        }
    }
}

fn parse_body<T: DeserializeOwned>(body: Value, what: &str) -> ApiResult<T> {
    serde_json::from_value(body)
        .map_err(|e| ApiError::bad_request(format!("invalid {} request: {}", what, e)))
}

async fn run_tool(state: &AppState, request: MediaRequest) -> ApiResult<Json<ToolResponse>> {
    let output = state.jobs.render_now(request).await?;
    Ok(Json(output.into()))
}

pub async fn merge_audio(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> ApiResult<Json<ToolResponse>> {
    let request: MergeRequest = parse_body(body, "merge")?;
    run_tool(&state, MediaRequest::Merge(request)).await
}

pub async fn build_timeline(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> ApiResult<Json<ToolResponse>> {
    let request: TimelineRequest = parse_body(body, "timeline")?;
    run_tool(&state, MediaRequest::Timeline(request)).await
}

pub async fn render_preview(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> ApiResult<Json<ToolResponse>> {
    let request: PreviewRequest = parse_body(body, "preview")?;
    run_tool(&state, MediaRequest::Preview(request)).await
}
