//! JSON schema of the submission body, for client generation.

use axum::Json;
use schemars::schema::RootSchema;
use schemars::schema_for;

use reel_models::JobRequest;

pub async fn job_request_schema() -> Json<RootSchema> {
    Json(schema_for!(JobRequest))
}
