use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::error;

use crate::jobs::{JobManager, JobStatus, JobType};

#[derive(Serialize)]
pub struct JobResponse {
    id: i64,
    job_type: JobType,
    status: JobStatus,
    progress: f64,
    result: Option<serde_json::Value>,
    created_at: String,
    updated_at: String,
}

pub fn router(job_manager: Arc<JobManager>) -> Router {
    Router::new()
        .route("/:id", get(get_job))
        .with_state(job_manager)
}

async fn get_job(
    State(job_manager): State<Arc<JobManager>>,
    Path(id): Path<i64>,
) -> Result<Json<JobResponse>, StatusCode> {
    let job = job_manager
        .get_job(id)
        .map_err(|e| {
            error!("Failed to load job {}: {:?}", id, e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(JobResponse {
        id: job.id,
        job_type: job.job_type,
        status: job.status,
        progress: job.progress,
        result: job.result,
        created_at: job.created_at.to_rfc3339(),
        updated_at: job.updated_at.to_rfc3339(),
    }))
}
