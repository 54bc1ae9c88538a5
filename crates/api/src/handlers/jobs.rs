//! Handlers for the `/jobs` resource.
//!
//! Submission returns before the pipeline starts executing: the job
//! record is created, the owning task is spawned, and the identifier
//! plus subscription address go straight back to the caller.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use validator::Validate;

use reelpress_core::error::CoreError;
use reelpress_core::job::{JobId, JobSnapshot, SubmitJob};

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Response payload for a newly submitted job.
#[derive(Debug, Serialize)]
pub struct SubmittedJob {
    /// Identifier of the created job.
    pub id: JobId,
    /// Address of the job's event stream.
    pub subscribe_url: String,
}

/// A job identifier together with its current snapshot.
#[derive(Debug, Serialize)]
pub struct JobListItem {
    pub id: JobId,
    #[serde(flatten)]
    pub snapshot: JobSnapshot,
}

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs
///
/// Submit a new fetch/transcode job. Returns 201 with the identifier
/// and subscription address; the pipeline runs independently of this
/// request.
pub async fn submit_job(
    State(state): State<AppState>,
    Json(input): Json<SubmitJob>,
) -> AppResult<impl IntoResponse> {
    input
        .validate()
        .map_err(|e| AppError::Core(CoreError::Validation(e.to_string())))?;

    let id = state.registry.create().await;
    state.pipeline.launch(id, input.url.clone());

    tracing::info!(job_id = %id, url = %input.url, "Job submitted");

    Ok((
        StatusCode::CREATED,
        Json(DataResponse {
            data: SubmittedJob {
                id,
                subscribe_url: format!("/api/v1/jobs/{id}/events"),
            },
        }),
    ))
}

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs
///
/// List all known jobs with their current snapshots, newest first.
pub async fn list_jobs(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let jobs: Vec<JobListItem> = state
        .registry
        .list()
        .await
        .into_iter()
        .map(|(id, snapshot)| JobListItem { id, snapshot })
        .collect();

    Ok(Json(DataResponse { data: jobs }))
}

// ---------------------------------------------------------------------------
// Get
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs/{id}
///
/// Synchronous state query for a single job.
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    let snapshot = state
        .registry
        .get(id)
        .await
        .ok_or(AppError::Core(CoreError::NotFound { entity: "Job", id }))?;

    Ok(Json(DataResponse { data: snapshot }))
}
