//! SIMPLE job submission and status polling.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use taskhub_core::error::CoreError;
use taskhub_core::job::JobPayload;
use taskhub_core::types::JobId;
use taskhub_jobs::JobStatusView;

use crate::error::AppResult;
use crate::response::{DemoSubmission, TaskAccepted};
use crate::state::AppState;

/// Body of `POST /tasks`.
///
/// UPSCALE jobs need an uploaded file and go through `POST /upscale`.
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskRequest {
    Simple(i64),
}

impl From<TaskRequest> for JobPayload {
    fn from(request: TaskRequest) -> Self {
        match request {
            TaskRequest::Simple(value) => JobPayload::Simple(value),
        }
    }
}

/// GET /
///
/// Submits SIMPLE(1) and SIMPLE(2) and returns both ids without waiting.
pub async fn submit_demo(State(state): State<AppState>) -> AppResult<Json<DemoSubmission>> {
    let res_1 = state.dispatcher.submit(JobPayload::Simple(1)).await?;
    let res_2 = state.dispatcher.submit(JobPayload::Simple(2)).await?;
    Ok(Json(DemoSubmission { res_1, res_2 }))
}

/// POST /tasks
pub async fn submit_task(
    State(state): State<AppState>,
    body: Result<Json<TaskRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<TaskAccepted>)> {
    let Json(request) = body?;
    let task_id = state.dispatcher.submit(request.into()).await?;
    Ok((StatusCode::ACCEPTED, Json(TaskAccepted { task_id })))
}

/// GET /tasks/{task_id} and GET /{task_id}
///
/// An id that is not a UUID cannot name a job, so it is reported the same
/// way as an unknown one.
pub async fn get_status(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> AppResult<Json<JobStatusView>> {
    let id: JobId = task_id
        .parse()
        .map_err(|_| CoreError::job_not_found(&task_id))?;
    let view = state.status.status(&id).await?;
    Ok(Json(view))
}
