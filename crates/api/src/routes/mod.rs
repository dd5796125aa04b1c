pub mod health;

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::{artifacts, tasks, upscale};
use crate::state::AppState;

/// Job submission, status polling and artifact retrieval.
///
/// ```text
/// GET  /                      submit the two demo SIMPLE jobs
/// POST /tasks                 submit a SIMPLE job
/// POST /upscale               upload an image and submit an UPSCALE job
/// GET  /tasks/{task_id}       job status
/// GET  /{task_id}             job status (short form)
/// GET  /processed/{file}      download an artifact by file name
/// ```
pub fn task_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(tasks::submit_demo))
        .route("/tasks", post(tasks::submit_task))
        .route("/tasks/{task_id}", get(tasks::get_status))
        .route("/upscale", post(upscale::submit_upscale))
        .route("/processed/{file}", get(artifacts::get_artifact))
        .route("/{task_id}", get(tasks::get_status))
}
