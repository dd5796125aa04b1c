//! Response bodies shared by the task handlers.

use serde::Serialize;
use taskhub_core::types::JobId;

/// `202 Accepted` body for a newly submitted job.
#[derive(Debug, Serialize)]
pub struct TaskAccepted {
    pub task_id: JobId,
}

/// Body of `GET /`: the ids of the two demo SIMPLE jobs.
#[derive(Debug, Serialize)]
pub struct DemoSubmission {
    pub res_1: JobId,
    pub res_2: JobId,
}
