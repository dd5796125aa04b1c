//! Read-only job status lookups.

use std::sync::Arc;

use serde::Serialize;
use taskhub_core::error::CoreError;
use taskhub_core::job::{JobRecord, JobStatus};
use taskhub_core::types::JobId;

use crate::backend::Backend;
use crate::store::ResultStore;

/// What a caller sees when polling a job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobStatusView {
    pub status: JobStatus,
    /// Success value, the error description for FAILURE, `null` otherwise.
    pub result: serde_json::Value,
}

impl From<JobRecord> for JobStatusView {
    fn from(record: JobRecord) -> Self {
        let result = match record.status {
            JobStatus::Success => record.result.unwrap_or(serde_json::Value::Null),
            JobStatus::Failure => record
                .error
                .map(serde_json::Value::String)
                .unwrap_or(serde_json::Value::Null),
            JobStatus::Pending | JobStatus::Started => serde_json::Value::Null,
        };
        Self {
            status: record.status,
            result,
        }
    }
}

/// Read-through view of the result store. No side effects.
#[derive(Clone)]
pub struct StatusReader {
    store: Arc<dyn ResultStore>,
}

impl StatusReader {
    pub fn new(backend: &Backend) -> Self {
        Self {
            store: Arc::clone(&backend.store),
        }
    }

    /// Current status of a job; [`CoreError::NotFound`] for unknown ids.
    pub async fn status(&self, id: &JobId) -> Result<JobStatusView, CoreError> {
        self.store.get(id).await.map(JobStatusView::from)
    }
}
