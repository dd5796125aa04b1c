//! Client-facing submission of jobs.

use std::sync::Arc;

use taskhub_core::error::CoreError;
use taskhub_core::job::{Job, JobPayload, JobRecord};
use taskhub_core::types::JobId;

use crate::backend::Backend;
use crate::broker::Broker;
use crate::store::ResultStore;

/// Assigns ids to new jobs, records them as PENDING and queues them.
///
/// Never waits for a worker.
#[derive(Clone)]
pub struct JobDispatcher {
    broker: Arc<dyn Broker>,
    store: Arc<dyn ResultStore>,
}

impl JobDispatcher {
    pub fn new(backend: &Backend) -> Self {
        Self {
            broker: Arc::clone(&backend.broker),
            store: Arc::clone(&backend.store),
        }
    }

    /// Submit a job and return its id.
    ///
    /// The PENDING record is written before the job is queued, so a worker
    /// or a status poll can never observe the id without a record. If the
    /// broker rejects the job the record is rolled back and the
    /// [`CoreError::BrokerUnavailable`] is returned to the caller.
    pub async fn submit(&self, payload: JobPayload) -> Result<JobId, CoreError> {
        let id = JobId::new();
        let kind = payload.kind();

        self.store.put(JobRecord::pending(id, kind)).await?;

        if let Err(e) = self.broker.enqueue(Job::new(id, payload)).await {
            tracing::error!(job_id = %id, kind = %kind, error = %e, "Failed to enqueue job");
            if let Err(cleanup) = self.store.remove(&id).await {
                tracing::warn!(job_id = %id, error = %cleanup, "Failed to roll back pending record");
            }
            return Err(e);
        }

        tracing::info!(job_id = %id, kind = %kind, "Job submitted");
        Ok(id)
    }
}
