//! Worker pool: long-lived loops that drain the broker.
//!
//! Each loop takes one job at a time, records STARTED, runs the handler on
//! its own task and records the terminal outcome before acknowledging the
//! delivery. Handler errors and panics both end up as FAILURE records; the
//! loop itself only stops when cancelled.

use std::sync::Arc;
use std::time::Duration;

use taskhub_core::error::CoreError;
use taskhub_core::job::{Job, JobPayload, JobRecord};
use taskhub_jobs::Backend;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::Instrument;

use crate::error::HandlerError;
use crate::handlers::JobRunner;

/// Default back-off after the broker reports itself unavailable.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// A fixed number of worker loops sharing one backend and one runner.
pub struct WorkerPool {
    backend: Backend,
    runner: Arc<dyn JobRunner>,
    concurrency: usize,
    retry_delay: Duration,
}

/// Handle to running worker loops.
pub struct PoolHandle {
    tracker: TaskTracker,
    workers: usize,
}

impl PoolHandle {
    pub fn worker_count(&self) -> usize {
        self.workers
    }

    /// Wait until every loop has exited. Loops exit only after the
    /// cancellation token passed to [`WorkerPool::spawn`] fires.
    pub async fn join(self) {
        self.tracker.wait().await;
    }
}

impl WorkerPool {
    /// A single-worker pool with the default retry delay.
    pub fn new(backend: Backend, runner: Arc<dyn JobRunner>) -> Self {
        Self {
            backend,
            runner,
            concurrency: 1,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Start the worker loops.
    pub fn spawn(self, cancel: CancellationToken) -> PoolHandle {
        let tracker = TaskTracker::new();
        let workers = self.concurrency;
        let shared = Arc::new(self);

        for worker in 0..workers {
            let shared = Arc::clone(&shared);
            let cancel = cancel.clone();
            tracker.spawn(async move { shared.run_worker(worker, cancel).await });
        }
        tracker.close();

        tracing::info!(workers, "Worker pool started");
        PoolHandle { tracker, workers }
    }

    async fn run_worker(&self, worker: usize, cancel: CancellationToken) {
        tracing::debug!(worker, "Worker loop started");

        loop {
            let delivery = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                delivery = self.backend.broker.dequeue() => delivery,
            };

            match delivery {
                Ok(job) => {
                    let span = tracing::info_span!(
                        "job",
                        job_id = %job.id,
                        kind = %job.kind().as_str(),
                        worker,
                    );
                    self.process(job).instrument(span).await;
                }
                Err(e) => {
                    tracing::warn!(
                        worker,
                        error = %e,
                        retry_ms = self.retry_delay.as_millis() as u64,
                        "Broker unavailable, retrying",
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.retry_delay) => {}
                    }
                }
            }
        }

        tracing::debug!(worker, "Worker loop stopped");
    }

    /// Run one delivered job through its lifecycle.
    ///
    /// Deliveries are acknowledged once the outcome is recorded, or when the
    /// record shows the job already finished (a redelivery). When the store
    /// cannot be written the delivery is left unacknowledged so a durable
    /// broker hands it out again.
    async fn process(&self, job: Job) {
        let store = &self.backend.store;

        let record = match store.get(&job.id).await {
            Ok(record) => record,
            Err(CoreError::NotFound { .. }) => {
                tracing::warn!("No record for delivered job, recreating");
                JobRecord::pending(job.id, job.kind())
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to read job record, leaving delivery unacknowledged");
                return;
            }
        };

        if record.is_terminal() {
            tracing::info!(status = %record.status, "Job already finished, skipping redelivery");
            self.ack(&job).await;
            return;
        }

        let started = record.started();
        match store.put(started.clone()).await {
            Ok(()) => tracing::info!("Job started"),
            Err(CoreError::InvalidTransition { from, .. }) => {
                tracing::info!(status = %from, "Job finished elsewhere, skipping redelivery");
                self.ack(&job).await;
                return;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to mark job started, leaving delivery unacknowledged");
                return;
            }
        }

        let finished = match self.execute(job.payload.clone()).await {
            Ok(result) => started.succeeded(result),
            Err(e) => {
                tracing::warn!(error = %e, "Job failed");
                started.failed(e.to_string())
            }
        };
        let status = finished.status;

        match store.put(finished).await {
            Ok(()) => tracing::info!(%status, "Job finished"),
            Err(CoreError::InvalidTransition { from, .. }) => {
                tracing::warn!(status = %from, "Another delivery finished the job first");
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to record job outcome, leaving delivery unacknowledged");
                return;
            }
        }

        self.ack(&job).await;
    }

    /// Run the handler on a separate task so a panic is contained to the job.
    async fn execute(&self, payload: JobPayload) -> Result<serde_json::Value, HandlerError> {
        let runner = Arc::clone(&self.runner);
        tokio::spawn(async move { runner.run(payload).await }).await?
    }

    async fn ack(&self, job: &Job) {
        if let Err(e) = self.backend.broker.ack(&job.id).await {
            tracing::error!(error = %e, "Failed to acknowledge job");
        }
    }
}
