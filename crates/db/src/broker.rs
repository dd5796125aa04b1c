//! Durable broker queue on the `job_queue` table.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use taskhub_core::error::CoreError;
use taskhub_core::job::{Job, JobPayload};
use taskhub_core::types::JobId;
use taskhub_jobs::Broker;
use uuid::Uuid;

/// Default delay between claim attempts while the queue is empty.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Default time after which an unacknowledged claim is handed out again.
pub const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(1800);

/// Tuning knobs for [`PgBroker`].
#[derive(Debug, Clone, Copy)]
pub struct PgBrokerOptions {
    /// How long `dequeue` sleeps between empty claim attempts.
    pub poll_interval: Duration,
    /// How long a claimed job may stay unacknowledged before another worker
    /// may claim it.
    pub visibility_timeout: Duration,
}

impl Default for PgBrokerOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            visibility_timeout: DEFAULT_VISIBILITY_TIMEOUT,
        }
    }
}

/// Broker backed by Postgres.
///
/// Claims use `SELECT FOR UPDATE SKIP LOCKED` so concurrent workers never
/// receive the same row at the same time. A row is deleted on `ack`; a
/// claim that is never acknowledged (worker crashed) expires after the
/// visibility timeout and the job is delivered again.
pub struct PgBroker {
    pool: PgPool,
    options: PgBrokerOptions,
}

/// Rows a consumer may claim: never claimed, or claimed longer ago than the
/// visibility timeout bound to `$1` (seconds).
const DELIVERABLE: &str =
    "(claimed_at IS NULL OR claimed_at < NOW() - make_interval(secs => $1))";

fn unavailable(err: sqlx::Error) -> CoreError {
    CoreError::BrokerUnavailable(err.to_string())
}

impl PgBroker {
    pub fn new(pool: PgPool, options: PgBrokerOptions) -> Self {
        Self { pool, options }
    }

    /// Atomically claim the oldest deliverable row, if any.
    pub async fn claim_next(&self) -> Result<Option<Job>, CoreError> {
        loop {
            let query = format!(
                "UPDATE job_queue \
                 SET claimed_at = NOW(), deliveries = deliveries + 1 \
                 WHERE seq = ( \
                     SELECT seq FROM job_queue \
                     WHERE {DELIVERABLE} \
                     ORDER BY seq ASC \
                     LIMIT 1 \
                     FOR UPDATE SKIP LOCKED \
                 ) \
                 RETURNING job_id, payload, deliveries"
            );
            let row = sqlx::query_as::<_, (Uuid, serde_json::Value, i32)>(&query)
                .bind(self.options.visibility_timeout.as_secs_f64())
                .fetch_optional(&self.pool)
                .await
                .map_err(unavailable)?;

            let Some((job_id, payload, deliveries)) = row else {
                return Ok(None);
            };

            match serde_json::from_value::<JobPayload>(payload) {
                Ok(payload) => {
                    if deliveries > 1 {
                        tracing::warn!(job_id = %job_id, deliveries, "Redelivering unacknowledged job");
                    }
                    return Ok(Some(Job::new(JobId::from(job_id), payload)));
                }
                Err(e) => {
                    // Undecodable rows would otherwise be redelivered forever.
                    tracing::error!(job_id = %job_id, error = %e, "Dropping undecodable queue row");
                    self.ack(&JobId::from(job_id)).await?;
                }
            }
        }
    }
}

#[async_trait]
impl Broker for PgBroker {
    async fn enqueue(&self, job: Job) -> Result<(), CoreError> {
        let payload = serde_json::to_value(&job.payload)
            .map_err(|e| CoreError::Internal(format!("serialize job payload: {e}")))?;

        sqlx::query("INSERT INTO job_queue (job_id, payload) VALUES ($1, $2)")
            .bind(Uuid::from(job.id))
            .bind(payload)
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn dequeue(&self) -> Result<Job, CoreError> {
        loop {
            if let Some(job) = self.claim_next().await? {
                return Ok(job);
            }
            tokio::time::sleep(self.options.poll_interval).await;
        }
    }

    async fn ack(&self, id: &JobId) -> Result<(), CoreError> {
        sqlx::query("DELETE FROM job_queue WHERE job_id = $1")
            .bind(*id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    /// Jobs waiting for a consumer, including expired claims that are due
    /// for redelivery.
    async fn depth(&self) -> Result<usize, CoreError> {
        let query = format!("SELECT COUNT(*) FROM job_queue WHERE {DELIVERABLE}");
        let count: i64 = sqlx::query_scalar(&query)
            .bind(self.options.visibility_timeout.as_secs_f64())
            .fetch_one(&self.pool)
            .await
            .map_err(unavailable)?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}
