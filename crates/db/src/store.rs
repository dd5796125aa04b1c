//! Result store on the `job_records` table.

use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use taskhub_core::error::CoreError;
use taskhub_core::job::{JobKind, JobRecord, JobStatus, StatusId};
use taskhub_core::types::{JobId, Timestamp};
use taskhub_jobs::ResultStore;
use uuid::Uuid;

/// Column list for `job_records` queries.
const COLUMNS: &str = "\
    id, kind, status_id, result, error_message, \
    created_at, started_at, finished_at, updated_at";

/// Terminal statuses: success, failure.
const TERMINAL_STATUSES: [StatusId; 2] = [
    JobStatus::Success as StatusId,
    JobStatus::Failure as StatusId,
];

/// A row from the `job_records` table.
#[derive(Debug, Clone, FromRow)]
struct JobRecordRow {
    id: Uuid,
    kind: String,
    status_id: StatusId,
    result: Option<serde_json::Value>,
    error_message: Option<String>,
    created_at: Timestamp,
    started_at: Option<Timestamp>,
    finished_at: Option<Timestamp>,
    updated_at: Timestamp,
}

impl TryFrom<JobRecordRow> for JobRecord {
    type Error = CoreError;

    fn try_from(row: JobRecordRow) -> Result<Self, Self::Error> {
        let kind = JobKind::from_name(&row.kind)
            .ok_or_else(|| CoreError::Storage(format!("unknown job kind '{}'", row.kind)))?;
        let status = JobStatus::from_id(row.status_id)
            .ok_or_else(|| CoreError::Storage(format!("unknown status id {}", row.status_id)))?;

        Ok(JobRecord {
            id: JobId::from(row.id),
            kind,
            status,
            result: row.result,
            error: row.error_message,
            created_at: row.created_at,
            started_at: row.started_at,
            finished_at: row.finished_at,
            updated_at: row.updated_at,
        })
    }
}

fn storage(err: sqlx::Error) -> CoreError {
    CoreError::Storage(err.to_string())
}

/// Result store backed by Postgres.
///
/// `put` is one upsert whose `WHERE` clause encodes the lifecycle rule, so
/// concurrent writers cannot move a record backwards or out of a terminal
/// status.
pub struct PgResultStore {
    pool: PgPool,
}

impl PgResultStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResultStore for PgResultStore {
    async fn put(&self, record: JobRecord) -> Result<(), CoreError> {
        let result = sqlx::query(
            "INSERT INTO job_records \
                 (id, kind, status_id, result, error_message, \
                  created_at, started_at, finished_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (id) DO UPDATE SET \
                 status_id = EXCLUDED.status_id, \
                 result = EXCLUDED.result, \
                 error_message = EXCLUDED.error_message, \
                 started_at = EXCLUDED.started_at, \
                 finished_at = EXCLUDED.finished_at, \
                 updated_at = EXCLUDED.updated_at \
             WHERE job_records.status_id NOT IN ($10, $11) \
               AND EXCLUDED.status_id >= job_records.status_id",
        )
        .bind(*record.id.as_uuid())
        .bind(record.kind.as_str())
        .bind(record.status.id())
        .bind(&record.result)
        .bind(&record.error)
        .bind(record.created_at)
        .bind(record.started_at)
        .bind(record.finished_at)
        .bind(record.updated_at)
        .bind(TERMINAL_STATUSES[0])
        .bind(TERMINAL_STATUSES[1])
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        if result.rows_affected() == 0 {
            let current = self.get(&record.id).await?;
            return Err(CoreError::InvalidTransition {
                id: record.id.to_string(),
                from: current.status,
                to: record.status,
            });
        }
        Ok(())
    }

    async fn get(&self, id: &JobId) -> Result<JobRecord, CoreError> {
        let query = format!("SELECT {COLUMNS} FROM job_records WHERE id = $1");
        sqlx::query_as::<_, JobRecordRow>(&query)
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?
            .ok_or_else(|| CoreError::job_not_found(id))?
            .try_into()
    }

    async fn remove(&self, id: &JobId) -> Result<(), CoreError> {
        sqlx::query("DELETE FROM job_records WHERE id = $1")
            .bind(*id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(storage)?;
        Ok(())
    }

    async fn purge_finished_before(&self, cutoff: Timestamp) -> Result<u64, CoreError> {
        let result = sqlx::query(
            "DELETE FROM job_records \
             WHERE status_id IN ($1, $2) AND finished_at < $3",
        )
        .bind(TERMINAL_STATUSES[0])
        .bind(TERMINAL_STATUSES[1])
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(result.rows_affected())
    }
}
