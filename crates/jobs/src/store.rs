//! Result store: job records addressable by job id.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use taskhub_core::error::CoreError;
use taskhub_core::job::JobRecord;
use taskhub_core::types::{JobId, Timestamp};

/// Keyed record of job outcomes.
///
/// Writes replace a record whole, so a concurrent reader sees either the
/// previous or the new record. Implementations enforce the lifecycle rule
/// from [`JobStatus::can_transition_to`](taskhub_core::job::JobStatus::can_transition_to).
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Insert or replace the record for `record.id`.
    ///
    /// Fails with [`CoreError::InvalidTransition`] when the stored record is
    /// terminal or further along than `record`.
    async fn put(&self, record: JobRecord) -> Result<(), CoreError>;

    /// Fetch a record. Unknown ids are [`CoreError::NotFound`].
    async fn get(&self, id: &JobId) -> Result<JobRecord, CoreError>;

    /// Delete a record if present.
    async fn remove(&self, id: &JobId) -> Result<(), CoreError>;

    /// Delete terminal records that finished before `cutoff`.
    /// Returns how many were removed.
    async fn purge_finished_before(&self, cutoff: Timestamp) -> Result<u64, CoreError>;
}

// ---------------------------------------------------------------------------
// MemoryResultStore
// ---------------------------------------------------------------------------

/// Number of independently locked partitions.
const SHARD_COUNT: usize = 16;

type Shard = RwLock<HashMap<JobId, JobRecord>>;

/// In-process result store.
///
/// Records are spread over [`SHARD_COUNT`] independently locked maps so
/// that writers of unrelated jobs rarely contend.
pub struct MemoryResultStore {
    shards: Vec<Shard>,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self {
            shards: (0..SHARD_COUNT).map(|_| RwLock::default()).collect(),
        }
    }

    /// Total number of records held.
    pub fn record_count(&self) -> usize {
        self.shards
            .iter()
            .map(|s| s.read().unwrap_or_else(PoisonError::into_inner).len())
            .sum()
    }

    fn shard(&self, id: &JobId) -> &Shard {
        // v4 ids are random, so the low bits spread evenly.
        let index = (id.as_uuid().as_u128() % SHARD_COUNT as u128) as usize;
        &self.shards[index]
    }

    fn read(&self, id: &JobId) -> RwLockReadGuard<'_, HashMap<JobId, JobRecord>> {
        self.shard(id).read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self, id: &JobId) -> RwLockWriteGuard<'_, HashMap<JobId, JobRecord>> {
        self.shard(id).write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryResultStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResultStore for MemoryResultStore {
    async fn put(&self, record: JobRecord) -> Result<(), CoreError> {
        let mut shard = self.write(&record.id);
        if let Some(current) = shard.get(&record.id) {
            if !current.status.can_transition_to(record.status) {
                return Err(CoreError::InvalidTransition {
                    id: record.id.to_string(),
                    from: current.status,
                    to: record.status,
                });
            }
        }
        shard.insert(record.id, record);
        Ok(())
    }

    async fn get(&self, id: &JobId) -> Result<JobRecord, CoreError> {
        self.read(id)
            .get(id)
            .cloned()
            .ok_or_else(|| CoreError::job_not_found(id))
    }

    async fn remove(&self, id: &JobId) -> Result<(), CoreError> {
        self.write(id).remove(id);
        Ok(())
    }

    async fn purge_finished_before(&self, cutoff: Timestamp) -> Result<u64, CoreError> {
        let mut purged = 0u64;
        for shard in &self.shards {
            let mut records = shard.write().unwrap_or_else(PoisonError::into_inner);
            let before = records.len();
            records.retain(|_, record| {
                !(record.is_terminal() && record.finished_at.is_some_and(|at| at < cutoff))
            });
            purged += (before - records.len()) as u64;
        }
        Ok(purged)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
