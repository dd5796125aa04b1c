//! Broker queue: ordered hand-off of jobs from submitters to workers.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use taskhub_core::error::CoreError;
use taskhub_core::job::Job;
use taskhub_core::types::JobId;
use tokio::sync::Notify;

/// Queue between the job dispatcher and the worker pool.
///
/// Delivery is at-least-once and approximately FIFO. A job handed out by
/// [`dequeue`](Broker::dequeue) may be delivered again until it has been
/// [`ack`](Broker::ack)ed, so handlers must tolerate duplicate runs.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Append a job. Fails with [`CoreError::BrokerUnavailable`] when the
    /// queue cannot be reached; the job is not queued in that case.
    async fn enqueue(&self, job: Job) -> Result<(), CoreError>;

    /// Wait until a job is available and take it.
    async fn dequeue(&self) -> Result<Job, CoreError>;

    /// Confirm that a delivered job has reached a terminal state.
    async fn ack(&self, id: &JobId) -> Result<(), CoreError>;

    /// Number of jobs waiting for a worker.
    async fn depth(&self) -> Result<usize, CoreError>;
}

fn unavailable() -> CoreError {
    CoreError::BrokerUnavailable("in-memory queue is closed".into())
}

// ---------------------------------------------------------------------------
// MemoryBroker
// ---------------------------------------------------------------------------

#[derive(Default)]
struct QueueState {
    jobs: VecDeque<Job>,
    closed: bool,
}

/// In-process broker for single-process deployments and tests.
///
/// Jobs leave the queue as soon as they are dequeued, so nothing survives a
/// restart. `taskhub_db::PgBroker` is the durable counterpart.
#[derive(Default)]
pub struct MemoryBroker {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the broker unavailable. Blocked and future calls fail with
    /// [`CoreError::BrokerUnavailable`]; queued jobs are kept.
    pub fn close(&self) {
        self.lock().closed = true;
        self.notify.notify_waiters();
    }

    /// Undo [`close`](Self::close).
    pub fn reopen(&self) {
        let has_jobs = {
            let mut state = self.lock();
            state.closed = false;
            !state.jobs.is_empty()
        };
        if has_jobs {
            self.notify.notify_one();
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn enqueue(&self, job: Job) -> Result<(), CoreError> {
        {
            let mut state = self.lock();
            if state.closed {
                return Err(unavailable());
            }
            state.jobs.push_back(job);
        }
        self.notify.notify_one();
        Ok(())
    }

    async fn dequeue(&self) -> Result<Job, CoreError> {
        loop {
            // Register interest before looking at the queue so an enqueue
            // between the check and the await cannot be missed.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if state.closed {
                    return Err(unavailable());
                }
                if let Some(job) = state.jobs.pop_front() {
                    let more = !state.jobs.is_empty();
                    drop(state);
                    if more {
                        self.notify.notify_one();
                    }
                    return Ok(job);
                }
            }

            notified.await;
        }
    }

    async fn ack(&self, _id: &JobId) -> Result<(), CoreError> {
        Ok(())
    }

    async fn depth(&self) -> Result<usize, CoreError> {
        let state = self.lock();
        if state.closed {
            return Err(unavailable());
        }
        Ok(state.jobs.len())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use assert_matches::assert_matches;
    use taskhub_core::job::JobPayload;

    use super::*;

    fn simple(n: i64) -> Job {
        Job::new(JobId::new(), JobPayload::Simple(n))
    }

    #[tokio::test]
    async fn dequeues_in_fifo_order() {
        let broker = MemoryBroker::new();
        let first = simple(1);
        let second = simple(2);

        broker.enqueue(first.clone()).await.unwrap();
        broker.enqueue(second.clone()).await.unwrap();
        assert_eq!(broker.depth().await.unwrap(), 2);

        assert_eq!(broker.dequeue().await.unwrap(), first);
        assert_eq!(broker.dequeue().await.unwrap(), second);
        assert_eq!(broker.depth().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn dequeue_waits_for_enqueue() {
        let broker = Arc::new(MemoryBroker::new());

        let consumer = {
            let broker = Arc::clone(&broker);
            tokio::spawn(async move { broker.dequeue().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!consumer.is_finished());

        let job = simple(7);
        broker.enqueue(job.clone()).await.unwrap();

        let received = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .expect("consumer should wake up")
            .unwrap()
            .unwrap();
        assert_eq!(received, job);
    }

    #[tokio::test]
    async fn every_waiting_consumer_gets_one_job() {
        let broker = Arc::new(MemoryBroker::new());

        let consumers: Vec<_> = (0..3)
            .map(|_| {
                let broker = Arc::clone(&broker);
                tokio::spawn(async move { broker.dequeue().await.unwrap() })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(20)).await;
        for n in 0..3 {
            broker.enqueue(simple(n)).await.unwrap();
        }

        let mut values = Vec::new();
        for consumer in consumers {
            let job = tokio::time::timeout(Duration::from_secs(1), consumer)
                .await
                .expect("every consumer should receive a job")
                .unwrap();
            match job.payload {
                JobPayload::Simple(n) => values.push(n),
                other => panic!("unexpected payload {other:?}"),
            }
        }
        values.sort_unstable();
        assert_eq!(values, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn closed_broker_rejects_enqueue() {
        let broker = MemoryBroker::new();
        broker.close();

        assert_matches!(
            broker.enqueue(simple(1)).await,
            Err(CoreError::BrokerUnavailable(_))
        );
    }

    #[tokio::test]
    async fn close_wakes_blocked_consumers() {
        let broker = Arc::new(MemoryBroker::new());
        let consumer = {
            let broker = Arc::clone(&broker);
            tokio::spawn(async move { broker.dequeue().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        broker.close();

        let result = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .unwrap()
            .unwrap();
        assert_matches!(result, Err(CoreError::BrokerUnavailable(_)));
    }

    #[tokio::test]
    async fn reopen_keeps_queued_jobs() {
        let broker = MemoryBroker::new();
        let job = simple(3);
        broker.enqueue(job.clone()).await.unwrap();

        broker.close();
        assert_matches!(broker.depth().await, Err(CoreError::BrokerUnavailable(_)));

        broker.reopen();
        assert_eq!(broker.dequeue().await.unwrap(), job);
    }
}
