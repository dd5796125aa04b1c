//! End-to-end lifecycle tests: dispatcher, worker pool and status reader on
//! the in-memory backend.

use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use image::{DynamicImage, GenericImageView, ImageFormat, Rgba, RgbaImage};
use serde_json::{json, Value};
use taskhub_core::artifact::{ArtifactRef, ArtifactStager, LocalArtifactStager};
use taskhub_core::job::{Job, JobKind, JobPayload, JobRecord, JobStatus};
use taskhub_core::types::JobId;
use taskhub_jobs::{
    Backend, Broker, JobDispatcher, JobStatusView, MemoryBroker, MemoryResultStore, StatusReader,
};
use taskhub_worker::{
    HandlerConfig, HandlerError, Handlers, JobContext, JobRunner, PoolHandle, WorkerPool,
};
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const WAIT_LIMIT: Duration = Duration::from_secs(10);

struct Harness {
    backend: Backend,
    dispatcher: JobDispatcher,
    reader: StatusReader,
    cancel: CancellationToken,
}

impl Harness {
    fn new(backend: Backend) -> Self {
        Self {
            dispatcher: JobDispatcher::new(&backend),
            reader: StatusReader::new(&backend),
            backend,
            cancel: CancellationToken::new(),
        }
    }

    fn start(&self, runner: Arc<dyn JobRunner>, workers: usize) -> PoolHandle {
        WorkerPool::new(self.backend.clone(), runner)
            .with_concurrency(workers)
            .with_retry_delay(Duration::from_millis(10))
            .spawn(self.cancel.clone())
    }

    async fn wait_terminal(&self, id: &JobId) -> JobStatusView {
        tokio::time::timeout(WAIT_LIMIT, async {
            loop {
                let view = self.reader.status(id).await.unwrap();
                if view.status.is_terminal() {
                    return view;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("job did not finish in time")
    }

    async fn shutdown(self, pool: PoolHandle) {
        self.cancel.cancel();
        tokio::time::timeout(WAIT_LIMIT, pool.join())
            .await
            .expect("pool did not stop");
    }
}

fn handlers(stager: Arc<dyn ArtifactStager>) -> Arc<dyn JobRunner> {
    Arc::new(Handlers::new(JobContext {
        stager,
        config: HandlerConfig::default(),
    }))
}

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x * 20) as u8, (y * 20) as u8, 200, 255])
    });
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(img)
        .write_to(&mut out, ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

/// Echoes SIMPLE values, panics on 13, records the order it saw jobs in.
#[derive(Default)]
struct ScriptedRunner {
    seen: Mutex<Vec<i64>>,
    delay: Duration,
}

#[async_trait]
impl JobRunner for ScriptedRunner {
    async fn run(&self, payload: JobPayload) -> Result<Value, HandlerError> {
        let JobPayload::Simple(value) = payload else {
            unreachable!("scripted runner only receives SIMPLE jobs");
        };
        self.seen.lock().unwrap().push(value);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if value == 13 {
            panic!("unlucky number");
        }
        Ok(json!(value))
    }
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn simple_job_reaches_success_with_echoed_value() {
    let dir = tempfile::tempdir().unwrap();
    let harness = Harness::new(Backend::in_memory());
    let pool = harness.start(handlers(Arc::new(LocalArtifactStager::new(dir.path()))), 2);

    let first = harness.dispatcher.submit(JobPayload::Simple(1)).await.unwrap();
    let second = harness.dispatcher.submit(JobPayload::Simple(2)).await.unwrap();

    let first_view = harness.wait_terminal(&first).await;
    let second_view = harness.wait_terminal(&second).await;
    assert_eq!(first_view.status, JobStatus::Success);
    assert_eq!(first_view.result, json!(1));
    assert_eq!(second_view.status, JobStatus::Success);
    assert_eq!(second_view.result, json!(2));

    harness.shutdown(pool).await;
}

#[tokio::test]
async fn panicking_handler_fails_only_its_job() {
    let harness = Harness::new(Backend::in_memory());
    let pool = harness.start(Arc::new(ScriptedRunner::default()), 1);

    let doomed = harness.dispatcher.submit(JobPayload::Simple(13)).await.unwrap();
    let healthy = harness.dispatcher.submit(JobPayload::Simple(5)).await.unwrap();

    let doomed_view = harness.wait_terminal(&doomed).await;
    assert_eq!(doomed_view.status, JobStatus::Failure);
    assert_eq!(doomed_view.result, json!("Handler panicked: unlucky number"));

    let healthy_view = harness.wait_terminal(&healthy).await;
    assert_eq!(healthy_view.status, JobStatus::Success);
    assert_eq!(healthy_view.result, json!(5));

    harness.shutdown(pool).await;
}

#[tokio::test]
async fn single_worker_drains_in_submission_order() {
    let harness = Harness::new(Backend::in_memory());
    let ids: Vec<JobId> = {
        let mut ids = Vec::new();
        for n in 1..=5 {
            ids.push(harness.dispatcher.submit(JobPayload::Simple(n)).await.unwrap());
        }
        ids
    };

    let runner = Arc::new(ScriptedRunner::default());
    let pool = harness.start(runner.clone(), 1);
    for id in &ids {
        assert_eq!(harness.wait_terminal(id).await.status, JobStatus::Success);
    }

    assert_eq!(*runner.seen.lock().unwrap(), vec![1, 2, 3, 4, 5]);
    harness.shutdown(pool).await;
}

#[tokio::test]
async fn observed_statuses_never_move_backwards() {
    let harness = Harness::new(Backend::in_memory());
    let runner = Arc::new(ScriptedRunner {
        delay: Duration::from_millis(50),
        ..ScriptedRunner::default()
    });
    let pool = harness.start(runner, 1);

    let id = harness.dispatcher.submit(JobPayload::Simple(9)).await.unwrap();
    let mut observed = Vec::new();
    loop {
        let status = harness.reader.status(&id).await.unwrap().status;
        observed.push(status);
        if status.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    assert!(observed.windows(2).all(|w| w[0].rank() <= w[1].rank()));
    assert!(observed.contains(&JobStatus::Started));
    assert_eq!(observed.last(), Some(&JobStatus::Success));
    harness.shutdown(pool).await;
}

// ---------------------------------------------------------------------------
// UPSCALE
// ---------------------------------------------------------------------------

#[tokio::test]
async fn upscale_job_writes_larger_processed_image() {
    let dir = tempfile::tempdir().unwrap();
    let stager: Arc<LocalArtifactStager> = Arc::new(LocalArtifactStager::new(dir.path()));
    let harness = Harness::new(Backend::in_memory());
    let pool = harness.start(handlers(stager.clone()), 1);

    let input = stager.store(&png_bytes(6, 4), "png").await.unwrap();
    let output = input.derive_output_ref();
    let id = harness
        .dispatcher
        .submit(JobPayload::Upscale {
            input: input.clone(),
            output: output.clone(),
        })
        .await
        .unwrap();

    let view = harness.wait_terminal(&id).await;
    assert_eq!(view.status, JobStatus::Success);
    assert_eq!(view.result, json!(format!("{}-processed.png", input.id())));

    let processed: ArtifactRef = view.result.as_str().unwrap().parse().unwrap();
    let bytes = stager.load(&processed).await.unwrap();
    assert_eq!(image::load_from_memory(&bytes).unwrap().dimensions(), (12, 8));

    harness.shutdown(pool).await;
}

#[tokio::test]
async fn upscale_of_corrupt_input_is_failure() {
    let dir = tempfile::tempdir().unwrap();
    let stager: Arc<LocalArtifactStager> = Arc::new(LocalArtifactStager::new(dir.path()));
    let harness = Harness::new(Backend::in_memory());
    let pool = harness.start(handlers(stager.clone()), 1);

    let input = stager.store(b"not really a png", "png").await.unwrap();
    let id = harness
        .dispatcher
        .submit(JobPayload::Upscale {
            output: input.derive_output_ref(),
            input,
        })
        .await
        .unwrap();

    let view = harness.wait_terminal(&id).await;
    assert_eq!(view.status, JobStatus::Failure);
    assert!(view.result.as_str().unwrap().starts_with("Image processing failed"));

    harness.shutdown(pool).await;
}

#[tokio::test]
async fn upscale_of_missing_input_is_failure() {
    let dir = tempfile::tempdir().unwrap();
    let harness = Harness::new(Backend::in_memory());
    let pool = harness.start(handlers(Arc::new(LocalArtifactStager::new(dir.path()))), 1);

    let input = ArtifactRef::new_input("png").unwrap();
    let id = harness
        .dispatcher
        .submit(JobPayload::Upscale {
            output: input.derive_output_ref(),
            input,
        })
        .await
        .unwrap();

    assert_eq!(harness.wait_terminal(&id).await.status, JobStatus::Failure);
    harness.shutdown(pool).await;
}

// ---------------------------------------------------------------------------
// Broker faults and redelivery
// ---------------------------------------------------------------------------

#[tokio::test]
async fn pool_recovers_after_broker_outage() {
    let broker = Arc::new(MemoryBroker::new());
    let backend = Backend::new(broker.clone(), Arc::new(MemoryResultStore::new()));
    let harness = Harness::new(backend);

    broker.close();
    let pool = harness.start(Arc::new(ScriptedRunner::default()), 2);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(harness.dispatcher.submit(JobPayload::Simple(1)).await.is_err());

    broker.reopen();
    let id = harness.dispatcher.submit(JobPayload::Simple(7)).await.unwrap();
    let view = harness.wait_terminal(&id).await;
    assert_eq!(view.status, JobStatus::Success);
    assert_eq!(view.result, json!(7));

    harness.shutdown(pool).await;
}

#[tokio::test]
async fn redelivered_finished_job_is_not_rerun() {
    let harness = Harness::new(Backend::in_memory());
    let id = JobId::new();
    let done = JobRecord::pending(id, JobKind::Simple)
        .started()
        .succeeded(json!(1));
    harness.backend.store.put(done.clone()).await.unwrap();
    harness
        .backend
        .broker
        .enqueue(Job::new(id, JobPayload::Simple(1)))
        .await
        .unwrap();

    let runner = Arc::new(ScriptedRunner::default());
    let pool = harness.start(runner.clone(), 1);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(runner.seen.lock().unwrap().is_empty());
    assert_eq!(harness.backend.store.get(&id).await.unwrap(), done);
    assert_eq!(harness.backend.broker.depth().await.unwrap(), 0);
    harness.shutdown(pool).await;
}

#[tokio::test]
async fn delivery_without_record_is_recreated_and_run() {
    let harness = Harness::new(Backend::in_memory());
    let id = JobId::new();
    harness
        .backend
        .broker
        .enqueue(Job::new(id, JobPayload::Simple(3)))
        .await
        .unwrap();

    let pool = harness.start(Arc::new(ScriptedRunner::default()), 1);
    let view = harness.wait_terminal(&id).await;
    assert_eq!(view.status, JobStatus::Success);
    assert_eq!(view.result, json!(3));
    harness.shutdown(pool).await;
}

#[tokio::test]
async fn idle_pool_stops_on_cancel() {
    let harness = Harness::new(Backend::in_memory());
    let pool = harness.start(Arc::new(ScriptedRunner::default()), 3);
    assert_eq!(pool.worker_count(), 3);
    harness.shutdown(pool).await;
}
