#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Method, Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use taskhub_api::config::ServerConfig;
use taskhub_api::router::build_app_router;
use taskhub_api::state::AppState;
use taskhub_core::artifact::LocalArtifactStager;
use taskhub_jobs::Backend;
use taskhub_worker::{HandlerConfig, Handlers, JobContext, PoolHandle, WorkerPool};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

pub const BOUNDARY: &str = "taskhub-test-boundary";

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        max_upload_bytes: 1024 * 1024,
        embedded_workers: 0,
        result_ttl: Duration::from_secs(3600),
        retention_interval: Duration::from_secs(300),
        database_url: None,
    }
}

/// The application router plus what it runs on.
pub struct TestApp {
    pub router: Router,
    pub backend: Backend,
    pub files: TempDir,
    cancel: CancellationToken,
    pool: Option<PoolHandle>,
}

/// In-memory app with `workers` embedded worker loops (`0` for none).
pub fn build_test_app(workers: usize) -> TestApp {
    build_test_app_with_backend(Backend::in_memory(), workers)
}

pub fn build_test_app_with_backend(backend: Backend, workers: usize) -> TestApp {
    let files = tempfile::tempdir().unwrap();
    let stager = Arc::new(LocalArtifactStager::new(files.path()));
    let cancel = CancellationToken::new();

    let pool = (workers > 0).then(|| {
        let runner = Handlers::new(JobContext {
            stager: stager.clone(),
            config: HandlerConfig::default(),
        });
        WorkerPool::new(backend.clone(), Arc::new(runner))
            .with_concurrency(workers)
            .with_retry_delay(Duration::from_millis(10))
            .spawn(cancel.clone())
    });

    let config = test_config();
    let state = AppState::new(&backend, stager, config.clone());
    let router = build_app_router(state, &config).unwrap();

    TestApp {
        router,
        backend,
        files,
        cancel,
        pool,
    }
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.send(Request::get(uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn post_json(&self, uri: &str, body: Value) -> Response<Body> {
        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    /// POST a multipart body with a single file field.
    pub async fn post_file(
        &self,
        uri: &str,
        field: &str,
        file_name: &str,
        bytes: &[u8],
    ) -> Response<Body> {
        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(field, file_name, bytes)))
            .unwrap();
        self.send(request).await
    }

    /// Poll `GET /tasks/{id}` until the job is terminal; returns the body.
    pub async fn wait_terminal(&self, task_id: &str) -> Value {
        tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                let response = self.get(&format!("/tasks/{task_id}")).await;
                assert_eq!(response.status(), StatusCode::OK);
                let json = body_json(response).await;
                if json["status"] == "SUCCESS" || json["status"] == "FAILURE" {
                    return json;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("task did not finish in time")
    }

    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(pool) = self.pool.take() {
            pool.join().await;
        }
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

pub fn multipart_body(field: &str, file_name: &str, bytes: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}
