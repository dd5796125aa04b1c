use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use taskhub_core::artifact::LocalArtifactStager;
use taskhub_jobs::{retention, Backend};
use taskhub_worker::config::WorkerConfig;
use taskhub_worker::{Handlers, JobContext, WorkerPool};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use taskhub_api::config::ServerConfig;
use taskhub_api::router::build_app_router;
use taskhub_api::state::AppState;

/// How long shutdown waits for background tasks to finish.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "taskhub_api=debug,taskhub_worker=debug,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(filter);
    if std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    // --- Configuration ---
    let config = ServerConfig::from_env()?;
    let worker_config = WorkerConfig::from_env()?;
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Backend ---
    let backend = match &config.database_url {
        Some(url) => taskhub_db::connect_backend(url, worker_config.broker)
            .await
            .context("Failed to connect to database")?,
        None => {
            tracing::info!("DATABASE_URL not set, using in-memory broker and result store");
            if config.embedded_workers == 0 {
                tracing::warn!("No embedded workers and no shared broker: submitted jobs will stay PENDING");
            }
            Backend::in_memory()
        }
    };

    // --- Artifacts ---
    let stager = Arc::new(LocalArtifactStager::new(&worker_config.files_dir));
    stager
        .ensure_root()
        .await
        .context("Failed to create artifact directory")?;
    tracing::info!(files_dir = %stager.root().display(), "Artifact directory ready");

    // --- Background tasks ---
    let cancel = CancellationToken::new();

    let pool = (config.embedded_workers > 0).then(|| {
        let runner = Handlers::new(JobContext {
            stager: stager.clone(),
            config: worker_config.handler_config(),
        });
        WorkerPool::new(backend.clone(), Arc::new(runner))
            .with_concurrency(config.embedded_workers)
            .with_retry_delay(worker_config.broker_retry_delay)
            .spawn(cancel.clone())
    });

    let retention_handle = tokio::spawn(retention::run(
        Arc::clone(&backend.store),
        config.result_ttl,
        config.retention_interval,
        cancel.clone(),
    ));

    // --- Router ---
    let state = AppState::new(&backend, stager, config.clone());
    let app = build_app_router(state, &config)?;

    // --- Start server ---
    let host = config
        .host
        .parse()
        .with_context(|| format!("Invalid HOST address '{}'", config.host))?;
    let addr = SocketAddr::new(host, config.port);
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");
    cancel.cancel();

    if let Some(pool) = pool {
        if tokio::time::timeout(SHUTDOWN_GRACE, pool.join()).await.is_err() {
            tracing::warn!("Worker pool did not stop in time");
        }
    }
    let _ = tokio::time::timeout(SHUTDOWN_GRACE, retention_handle).await;

    tracing::info!("Graceful shutdown complete");
    Ok(())
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
