use std::sync::Arc;

use anyhow::Context;
use taskhub_core::artifact::LocalArtifactStager;
use taskhub_worker::config::WorkerConfig;
use taskhub_worker::{Handlers, JobContext, WorkerPool};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "taskhub_worker=debug,taskhub_db=info".into());
    let registry = tracing_subscriber::registry().with(filter);
    if std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    // --- Configuration ---
    let config = WorkerConfig::from_env()?;
    tracing::info!(
        files_dir = %config.files_dir.display(),
        concurrency = config.concurrency,
        upscale_factor = config.upscale_factor,
        "Loaded worker configuration"
    );

    // A standalone worker only makes sense against a shared durable backend.
    let database_url = config
        .database_url
        .clone()
        .context("DATABASE_URL must be set for a standalone worker")?;
    let backend = taskhub_db::connect_backend(&database_url, config.broker)
        .await
        .context("Failed to connect to database")?;

    // --- Artifacts ---
    let stager = LocalArtifactStager::new(&config.files_dir);
    stager
        .ensure_root()
        .await
        .context("Failed to create artifact directory")?;

    // --- Pool ---
    let runner = Handlers::new(JobContext {
        stager: Arc::new(stager),
        config: config.handler_config(),
    });
    let cancel = CancellationToken::new();
    let pool = WorkerPool::new(backend, Arc::new(runner))
        .with_concurrency(config.concurrency)
        .with_retry_delay(config.broker_retry_delay)
        .spawn(cancel.clone());

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, stopping workers");
    cancel.cancel();
    pool.join().await;

    tracing::info!("Worker shut down");
    Ok(())
}

/// Wait for SIGINT or, on Unix, SIGTERM.
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
}
