//! Periodic expiry of finished job records.
//!
//! Terminal records are kept for a configurable TTL after they finish so
//! that callers have time to poll them, then deleted. Records that are still
//! PENDING or STARTED never expire.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use taskhub_core::error::CoreError;
use tokio_util::sync::CancellationToken;

use crate::store::ResultStore;

/// Default time a finished record stays readable: 24 hours.
pub const DEFAULT_RESULT_TTL: Duration = Duration::from_secs(24 * 3600);

/// Default interval between cleanup passes.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

/// Delete terminal records older than `ttl` once.
pub async fn purge_once(store: &dyn ResultStore, ttl: Duration) -> Result<u64, CoreError> {
    let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
    let cutoff = Utc::now()
        .checked_sub_signed(ttl)
        .unwrap_or(chrono::DateTime::<Utc>::MIN_UTC);
    store.purge_finished_before(cutoff).await
}

/// Run the retention loop until `cancel` is triggered.
pub async fn run(
    store: Arc<dyn ResultStore>,
    ttl: Duration,
    interval: Duration,
    cancel: CancellationToken,
) {
    tracing::info!(
        ttl_secs = ttl.as_secs(),
        interval_secs = interval.as_secs(),
        "Result retention job started"
    );

    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Result retention job stopping");
                break;
            }
            _ = ticker.tick() => {
                match purge_once(store.as_ref(), ttl).await {
                    Ok(deleted) if deleted > 0 => {
                        tracing::info!(deleted, "Result retention: purged expired records");
                    }
                    Ok(_) => {
                        tracing::debug!("Result retention: nothing to purge");
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Result retention: cleanup failed");
                    }
                }
            }
        }
    }
}
