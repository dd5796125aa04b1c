use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use taskhub_db::PgBrokerOptions;

use crate::handlers::HandlerConfig;

/// Worker configuration loaded from environment variables.
///
/// Shared by the standalone worker binary and by the API server when it
/// embeds a pool.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Root directory for uploaded and processed artifacts.
    pub files_dir: PathBuf,
    /// Number of concurrent worker loops.
    pub concurrency: usize,
    /// Scale factor applied by UPSCALE jobs.
    pub upscale_factor: u32,
    /// Artificial delay before a SIMPLE job returns.
    pub simple_delay: Duration,
    /// Back-off after the broker reports itself unavailable.
    pub broker_retry_delay: Duration,
    /// Postgres connection string; required by the standalone worker.
    pub database_url: Option<String>,
    /// Claim polling and redelivery settings for the Postgres broker.
    pub broker: PgBrokerOptions,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                          | Default   |
    /// |----------------------------------|-----------|
    /// | `FILES_DIR`                      | `./files` |
    /// | `WORKER_CONCURRENCY`             | `2`       |
    /// | `UPSCALE_FACTOR`                 | `2`       |
    /// | `SIMPLE_TASK_DELAY_MS`           | `0`       |
    /// | `BROKER_RETRY_DELAY_MS`          | `1000`    |
    /// | `DATABASE_URL`                   | unset     |
    /// | `BROKER_POLL_INTERVAL_MS`        | `500`     |
    /// | `BROKER_VISIBILITY_TIMEOUT_SECS` | `1800`    |
    pub fn from_env() -> anyhow::Result<Self> {
        let files_dir = PathBuf::from(std::env::var("FILES_DIR").unwrap_or_else(|_| "./files".into()));

        let concurrency: usize = env_or("WORKER_CONCURRENCY", 2)?;
        if concurrency == 0 {
            anyhow::bail!("WORKER_CONCURRENCY must be at least 1");
        }

        let upscale_factor: u32 = env_or("UPSCALE_FACTOR", 2)?;
        if upscale_factor == 0 {
            anyhow::bail!("UPSCALE_FACTOR must be at least 1");
        }

        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());

        Ok(Self {
            files_dir,
            concurrency,
            upscale_factor,
            simple_delay: Duration::from_millis(env_or("SIMPLE_TASK_DELAY_MS", 0)?),
            broker_retry_delay: Duration::from_millis(env_or("BROKER_RETRY_DELAY_MS", 1000)?),
            database_url,
            broker: PgBrokerOptions {
                poll_interval: Duration::from_millis(env_or("BROKER_POLL_INTERVAL_MS", 500)?),
                visibility_timeout: Duration::from_secs(env_or(
                    "BROKER_VISIBILITY_TIMEOUT_SECS",
                    1800,
                )?),
            },
        })
    }

    pub fn handler_config(&self) -> HandlerConfig {
        HandlerConfig {
            upscale_factor: self.upscale_factor,
            simple_delay: self.simple_delay,
        }
    }
}

/// Parse `key` from the environment, falling back to `default` when unset.
pub fn env_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} must be a valid {}", std::any::type_name::<T>())),
        Err(_) => Ok(default),
    }
}
