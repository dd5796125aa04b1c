use std::time::Duration;

use taskhub_jobs::retention::{DEFAULT_CLEANUP_INTERVAL, DEFAULT_RESULT_TTL};
use taskhub_worker::config::env_or;

/// Default cap on request bodies, sized for image uploads: 20 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `8002`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Largest accepted request body in bytes.
    pub max_upload_bytes: usize,
    /// Worker loops run inside the server process; `0` disables them.
    pub embedded_workers: usize,
    /// How long finished job records stay readable.
    pub result_ttl: Duration,
    /// Interval between retention passes.
    pub retention_interval: Duration,
    /// Postgres connection string. Unset selects the in-memory backend.
    pub database_url: Option<String>,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default                 |
    /// |---------------------------|-------------------------|
    /// | `HOST`                    | `0.0.0.0`               |
    /// | `PORT`                    | `8002`                  |
    /// | `CORS_ORIGINS`            | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS`    | `30`                    |
    /// | `MAX_UPLOAD_BYTES`        | `20971520`              |
    /// | `EMBEDDED_WORKERS`        | `2`                     |
    /// | `RESULT_TTL_SECS`         | `86400`                 |
    /// | `RETENTION_INTERVAL_SECS` | `300`                   |
    /// | `DATABASE_URL`            | unset                   |
    pub fn from_env() -> anyhow::Result<Self> {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let retention_interval_secs: u64 =
            env_or("RETENTION_INTERVAL_SECS", DEFAULT_CLEANUP_INTERVAL.as_secs())?;
        if retention_interval_secs == 0 {
            anyhow::bail!("RETENTION_INTERVAL_SECS must be at least 1");
        }

        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());

        Ok(Self {
            host,
            port: env_or("PORT", 8002)?,
            cors_origins,
            request_timeout_secs: env_or("REQUEST_TIMEOUT_SECS", 30)?,
            max_upload_bytes: env_or("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
            embedded_workers: env_or("EMBEDDED_WORKERS", 2)?,
            result_ttl: Duration::from_secs(env_or("RESULT_TTL_SECS", DEFAULT_RESULT_TTL.as_secs())?),
            retention_interval: Duration::from_secs(retention_interval_secs),
            database_url,
        })
    }
}
