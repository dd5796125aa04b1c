//! Postgres implementations of the broker queue and result store.
//!
//! Lets several API and worker processes share one queue and one set of job
//! records. Schema lives in `migrations/` and is applied by
//! [`run_migrations`].

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use taskhub_jobs::Backend;

pub mod broker;
pub mod store;

pub use broker::{PgBroker, PgBrokerOptions};
pub use store::PgResultStore;

pub type DbPool = sqlx::PgPool;

/// Create a connection pool from a database URL.
pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .connect(database_url)
        .await
}

/// Round-trip a trivial query to verify the database is reachable.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Apply pending schema migrations.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

/// Build a [`Backend`] whose broker and store both live in `pool`.
pub fn backend(pool: DbPool, options: PgBrokerOptions) -> Backend {
    Backend::new(
        Arc::new(PgBroker::new(pool.clone(), options)),
        Arc::new(PgResultStore::new(pool)),
    )
}

/// Connect, check health and migrate, then build the Postgres [`Backend`].
pub async fn connect_backend(
    database_url: &str,
    options: PgBrokerOptions,
) -> Result<Backend, sqlx::Error> {
    let pool = create_pool(database_url).await?;
    tracing::info!("Database connection pool created");

    health_check(&pool).await?;
    tracing::info!("Database health check passed");

    run_migrations(&pool).await?;
    tracing::info!("Database migrations applied");

    Ok(backend(pool, options))
}
