//! Worker pool and job handlers.
//!
//! The library half is shared by the standalone `taskhub-worker` binary and
//! by the API server, which can embed a pool when running on the in-memory
//! backend.

pub mod config;
pub mod error;
pub mod handlers;
pub mod pool;

pub use error::HandlerError;
pub use handlers::{HandlerConfig, Handlers, JobContext, JobRunner};
pub use pool::{PoolHandle, WorkerPool};
