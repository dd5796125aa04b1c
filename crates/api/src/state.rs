use std::sync::Arc;

use taskhub_core::artifact::ArtifactStager;
use taskhub_jobs::{Backend, Broker, JobDispatcher, StatusReader};

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable; everything inside is behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Records and enqueues new jobs.
    pub dispatcher: JobDispatcher,
    /// Read-only job status lookups.
    pub status: StatusReader,
    /// Upload and processed-file storage.
    pub stager: Arc<dyn ArtifactStager>,
    /// Queue handle, used for the depth reported by `/health`.
    pub broker: Arc<dyn Broker>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(backend: &Backend, stager: Arc<dyn ArtifactStager>, config: ServerConfig) -> Self {
        Self {
            dispatcher: JobDispatcher::new(backend),
            status: StatusReader::new(backend),
            stager,
            broker: Arc::clone(&backend.broker),
            config: Arc::new(config),
        }
    }
}
