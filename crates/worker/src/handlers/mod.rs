//! Job handlers keyed by job kind.

mod simple;
mod upscale;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use taskhub_core::artifact::ArtifactStager;
use taskhub_core::job::JobPayload;

use crate::error::HandlerError;

pub use upscale::{upscale_image, MAX_OUTPUT_DIMENSION};

/// Tunables passed to every handler.
#[derive(Debug, Clone, Copy)]
pub struct HandlerConfig {
    pub upscale_factor: u32,
    pub simple_delay: Duration,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            upscale_factor: 2,
            simple_delay: Duration::ZERO,
        }
    }
}

/// Everything a handler may touch while running a job.
#[derive(Clone)]
pub struct JobContext {
    pub stager: Arc<dyn ArtifactStager>,
    pub config: HandlerConfig,
}

/// Executes the payload of one job and produces its result value.
///
/// The pool runs each call on its own task, so an implementation that
/// panics fails only the job it was running.
#[async_trait]
pub trait JobRunner: Send + Sync + 'static {
    async fn run(&self, payload: JobPayload) -> Result<serde_json::Value, HandlerError>;
}

/// Production runner: dispatches on the payload variant.
pub struct Handlers {
    ctx: JobContext,
}

impl Handlers {
    pub fn new(ctx: JobContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl JobRunner for Handlers {
    async fn run(&self, payload: JobPayload) -> Result<serde_json::Value, HandlerError> {
        match payload {
            JobPayload::Simple(value) => simple::run(value, &self.ctx.config).await,
            JobPayload::Upscale { input, output } => upscale::run(&self.ctx, &input, &output).await,
        }
    }
}
