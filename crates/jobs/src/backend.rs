use std::sync::Arc;

use crate::broker::{Broker, MemoryBroker};
use crate::store::{MemoryResultStore, ResultStore};

/// The pair of shared resources every other component is built on.
///
/// Cheaply cloneable; both halves are behind `Arc`.
#[derive(Clone)]
pub struct Backend {
    pub broker: Arc<dyn Broker>,
    pub store: Arc<dyn ResultStore>,
}

impl Backend {
    pub fn new(broker: Arc<dyn Broker>, store: Arc<dyn ResultStore>) -> Self {
        Self { broker, store }
    }

    /// In-process backend. Only workers running in the same process can
    /// consume the queue.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemoryBroker::new()),
            Arc::new(MemoryResultStore::new()),
        )
    }
}
