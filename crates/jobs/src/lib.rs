//! Asynchronous job lifecycle: broker queue, result store, dispatcher,
//! status reader and result retention.
//!
//! The broker and store are traits so that the in-memory implementations
//! defined here and the Postgres ones in `taskhub-db` are interchangeable.

pub mod backend;
pub mod broker;
pub mod dispatcher;
pub mod retention;
pub mod status;
pub mod store;

pub use backend::Backend;
pub use broker::{Broker, MemoryBroker};
pub use dispatcher::JobDispatcher;
pub use status::{JobStatusView, StatusReader};
pub use store::{MemoryResultStore, ResultStore};
