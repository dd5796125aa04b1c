//! Domain types shared by every taskhub crate.
//!
//! Holds the job model (ids, kinds, payloads, lifecycle records), the
//! artifact naming protocol with its filesystem stager, and the error
//! taxonomy. Has no dependency on the broker, store or HTTP layers.

pub mod artifact;
pub mod error;
pub mod job;
pub mod types;
