//! Client-side capture pipeline.
//!
//! - `types`: events, worker messages, session context and host signals.
//! - `local_store`: the durable event buffer (`EventStore`).
//! - `worker`: background task classifying and buffering events.
//! - `throttle`: fixed-interval gate for high-frequency signals.
//! - `identity`: session-scoped id storage.
//! - `coordinator`: wires signals to the worker and drives sync cycles.

pub mod coordinator;
pub mod identity;
pub mod local_store;
pub mod throttle;
pub mod types;
pub mod worker;

#[cfg(test)]
mod integration_tests;

pub use coordinator::{CaptureCoordinator, CoordinatorOptions};
pub use local_store::{EventStore, MemoryEventStore, SqliteEventStore};
pub use types::{InteractionSignal, RawEvent, SessionContext};
