//! Client to server delivery.
//!
//! - `types`: the flattened wire format shared with the aggregator.
//! - `batch_sender`: the `BatchSender` seam and its HTTP implementation.
//! - `sync_transport`: drain, flatten, deliver, clear.

pub mod batch_sender;
pub mod sync_transport;
pub mod types;

pub use batch_sender::{BatchSender, HttpBatchSender};
pub use sync_transport::{FlushReason, SyncOutcome, SyncTransport};
pub use types::FlattenedEvent;
