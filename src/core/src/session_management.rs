//! Server side of the pipeline: turns flattened batches into per-page
//! session documents.
//!
//! - `aggregator`: grouping and concurrent upsert of one batch.

pub mod aggregator;

pub use aggregator::{group_events, Aggregator};
