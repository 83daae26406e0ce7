//! Session page repository
//!
//! This module defines the `SessionPageRepository` trait, the interface the
//! aggregator persists through.
//!
//! Implementors are responsible for:
//! - Matching documents on the `(session_id, page)` natural key, creating them when absent
//! - Appending clicks and activities in the order given, never overwriting them
//! - Applying the start time and duration merge rules of `SessionPageUpdate`
//!
//! All methods return a `Result` to handle potential storage errors.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error_handling::types::StorageError;
use crate::storage::types::{SessionPageDocument, SessionPageUpdate};

#[async_trait]
pub trait SessionPageRepository: Send + Sync {
    /// Merges `update` into the document for its `(session_id, page)`,
    /// inserting it first if needed, and returns the document id.
    async fn upsert_merge(&self, update: &SessionPageUpdate) -> Result<Uuid, StorageError>;

    /// Every stored document, unfiltered.
    async fn find_all(&self) -> Result<Vec<SessionPageDocument>, StorageError>;

    /// The document for one `(session_id, page)`, if any.
    async fn find_one(
        &self,
        session_id: &str,
        page: &str,
    ) -> Result<Option<SessionPageDocument>, StorageError>;
}
