use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use uuid::Uuid;

use crate::error_handling::types::StorageError;
use crate::storage::storage_trait::SessionPageRepository;
use crate::storage::types::{SessionPageDocument, SessionPageUpdate};

/// Process-local repository. Documents are lost on exit.
#[derive(Default)]
pub struct MemoryRepository {
    documents: Mutex<Vec<SessionPageDocument>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<SessionPageDocument>>, StorageError> {
        self.documents.lock().map_err(|_| StorageError::Unavailable)
    }
}

#[async_trait]
impl SessionPageRepository for MemoryRepository {
    async fn upsert_merge(&self, update: &SessionPageUpdate) -> Result<Uuid, StorageError> {
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let mut documents = self.lock()?;

        if let Some(doc) = documents
            .iter_mut()
            .find(|d| d.session_id == update.session_id && d.page == update.page)
        {
            doc.start_time = update.merged_start_time(doc.start_time);
            doc.duration = update.merged_duration(doc.duration);
            doc.clicks.extend(update.clicks.iter().cloned());
            doc.activities.extend(update.activities.iter().cloned());
            doc.updated_at = now;
            return Ok(doc.id);
        }

        let id = Uuid::new_v4();
        documents.push(SessionPageDocument {
            id,
            session_id: update.session_id.clone(),
            page: update.page.clone(),
            start_time: update.start_time,
            duration: update.duration.unwrap_or(0),
            clicks: update.clicks.clone(),
            activities: update.activities.clone(),
            created_at: now.clone(),
            updated_at: now,
        });
        Ok(id)
    }

    async fn find_all(&self) -> Result<Vec<SessionPageDocument>, StorageError> {
        Ok(self.lock()?.clone())
    }

    async fn find_one(
        &self,
        session_id: &str,
        page: &str,
    ) -> Result<Option<SessionPageDocument>, StorageError> {
        Ok(self
            .lock()?
            .iter()
            .find(|d| d.session_id == session_id && d.page == page)
            .cloned())
    }
}

/// Wraps a [`MemoryRepository`] and refuses writes for one page.
#[cfg(test)]
pub(crate) struct RefusingRepository {
    pub inner: MemoryRepository,
    pub refused_page: String,
}

#[cfg(test)]
#[async_trait]
impl SessionPageRepository for RefusingRepository {
    async fn upsert_merge(&self, update: &SessionPageUpdate) -> Result<Uuid, StorageError> {
        if update.page == self.refused_page {
            return Err(StorageError::WriteFailed);
        }
        self.inner.upsert_merge(update).await
    }

    async fn find_all(&self) -> Result<Vec<SessionPageDocument>, StorageError> {
        self.inner.find_all().await
    }

    async fn find_one(
        &self,
        session_id: &str,
        page: &str,
    ) -> Result<Option<SessionPageDocument>, StorageError> {
        self.inner.find_one(session_id, page).await
    }
}
