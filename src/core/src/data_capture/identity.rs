//! Session-scoped identity storage.
//!
//! A session id is generated once per browsing session and reused by every
//! page view of that session. The storage behind it only needs to read and
//! write single string keys.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::{info, warn};
use uuid::Uuid;

use crate::error_handling::types::StorageError;

pub const SESSION_ID_KEY: &str = "sessionId";

pub trait SessionStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// Returns the stored session id, or generates, persists and returns a new
/// one. Storage failures never prevent capture: a fresh id is used instead.
pub fn resolve_session_id(storage: &dyn SessionStorage) -> String {
    match storage.get(SESSION_ID_KEY) {
        Ok(Some(id)) if !id.is_empty() => return id,
        Ok(_) => {}
        Err(e) => warn!("Session storage unreadable, starting a new session: {}", e),
    }
    let id = Uuid::new_v4().to_string();
    if let Err(e) = storage.set(SESSION_ID_KEY, &id) {
        warn!("Failed to persist session id {}: {}", id, e);
    }
    info!("Started session {}", id);
    id
}

/// One file per key inside a directory.
pub struct FileSessionStorage {
    dir: PathBuf,
}

impl FileSessionStorage {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }
}

impl SessionStorage for FileSessionStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.key_path(key);
        match fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value.trim().to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => {
                warn!("Failed to read {}: {}", path.display(), e);
                Err(StorageError::ReadFailed)
            }
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        fs::create_dir_all(&self.dir).map_err(|e| {
            warn!("Failed to create {}: {}", self.dir.display(), e);
            StorageError::WriteFailed
        })?;
        let path = self.key_path(key);
        fs::write(&path, value).map_err(|e| {
            warn!("Failed to write {}: {}", path.display(), e);
            StorageError::WriteFailed
        })
    }
}

#[derive(Default)]
pub struct MemorySessionStorage {
    values: Mutex<HashMap<String, String>>,
}

impl MemorySessionStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStorage for MemorySessionStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let values = self.values.lock().map_err(|_| StorageError::ReadFailed)?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut values = self.values.lock().map_err(|_| StorageError::WriteFailed)?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct BrokenStorage;

    impl SessionStorage for BrokenStorage {
        fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
            Err(StorageError::ReadFailed)
        }

        fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
            Err(StorageError::WriteFailed)
        }
    }

    #[test]
    fn session_id_is_stable_within_a_session() {
        let storage = MemorySessionStorage::new();
        let first = resolve_session_id(&storage);
        let second = resolve_session_id(&storage);
        assert_eq!(first, second);
        assert!(Uuid::parse_str(&first).is_ok());
    }

    #[test]
    fn separate_sessions_get_distinct_ids() {
        let a = resolve_session_id(&MemorySessionStorage::new());
        let b = resolve_session_id(&MemorySessionStorage::new());
        assert_ne!(a, b);
    }

    #[test]
    fn file_storage_persists_across_instances() {
        let dir = TempDir::new().unwrap();
        let session_dir = dir.path().join("session");
        let first = resolve_session_id(&FileSessionStorage::new(&session_dir));
        let again = resolve_session_id(&FileSessionStorage::new(&session_dir));
        assert_eq!(first, again);
        assert_eq!(
            FileSessionStorage::new(&session_dir)
                .get(SESSION_ID_KEY)
                .unwrap(),
            Some(first)
        );
    }

    #[test]
    fn broken_storage_still_yields_an_id() {
        let id = resolve_session_id(&BrokenStorage);
        assert!(!id.is_empty());
    }
}
