//! Durable client-side event buffer.
//!
//! The store is an append log keyed by an auto-incrementing sequence. Reading
//! (`drain_all`) and removing (`clear_through`) are separate steps so that a
//! crash between "read" and "send" never loses events: removal only happens
//! after the server acknowledged a batch.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use log::{debug, error, info};
use sea_orm::{
    ActiveValue::NotSet, ColumnTrait, ConnectOptions, ConnectionTrait, Database,
    DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use tokio::sync::OnceCell;

use super::types::{RawEvent, StoredEvent};
use crate::error_handling::types::StorageError;
use crate::storage::db_entities::local_events;

#[async_trait]
pub trait EventStore: Send + Sync {
    /// Opens the store, creating it if absent. Safe to call repeatedly and
    /// concurrently; later calls reuse the same handle.
    async fn init(&self) -> Result<(), StorageError>;

    /// Appends one event at the end of the log.
    async fn append(&self, event: &RawEvent) -> Result<(), StorageError>;

    /// Every stored event in insertion order. Nothing is removed.
    async fn drain_all(&self) -> Result<Vec<StoredEvent>, StorageError>;

    /// Removes every event whose sequence is `<= seq`.
    async fn clear_through(&self, seq: i64) -> Result<(), StorageError>;

    /// Empties the store.
    async fn clear(&self) -> Result<(), StorageError> {
        self.clear_through(i64::MAX).await
    }
}

/// SQLite-backed event log.
pub struct SqliteEventStore {
    path: PathBuf,
    conn: OnceCell<DatabaseConnection>,
}

impl SqliteEventStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            conn: OnceCell::new(),
        }
    }

    async fn open(path: &Path) -> Result<DatabaseConnection, StorageError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    error!("Failed to create buffer dir {}: {}", parent.display(), e);
                    StorageError::ConnectionFailed
                })?;
            }
        }
        let url = format!("sqlite://{}?mode=rwc", path.display());
        let mut opts = ConnectOptions::new(url);
        // a single connection serializes the worker's appends with the
        // transport's drain and clear
        opts.max_connections(1).min_connections(1).sqlx_logging(false);
        let db = Database::connect(opts).await.map_err(|e| {
            error!("Failed to open event buffer {}: {}", path.display(), e);
            StorageError::ConnectionFailed
        })?;
        db.execute_unprepared(
            "CREATE TABLE IF NOT EXISTS local_events (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                kind TEXT NOT NULL,
                payload TEXT NOT NULL
            );",
        )
        .await
        .map_err(|e| {
            error!("Failed to create local_events table: {}", e);
            StorageError::WriteFailed
        })?;
        info!("Event buffer opened at {}", path.display());
        Ok(db)
    }

    fn handle(&self) -> Result<&DatabaseConnection, StorageError> {
        self.conn.get().ok_or(StorageError::Unavailable)
    }
}

#[async_trait]
impl EventStore for SqliteEventStore {
    async fn init(&self) -> Result<(), StorageError> {
        self.conn
            .get_or_try_init(|| Self::open(&self.path))
            .await
            .map(|_| ())
    }

    async fn append(&self, event: &RawEvent) -> Result<(), StorageError> {
        let db = self.handle()?;
        let payload = serde_json::to_string(event).map_err(|_| StorageError::WriteFailed)?;
        local_events::Entity::insert(local_events::ActiveModel {
            seq: NotSet,
            kind: Set(event.kind().to_string()),
            payload: Set(payload),
        })
        .exec(db)
        .await
        .map_err(|e| {
            error!("Failed to append {} event: {}", event.kind(), e);
            StorageError::WriteFailed
        })?;
        Ok(())
    }

    async fn drain_all(&self) -> Result<Vec<StoredEvent>, StorageError> {
        let db = self.handle()?;
        let rows = local_events::Entity::find()
            .order_by_asc(local_events::Column::Seq)
            .all(db)
            .await
            .map_err(|e| {
                error!("Failed to read event buffer: {}", e);
                StorageError::ReadFailed
            })?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let event: RawEvent = serde_json::from_str(&row.payload).map_err(|e| {
                error!("Corrupt buffered event seq={}: {}", row.seq, e);
                StorageError::ReadFailed
            })?;
            out.push(StoredEvent {
                seq: row.seq,
                event,
            });
        }
        Ok(out)
    }

    async fn clear_through(&self, seq: i64) -> Result<(), StorageError> {
        let db = self.handle()?;
        let result = local_events::Entity::delete_many()
            .filter(local_events::Column::Seq.lte(seq))
            .exec(db)
            .await
            .map_err(|e| {
                error!("Failed to clear event buffer: {}", e);
                StorageError::WriteFailed
            })?;
        debug!("Cleared {} buffered events", result.rows_affected);
        Ok(())
    }
}

/// In-process event log, used when no buffer file is configured.
#[derive(Default)]
pub struct MemoryEventStore {
    inner: Mutex<MemoryLog>,
}

#[derive(Default)]
struct MemoryLog {
    opened: bool,
    next_seq: i64,
    events: Vec<StoredEvent>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_log<T>(&self, f: impl FnOnce(&mut MemoryLog) -> T) -> T {
        let mut guard = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn init(&self) -> Result<(), StorageError> {
        self.with_log(|log| log.opened = true);
        Ok(())
    }

    async fn append(&self, event: &RawEvent) -> Result<(), StorageError> {
        self.with_log(|log| {
            if !log.opened {
                return Err(StorageError::Unavailable);
            }
            log.next_seq += 1;
            let seq = log.next_seq;
            log.events.push(StoredEvent {
                seq,
                event: event.clone(),
            });
            Ok(())
        })
    }

    async fn drain_all(&self) -> Result<Vec<StoredEvent>, StorageError> {
        self.with_log(|log| {
            if !log.opened {
                return Err(StorageError::Unavailable);
            }
            Ok(log.events.clone())
        })
    }

    async fn clear_through(&self, seq: i64) -> Result<(), StorageError> {
        self.with_log(|log| {
            if !log.opened {
                return Err(StorageError::Unavailable);
            }
            log.events.retain(|stored| stored.seq > seq);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn click(t: i64) -> RawEvent {
        RawEvent::Click {
            x: t as f64,
            y: 1.0,
            timestamp: t,
        }
    }

    #[tokio::test]
    async fn sqlite_store_keeps_insertion_order_until_cleared() {
        let _ = env_logger::builder().is_test(true).try_init();
        let dir = TempDir::new().unwrap();
        let store = SqliteEventStore::new(dir.path().join("buffer.sqlite3"));
        store.init().await.unwrap();

        for t in [30, 10, 20] {
            store.append(&click(t)).await.unwrap();
        }
        let drained = store.drain_all().await.unwrap();
        let order: Vec<RawEvent> = drained.iter().map(|s| s.event.clone()).collect();
        assert_eq!(order, vec![click(30), click(10), click(20)]);

        // draining does not remove
        assert_eq!(store.drain_all().await.unwrap().len(), 3);

        store.clear_through(drained[1].seq).await.unwrap();
        let rest = store.drain_all().await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].event, click(20));

        store.clear().await.unwrap();
        assert!(store.drain_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn sqlite_store_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("buffer.sqlite3");
        {
            let store = SqliteEventStore::new(&path);
            store.init().await.unwrap();
            store.append(&click(1)).await.unwrap();
        }
        let reopened = SqliteEventStore::new(&path);
        reopened.init().await.unwrap();
        let events = reopened.drain_all().await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, click(1));
    }

    #[tokio::test]
    async fn concurrent_init_reuses_one_handle() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(SqliteEventStore::new(dir.path().join("buffer.sqlite3")));
        let mut set = tokio::task::JoinSet::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            set.spawn(async move { store.init().await });
        }
        while let Some(res) = set.join_next().await {
            res.unwrap().unwrap();
        }
        store.append(&click(5)).await.unwrap();
        assert_eq!(store.drain_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unopened_store_reports_unavailable() {
        let dir = TempDir::new().unwrap();
        let store = SqliteEventStore::new(dir.path().join("buffer.sqlite3"));
        assert_eq!(
            store.append(&click(1)).await.unwrap_err(),
            StorageError::Unavailable
        );

        let memory = MemoryEventStore::new();
        assert_eq!(
            memory.drain_all().await.unwrap_err(),
            StorageError::Unavailable
        );
    }

    #[tokio::test]
    async fn unopenable_path_fails_init() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"file").unwrap();
        let store = SqliteEventStore::new(blocker.join("buffer.sqlite3"));
        assert!(store.init().await.is_err());
    }

    #[tokio::test]
    async fn memory_store_clear_through_keeps_later_events() {
        let store = MemoryEventStore::new();
        store.init().await.unwrap();
        store.append(&click(1)).await.unwrap();
        store.append(&click(2)).await.unwrap();
        let first = store.drain_all().await.unwrap();
        store.append(&click(3)).await.unwrap();

        store.clear_through(first.last().unwrap().seq).await.unwrap();
        let rest = store.drain_all().await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].event, click(3));
    }
}
