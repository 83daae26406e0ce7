use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use log::{debug, error, info};
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, ConnectOptions, ConnectionTrait, Database,
    DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::error_handling::types::StorageError;
use crate::storage::db_entities::{activities, clicks, session_pages};
use crate::storage::storage_trait::SessionPageRepository;
use crate::storage::types::{Activity, Click, SessionPageDocument, SessionPageUpdate};

const SCHEMA: [&str; 5] = [
    "CREATE TABLE IF NOT EXISTS session_pages (
        id TEXT PRIMARY KEY,
        session_id TEXT NOT NULL,
        page TEXT NOT NULL,
        start_time INTEGER NOT NULL,
        duration INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );",
    "CREATE UNIQUE INDEX IF NOT EXISTS session_pages_natural_key
        ON session_pages (session_id, page);",
    "CREATE TABLE IF NOT EXISTS clicks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        document_id TEXT NOT NULL,
        x REAL NOT NULL,
        y REAL NOT NULL,
        timestamp INTEGER NOT NULL,
        FOREIGN KEY(document_id) REFERENCES session_pages(id) ON DELETE CASCADE
    );",
    "CREATE TABLE IF NOT EXISTS activities (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        document_id TEXT NOT NULL,
        activity_type TEXT NOT NULL,
        timestamp INTEGER NOT NULL,
        FOREIGN KEY(document_id) REFERENCES session_pages(id) ON DELETE CASCADE
    );",
    "PRAGMA foreign_keys = ON;",
];

/// SQLite repository for session page documents.
///
/// Clicks and activities live in their own tables; their auto-increment ids
/// preserve append order.
pub struct DatabaseRepository {
    db: DatabaseConnection,
}

impl DatabaseRepository {
    /// Create or open the database file at `path`.
    pub async fn new_file<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    error!("Failed to create database dir {}: {}", parent.display(), e);
                    StorageError::WriteFailed
                })?;
            }
        }
        let mut opts = ConnectOptions::new(format!("sqlite://{}?mode=rwc", path.display()));
        // one writer at a time: concurrent group upserts queue on the pool
        opts.max_connections(1).min_connections(1).sqlx_logging(false);
        let db = Database::connect(opts).await.map_err(|e| {
            error!("Failed to open database {}: {}", path.display(), e);
            StorageError::ConnectionFailed
        })?;
        for statement in SCHEMA {
            db.execute_unprepared(statement).await.map_err(|e| {
                error!("Failed to create schema: {}", e);
                StorageError::WriteFailed
            })?;
        }
        info!("DatabaseRepository initialized at {}", path.display());
        Ok(Self { db })
    }

    fn load_documents(
        &self,
        pages: Vec<session_pages::Model>,
        clicks: Vec<clicks::Model>,
        activities: Vec<activities::Model>,
    ) -> Result<Vec<SessionPageDocument>, StorageError> {
        let mut clicks_by_doc: HashMap<String, Vec<Click>> = HashMap::new();
        for row in clicks {
            clicks_by_doc.entry(row.document_id).or_default().push(Click {
                x: row.x,
                y: row.y,
                timestamp: row.timestamp,
            });
        }
        let mut activities_by_doc: HashMap<String, Vec<Activity>> = HashMap::new();
        for row in activities {
            activities_by_doc
                .entry(row.document_id)
                .or_default()
                .push(Activity {
                    activity_type: row.activity_type,
                    timestamp: row.timestamp,
                });
        }

        let mut out = Vec::with_capacity(pages.len());
        for page in pages {
            let id = Uuid::parse_str(&page.id).map_err(|_| StorageError::ReadFailed)?;
            out.push(SessionPageDocument {
                id,
                clicks: clicks_by_doc.remove(&page.id).unwrap_or_default(),
                activities: activities_by_doc.remove(&page.id).unwrap_or_default(),
                session_id: page.session_id,
                page: page.page,
                start_time: page.start_time,
                duration: page.duration,
                created_at: page.created_at,
                updated_at: page.updated_at,
            });
        }
        Ok(out)
    }
}

fn read_failed(e: sea_orm::DbErr) -> StorageError {
    error!("Database read failed: {}", e);
    StorageError::ReadFailed
}

fn write_failed(e: sea_orm::DbErr) -> StorageError {
    error!("Database write failed: {}", e);
    StorageError::WriteFailed
}

#[async_trait]
impl SessionPageRepository for DatabaseRepository {
    async fn upsert_merge(&self, update: &SessionPageUpdate) -> Result<Uuid, StorageError> {
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let txn = self.db.begin().await.map_err(write_failed)?;

        let existing = session_pages::Entity::find()
            .filter(session_pages::Column::SessionId.eq(update.session_id.as_str()))
            .filter(session_pages::Column::Page.eq(update.page.as_str()))
            .one(&txn)
            .await
            .map_err(read_failed)?;

        let document_id = match existing {
            Some(doc) => {
                let start_time = update.merged_start_time(doc.start_time);
                let duration = update.merged_duration(doc.duration);
                let id = doc.id.clone();
                let mut active: session_pages::ActiveModel = doc.into();
                active.start_time = Set(start_time);
                active.duration = Set(duration);
                active.updated_at = Set(now);
                active.update(&txn).await.map_err(write_failed)?;
                id
            }
            None => {
                let id = Uuid::new_v4().to_string();
                session_pages::ActiveModel {
                    id: Set(id.clone()),
                    session_id: Set(update.session_id.clone()),
                    page: Set(update.page.clone()),
                    start_time: Set(update.start_time),
                    duration: Set(update.duration.unwrap_or(0)),
                    created_at: Set(now.clone()),
                    updated_at: Set(now),
                }
                .insert(&txn)
                .await
                .map_err(write_failed)?;
                id
            }
        };

        if !update.clicks.is_empty() {
            clicks::Entity::insert_many(update.clicks.iter().map(|c| clicks::ActiveModel {
                id: NotSet,
                document_id: Set(document_id.clone()),
                x: Set(c.x),
                y: Set(c.y),
                timestamp: Set(c.timestamp),
            }))
            .exec(&txn)
            .await
            .map_err(write_failed)?;
        }
        if !update.activities.is_empty() {
            activities::Entity::insert_many(update.activities.iter().map(|a| {
                activities::ActiveModel {
                    id: NotSet,
                    document_id: Set(document_id.clone()),
                    activity_type: Set(a.activity_type.clone()),
                    timestamp: Set(a.timestamp),
                }
            }))
            .exec(&txn)
            .await
            .map_err(write_failed)?;
        }

        txn.commit().await.map_err(write_failed)?;
        debug!(
            "Upserted {} {} (+{} clicks, +{} activities)",
            update.session_id,
            update.page,
            update.clicks.len(),
            update.activities.len()
        );
        Uuid::parse_str(&document_id).map_err(|_| StorageError::ReadFailed)
    }

    async fn find_all(&self) -> Result<Vec<SessionPageDocument>, StorageError> {
        let pages = session_pages::Entity::find()
            .order_by_asc(session_pages::Column::CreatedAt)
            .all(&self.db)
            .await
            .map_err(read_failed)?;
        let clicks = clicks::Entity::find()
            .order_by_asc(clicks::Column::Id)
            .all(&self.db)
            .await
            .map_err(read_failed)?;
        let activities = activities::Entity::find()
            .order_by_asc(activities::Column::Id)
            .all(&self.db)
            .await
            .map_err(read_failed)?;
        self.load_documents(pages, clicks, activities)
    }

    async fn find_one(
        &self,
        session_id: &str,
        page: &str,
    ) -> Result<Option<SessionPageDocument>, StorageError> {
        let Some(doc) = session_pages::Entity::find()
            .filter(session_pages::Column::SessionId.eq(session_id))
            .filter(session_pages::Column::Page.eq(page))
            .one(&self.db)
            .await
            .map_err(read_failed)?
        else {
            return Ok(None);
        };
        let clicks = clicks::Entity::find()
            .filter(clicks::Column::DocumentId.eq(doc.id.as_str()))
            .order_by_asc(clicks::Column::Id)
            .all(&self.db)
            .await
            .map_err(read_failed)?;
        let activities = activities::Entity::find()
            .filter(activities::Column::DocumentId.eq(doc.id.as_str()))
            .order_by_asc(activities::Column::Id)
            .all(&self.db)
            .await
            .map_err(read_failed)?;
        Ok(self.load_documents(vec![doc], clicks, activities)?.pop())
    }
}
