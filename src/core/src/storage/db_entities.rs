//! SeaORM entity models used by the SQLite backends.
//!
//! Server side, mapping the tables created by `database_storage`:
//! - `session_pages`: one row per `(session_id, page)`
//! - `clicks`: ordered click records per session page
//! - `activities`: ordered activity records per session page
//!
//! Client side, the table created by `data_capture::local_store`:
//! - `local_events`: the buffered event log

/// Session page table entity models.
pub mod session_pages {
    use sea_orm::entity::prelude::*;

    /// Aggregate row keyed by the `(session_id, page)` natural key.
    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "session_pages")]
    pub struct Model {
        /// UUID as string primary key
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: String,
        pub session_id: String,
        pub page: String,
        /// Epoch milliseconds
        pub start_time: i64,
        /// Milliseconds on page as last reported
        pub duration: i64,
        /// RFC3339 creation timestamp
        pub created_at: String,
        /// RFC3339 last update timestamp
        pub updated_at: String,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

/// Clicks table entity models.
pub mod clicks {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "clicks")]
    pub struct Model {
        /// Auto-increment row id, which is also the append order
        #[sea_orm(primary_key)]
        pub id: i64,
        /// Foreign key to `session_pages.id`
        pub document_id: String,
        pub x: f64,
        pub y: f64,
        pub timestamp: i64,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {
        #[sea_orm(
            belongs_to = "super::session_pages::Entity",
            from = "Column::DocumentId",
            to = "super::session_pages::Column::Id"
        )]
        SessionPage,
    }

    impl ActiveModelBehavior for ActiveModel {}
}

/// Activities table entity models.
pub mod activities {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "activities")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i64,
        pub document_id: String,
        pub activity_type: String,
        pub timestamp: i64,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {
        #[sea_orm(
            belongs_to = "super::session_pages::Entity",
            from = "Column::DocumentId",
            to = "super::session_pages::Column::Id"
        )]
        SessionPage,
    }

    impl ActiveModelBehavior for ActiveModel {}
}

/// Local event buffer entity models.
pub mod local_events {
    use sea_orm::entity::prelude::*;

    /// One buffered `RawEvent`, JSON-encoded.
    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "local_events")]
    pub struct Model {
        /// Auto-increment sequence key
        #[sea_orm(primary_key)]
        pub seq: i64,
        /// Event type tag, kept for inspection with sqlite3
        pub kind: String,
        pub payload: String,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}
