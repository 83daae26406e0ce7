//! Storage subsystem
//!
//! This module provides the abstraction and implementations for persisting
//! per-session-page aggregates on the server side.
//!
//! Components:
//! - `storage_trait`: the SessionPageRepository trait defining a uniform API.
//! - `types`: documents and merge inputs shared by the backends.
//! - `database_storage`: ORM-based SQLite implementation using SeaORM.
//! - `memory_storage`: in-process implementation for tests and throwaway servers.
//! - `db_entities`: SeaORM entity models, including the client-side event buffer table.

pub mod database_storage;
pub mod db_entities;
pub mod memory_storage;
pub mod storage_trait;
pub mod types;

pub use database_storage::DatabaseRepository;
pub use memory_storage::MemoryRepository;
pub use storage_trait::SessionPageRepository;
