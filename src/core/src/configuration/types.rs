use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Where the server keeps session page documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Sqlite,
    Memory,
}

/// `[server]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub storage_backend: StorageBackend,
    pub database_path: PathBuf,
    /// Upper bound on `POST /api/tracker` bodies.
    pub max_body_bytes: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 3000,
            storage_backend: StorageBackend::Sqlite,
            database_path: PathBuf::from("pagetrace.sqlite3"),
            max_body_bytes: 1024 * 1024,
        }
    }
}

/// `[capture]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub endpoint: String,
    /// SQLite file backing the local event buffer. `None` keeps it in memory.
    pub buffer_path: Option<PathBuf>,
    /// Directory holding the per-session identity.
    pub session_dir: PathBuf,
    pub flush_interval_ms: u64,
    pub throttle_interval_ms: u64,
    pub viewport_width: u32,
    pub viewport_height: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:3000/api/tracker".to_string(),
            buffer_path: None,
            session_dir: PathBuf::from(".pagetrace-session"),
            flush_interval_ms: 5 * 60 * 1000,
            throttle_interval_ms: 5000,
            viewport_width: 1280,
            viewport_height: 800,
        }
    }
}
