pub mod config;
pub mod types;

pub use config::{Cli, Config, Mode};
pub use types::{CaptureConfig, ServerConfig, StorageBackend};
