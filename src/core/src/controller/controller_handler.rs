use std::future::Future;
use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::clock::{Clock, SystemClock};
use crate::configuration::config::{Config, Mode};
use crate::configuration::types::StorageBackend;
use crate::data_capture::coordinator::{CaptureCoordinator, CoordinatorOptions};
use crate::data_capture::identity::{resolve_session_id, FileSessionStorage, SessionStorage};
use crate::data_capture::local_store::{EventStore, MemoryEventStore, SqliteEventStore};
use crate::data_capture::types::{InteractionSignal, SessionContext};
use crate::error_handling::types::*;
use crate::network::batch_sender::HttpBatchSender;
use crate::network::sync_transport::FlushReason;
use crate::session_management::Aggregator;
use crate::storage::{DatabaseRepository, MemoryRepository, SessionPageRepository};
use crate::web_interface::WebServer;

/// Host command that forces a sync cycle.
const FLUSH_COMMAND: &str = "flush";

/// Builds the components described by a [`Config`] and runs one mode.
pub struct Controller {
    pub config: Config,
    clock: Arc<dyn Clock>,
}

impl Controller {
    pub fn new(config: Config) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: Config, clock: Arc<dyn Clock>) -> Self {
        Self { config, clock }
    }

    /// Runs `mode` until Ctrl-C, or until stdin closes in capture mode.
    pub async fn run(&self, mode: Mode) -> Result<(), ControllerError> {
        match mode {
            Mode::Serve => self.serve(shutdown_signal()).await,
            Mode::Capture { page } => {
                let stdin = tokio::io::BufReader::new(tokio::io::stdin());
                self.capture(&page, stdin, shutdown_signal()).await
            }
        }
    }

    pub async fn build_repository(&self) -> Result<Arc<dyn SessionPageRepository>, ControllerError> {
        match self.config.server.storage_backend {
            StorageBackend::Sqlite => {
                let repo = DatabaseRepository::new_file(&self.config.server.database_path).await?;
                Ok(Arc::new(repo))
            }
            StorageBackend::Memory => {
                warn!("Using in-memory storage, documents are lost on exit");
                Ok(Arc::new(MemoryRepository::new()))
            }
        }
    }

    /// Aggregation server mode.
    pub async fn serve<F>(&self, shutdown: F) -> Result<(), ControllerError>
    where
        F: Future<Output = ()> + Send,
    {
        let addr = self.config.socket_addr()?;
        let repo = self.build_repository().await?;
        let aggregator = Arc::new(Aggregator::new(repo, Arc::clone(&self.clock)));
        let server = WebServer::new(aggregator, self.config.server.max_body_bytes);
        server.start(addr, shutdown).await?;
        info!("Server stopped");
        Ok(())
    }

    /// Capture mode: one page view fed by interaction lines from `input`.
    ///
    /// Ends with a final flush when `input` reaches EOF or `shutdown`
    /// resolves, whichever comes first.
    pub async fn capture<R, F>(&self, page: &str, input: R, shutdown: F) -> Result<(), ControllerError>
    where
        R: AsyncBufRead + Unpin,
        F: Future<Output = ()>,
    {
        let identity = FileSessionStorage::new(&self.config.capture.session_dir);
        let context = self.session_context(page, &identity)?;
        let store: Arc<dyn EventStore> = match &self.config.capture.buffer_path {
            Some(path) => Arc::new(SqliteEventStore::new(path)),
            None => Arc::new(MemoryEventStore::new()),
        };
        let sender = Arc::new(HttpBatchSender::new(self.config.capture.endpoint.clone()));
        let options = CoordinatorOptions {
            flush_interval: self.config.flush_interval(),
            throttle_interval: self.config.throttle_interval(),
            ..CoordinatorOptions::default()
        };

        let coordinator =
            CaptureCoordinator::mount(context, store, sender, Arc::clone(&self.clock), options)
                .await;

        let stop = async {
            tokio::select! {
                _ = read_signals(&coordinator, input) => info!("Input closed"),
                _ = shutdown => info!("Interrupted"),
            }
        };
        coordinator.run(stop).await;
        Ok(())
    }

    pub fn session_context(
        &self,
        page: &str,
        identity: &dyn SessionStorage,
    ) -> Result<SessionContext, ControllerError> {
        let endpoint = reqwest::Url::parse(&self.config.capture.endpoint).map_err(|e| {
            ControllerError::InitializationFailed(format!(
                "bad capture endpoint {}: {}",
                self.config.capture.endpoint, e
            ))
        })?;
        Ok(SessionContext {
            session_id: resolve_session_id(identity),
            page: page.to_string(),
            page_load_time: self.clock.now_millis(),
            viewport_width: self.config.capture.viewport_width,
            viewport_height: self.config.capture.viewport_height,
            base_url: endpoint.origin().ascii_serialization(),
        })
    }
}

async fn read_signals<R: AsyncBufRead + Unpin>(coordinator: &CaptureCoordinator, input: R) {
    let mut lines = input.lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => return,
            Err(e) => {
                error!("Failed to read input: {}", e);
                return;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == FLUSH_COMMAND {
            match coordinator.flush_cycle(FlushReason::Periodic).await {
                Ok(outcome) => info!("Flush: {:?}", outcome),
                Err(e) => warn!("Flush failed: {}", e),
            }
            continue;
        }
        match line.parse::<InteractionSignal>() {
            Ok(signal) => {
                if !coordinator.handle(signal) {
                    debug!("Signal not forwarded: {}", line);
                }
            }
            Err(e) => warn!("{}", e),
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Unable to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
