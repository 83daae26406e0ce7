//! Background capture worker.
//!
//! The worker runs as its own tokio task and owns no durable state: it
//! timestamps and classifies inbound [`WorkerMessage`]s and appends the
//! resulting [`RawEvent`]s to the injected [`EventStore`]. Messages are
//! handled strictly in send order through a single mpsc inbox.

use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::local_store::EventStore;
use super::types::{InitData, RawEvent, WorkerMessage};
use crate::clock::Clock;
use crate::error_handling::types::{CaptureError, StorageError};

/// Counters reported when the worker terminates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub appended: u64,
    pub dropped: u64,
    pub flush_hints: u64,
}

pub struct CaptureWorker {
    store: Arc<dyn EventStore>,
    clock: Arc<dyn Clock>,
    identity: Option<InitData>,
    degraded: bool,
    since_flush: u64,
    stats: WorkerStats,
}

/// Sending side of a running worker.
pub struct WorkerHandle {
    tx: mpsc::UnboundedSender<WorkerMessage>,
    task: JoinHandle<WorkerStats>,
}

impl CaptureWorker {
    /// Spawns the worker task and returns the handle used to feed it.
    pub fn spawn(store: Arc<dyn EventStore>, clock: Arc<dyn Clock>) -> WorkerHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = CaptureWorker {
            store,
            clock,
            identity: None,
            degraded: false,
            since_flush: 0,
            stats: WorkerStats::default(),
        };
        let task = tokio::spawn(worker.run(rx));
        info!("Capture worker started");
        WorkerHandle { tx, task }
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<WorkerMessage>) -> WorkerStats {
        while let Some(message) = rx.recv().await {
            self.handle(message).await;
        }
        debug!("Capture worker inbox closed: {:?}", self.stats);
        self.stats
    }

    async fn handle(&mut self, message: WorkerMessage) {
        let event = match message {
            WorkerMessage::Init(data) => {
                if let Some(ref current) = self.identity {
                    warn!(
                        "Ignoring repeated INIT for session {} (worker bound to {} {})",
                        data.session_id, current.session_id, current.current_path
                    );
                    self.stats.dropped += 1;
                    return;
                }
                info!(
                    "[{}] worker bound to page {} ({})",
                    data.session_id, data.current_path, data.base_url
                );
                let event = RawEvent::Init {
                    session_id: data.session_id.clone(),
                    page: data.current_path.clone(),
                    page_load_time: data.page_load_time,
                    viewport_width: data.viewport_width,
                    viewport_height: data.viewport_height,
                };
                self.identity = Some(data);
                event
            }
            WorkerMessage::SendAnalytics { ack } => {
                self.stats.flush_hints += 1;
                debug!(
                    "Flush requested, {} events captured since last flush",
                    self.since_flush
                );
                self.since_flush = 0;
                if let Some(ack) = ack {
                    let _ = ack.send(());
                }
                return;
            }
            WorkerMessage::Click { .. } | WorkerMessage::Activity { .. }
                if self.identity.is_none() =>
            {
                warn!("Dropping capture message received before INIT");
                self.stats.dropped += 1;
                return;
            }
            WorkerMessage::Click { x, y } => RawEvent::Click {
                x,
                y,
                timestamp: self.clock.now_millis(),
            },
            WorkerMessage::Activity { activity_type } => RawEvent::Activity {
                activity_type,
                timestamp: self.clock.now_millis(),
            },
        };
        self.record(event).await;
    }

    async fn record(&mut self, event: RawEvent) {
        if self.degraded {
            self.stats.dropped += 1;
            return;
        }
        match self.store.append(&event).await {
            Ok(()) => {
                self.stats.appended += 1;
                self.since_flush += 1;
            }
            Err(e @ (StorageError::Unavailable | StorageError::ConnectionFailed)) => {
                error!("Event buffer unusable, capture disabled: {}", e);
                self.degraded = true;
                self.stats.dropped += 1;
            }
            Err(e) => {
                warn!("Dropped one {} event: {}", event.kind(), e);
                self.stats.dropped += 1;
            }
        }
    }
}

impl WorkerHandle {
    pub fn send(&self, message: WorkerMessage) -> Result<(), CaptureError> {
        self.tx
            .send(message)
            .map_err(|_| CaptureError::WorkerUnavailable)
    }

    /// Closes the inbox, lets the worker drain what was already sent, and
    /// returns its counters.
    pub async fn terminate(self) -> WorkerStats {
        drop(self.tx);
        match self.task.await {
            Ok(stats) => stats,
            Err(e) => {
                error!("Capture worker task failed: {}", e);
                WorkerStats::default()
            }
        }
    }
}
