//! Capture coordinator.
//!
//! Bridges host interaction signals to the capture worker and drives the
//! periodic sync cycle. Clicks are forwarded as they come; scroll and mouse
//! movement share one [`ThrottleGate`] so a burst collapses to a single
//! activity per interval.
//!
//! ```no_run
//! use std::sync::Arc;
//! use pagetrace::clock::SystemClock;
//! use pagetrace::data_capture::coordinator::{CaptureCoordinator, CoordinatorOptions};
//! use pagetrace::data_capture::local_store::MemoryEventStore;
//! use pagetrace::data_capture::types::{InteractionSignal, SessionContext};
//! use pagetrace::network::batch_sender::HttpBatchSender;
//!
//! # async fn run(context: SessionContext) {
//! let coordinator = CaptureCoordinator::mount(
//!     context,
//!     Arc::new(MemoryEventStore::new()),
//!     Arc::new(HttpBatchSender::new("http://127.0.0.1:3000/api/tracker")),
//!     Arc::new(SystemClock),
//!     CoordinatorOptions::default(),
//! )
//! .await;
//! coordinator.handle(InteractionSignal::Click { x: 10.0, y: 20.0 });
//! coordinator.run(tokio::signal::ctrl_c()).await;
//! # }
//! ```

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::sync::oneshot;
use tokio::time::MissedTickBehavior;

use super::local_store::EventStore;
use super::throttle::ThrottleGate;
use super::types::{InitData, InteractionSignal, SessionContext, WorkerMessage, USER_INTERACTION};
use super::worker::{CaptureWorker, WorkerHandle, WorkerStats};
use crate::clock::Clock;
use crate::error_handling::types::{StorageError, TransportError};
use crate::network::batch_sender::BatchSender;
use crate::network::sync_transport::{FlushReason, SyncOutcome, SyncTransport};

#[derive(Debug, Clone)]
pub struct CoordinatorOptions {
    /// Period of the sync timer.
    pub flush_interval: Duration,
    /// Minimum spacing of forwarded activity signals.
    pub throttle_interval: Duration,
    /// How long a flush waits for the worker to catch up before reading the
    /// buffer anyway.
    pub ack_timeout: Duration,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            flush_interval: Duration::from_millis(300_000),
            throttle_interval: Duration::from_millis(5_000),
            ack_timeout: Duration::from_secs(2),
        }
    }
}

pub struct CaptureCoordinator {
    context: Arc<SessionContext>,
    transport: SyncTransport,
    clock: Arc<dyn Clock>,
    options: CoordinatorOptions,
    worker: Mutex<Option<WorkerHandle>>,
    throttle: Mutex<ThrottleGate>,
    listening: AtomicBool,
    torn_down: AtomicBool,
}

impl CaptureCoordinator {
    /// Opens the buffer, starts the worker and sends its single `Init`.
    ///
    /// If the buffer cannot be opened the coordinator mounts detached: every
    /// signal is ignored and nothing is synced, but the host keeps running.
    pub async fn mount(
        context: SessionContext,
        store: Arc<dyn EventStore>,
        sender: Arc<dyn BatchSender>,
        clock: Arc<dyn Clock>,
        options: CoordinatorOptions,
    ) -> Self {
        let context = Arc::new(context);
        let transport = SyncTransport::new(
            Arc::clone(&store),
            Arc::clone(&context),
            sender,
            Arc::clone(&clock),
        );

        let worker = match store.init().await {
            Ok(()) => {
                let handle = CaptureWorker::spawn(Arc::clone(&store), Arc::clone(&clock));
                match handle.send(WorkerMessage::Init(InitData::from(context.as_ref()))) {
                    Ok(()) => Some(handle),
                    Err(e) => {
                        error!("[{}] failed to initialise worker: {}", context.session_id, e);
                        None
                    }
                }
            }
            Err(e) => {
                error!(
                    "[{}] event buffer unavailable, capture disabled: {}",
                    context.session_id, e
                );
                None
            }
        };
        let attached = worker.is_some();
        if attached {
            info!(
                "[{}] capture mounted on {} ({}x{})",
                context.session_id, context.page, context.viewport_width, context.viewport_height
            );
        }

        Self {
            context,
            transport,
            throttle: Mutex::new(ThrottleGate::new(options.throttle_interval)),
            clock,
            options,
            worker: Mutex::new(worker),
            listening: AtomicBool::new(attached),
            torn_down: AtomicBool::new(false),
        }
    }

    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    /// Routes one host signal. Returns true when a message reached the
    /// worker.
    pub fn handle(&self, signal: InteractionSignal) -> bool {
        if !self.is_listening() {
            return false;
        }
        let message = match signal {
            InteractionSignal::Click { x, y } => WorkerMessage::Click { x, y },
            InteractionSignal::Scroll | InteractionSignal::MouseMove => {
                let now = self.clock.now_millis();
                if !lock(&self.throttle).try_fire(now) {
                    return false;
                }
                WorkerMessage::Activity {
                    activity_type: USER_INTERACTION.to_string(),
                }
            }
        };
        self.forward(message)
    }

    /// One sync cycle: tell the worker a flush is coming, wait until it has
    /// appended everything sent so far, then run the transport.
    pub async fn flush_cycle(&self, reason: FlushReason) -> Result<SyncOutcome, TransportError> {
        if !self.barrier().await {
            return Err(TransportError::Store(StorageError::Unavailable));
        }
        self.transport.sync(reason).await
    }

    /// Runs the periodic sync timer until `shutdown` resolves, then tears
    /// down. The first tick fires immediately. Shutdown also interrupts a
    /// periodic flush that is still in flight.
    pub async fn run<F: Future>(&self, shutdown: F) {
        let mut ticker = tokio::time::interval(self.options.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    debug!("[{}] periodic flush", self.context.session_id);
                    // an abandoned flush leaves the buffer intact for teardown
                    tokio::select! {
                        result = self.flush_cycle(FlushReason::Periodic) => {
                            if let Err(e) = result {
                                debug!("[{}] periodic flush did not complete: {}", self.context.session_id, e);
                            }
                        }
                        _ = &mut shutdown => break,
                    }
                }
                _ = &mut shutdown => break,
            }
        }
        self.teardown().await;
    }

    /// Stops listening, makes a final best-effort flush and terminates the
    /// worker. Only the first call does anything.
    pub async fn teardown(&self) -> Option<WorkerStats> {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return None;
        }
        self.listening.store(false, Ordering::SeqCst);

        if let Err(e) = self.flush_cycle(FlushReason::Teardown).await {
            warn!("[{}] final flush failed: {}", self.context.session_id, e);
        }
        let handle = lock(&self.worker).take()?;
        let stats = handle.terminate().await;
        info!(
            "[{}] capture unmounted from {}: {:?}",
            self.context.session_id, self.context.page, stats
        );
        Some(stats)
    }

    /// Sends `SendAnalytics` and waits for the worker to acknowledge it.
    /// Returns false when there is no worker to wait for.
    pub(crate) async fn barrier(&self) -> bool {
        let (ack, done) = oneshot::channel();
        if !self.forward(WorkerMessage::SendAnalytics { ack: Some(ack) }) {
            return false;
        }
        if tokio::time::timeout(self.options.ack_timeout, done).await.is_err() {
            warn!(
                "[{}] worker did not acknowledge flush within {:?}",
                self.context.session_id, self.options.ack_timeout
            );
        }
        true
    }

    fn forward(&self, message: WorkerMessage) -> bool {
        let guard = lock(&self.worker);
        let Some(worker) = guard.as_ref() else {
            return false;
        };
        match worker.send(message) {
            Ok(()) => true,
            Err(e) => {
                warn!("[{}] {}", self.context.session_id, e);
                false
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
