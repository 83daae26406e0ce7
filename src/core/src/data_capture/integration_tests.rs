//! Capture to aggregation, end to end, with the HTTP hop replaced by the
//! in-process warp routes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};

use crate::clock::ManualClock;
use crate::data_capture::coordinator::{CaptureCoordinator, CoordinatorOptions};
use crate::data_capture::local_store::{EventStore, SqliteEventStore};
use crate::data_capture::types::{InteractionSignal, SessionContext};
use crate::error_handling::types::TransportError;
use crate::network::batch_sender::BatchSender;
use crate::network::sync_transport::{FlushReason, SyncOutcome};
use crate::network::types::FlattenedEvent;
use crate::session_management::Aggregator;
use crate::storage::types::{Activity, Click};
use crate::storage::{DatabaseRepository, SessionPageRepository};
use crate::web_interface::api_routes;

/// Posts batches to the tracker route. While `offline` is set every batch
/// is refused before reaching the server.
struct RouteSender {
    aggregator: Arc<Aggregator>,
    offline: AtomicBool,
}

#[async_trait]
impl BatchSender for RouteSender {
    async fn send_batch(&self, batch: &[FlattenedEvent]) -> Result<(), TransportError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(TransportError::Network("connection refused".into()));
        }
        let routes = api_routes(Arc::clone(&self.aggregator), 1024 * 1024);
        let res = warp::test::request()
            .method("POST")
            .path("/api/tracker")
            .json(&batch)
            .reply(&routes)
            .await;
        if res.status().is_success() {
            Ok(())
        } else {
            Err(TransportError::Rejected {
                status: res.status().as_u16(),
                body: String::from_utf8_lossy(res.body()).to_string(),
            })
        }
    }
}

struct Pipeline {
    clock: Arc<ManualClock>,
    store: Arc<SqliteEventStore>,
    repo: Arc<DatabaseRepository>,
    sender: Arc<RouteSender>,
    coordinator: CaptureCoordinator,
    _dir: TempDir,
}

impl Pipeline {
    async fn mount() -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(0));
        let repo = Arc::new(
            DatabaseRepository::new_file(dir.path().join("server.sqlite3"))
                .await
                .unwrap(),
        );
        let aggregator = Arc::new(Aggregator::new(repo.clone(), clock.clone()));
        let sender = Arc::new(RouteSender {
            aggregator,
            offline: AtomicBool::new(false),
        });
        let store = Arc::new(SqliteEventStore::new(dir.path().join("buffer.sqlite3")));
        let context = SessionContext {
            session_id: "s1".into(),
            page: "/shop".into(),
            page_load_time: 0,
            viewport_width: 1280,
            viewport_height: 800,
            base_url: "http://localhost:3000".into(),
        };
        let coordinator = CaptureCoordinator::mount(
            context,
            store.clone(),
            sender.clone(),
            clock.clone(),
            CoordinatorOptions::default(),
        )
        .await;
        assert!(coordinator.barrier().await);

        Self {
            clock,
            store,
            repo,
            sender,
            coordinator,
            _dir: dir,
        }
    }

    /// Delivers `signal` at time `at` and waits until the worker buffered it.
    async fn signal_at(&self, at: i64, signal: InteractionSignal) -> bool {
        self.clock.set(at);
        let forwarded = self.coordinator.handle(signal);
        assert!(self.coordinator.barrier().await);
        forwarded
    }
}

#[tokio::test]
async fn page_view_lands_as_one_document() {
    let p = Pipeline::mount().await;
    assert!(p.signal_at(100, InteractionSignal::Click { x: 10.0, y: 20.0 }).await);
    assert!(p.signal_at(200, InteractionSignal::Scroll).await);

    p.clock.set(5_000);
    let outcome = assert_ok!(p.coordinator.flush_cycle(FlushReason::Periodic).await);
    assert_eq!(outcome, SyncOutcome::Delivered { events: 3 });

    let doc = p.repo.find_one("s1", "/shop").await.unwrap().unwrap();
    assert_eq!(doc.start_time, 0);
    assert_eq!(doc.duration, 5_000);
    assert_eq!(
        doc.clicks,
        vec![Click {
            x: 10.0,
            y: 20.0,
            timestamp: 100
        }]
    );
    assert_eq!(
        doc.activities,
        vec![Activity {
            activity_type: "user_interaction".into(),
            timestamp: 200
        }]
    );
    assert!(p.store.drain_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn nothing_is_lost_while_the_server_is_unreachable() {
    let p = Pipeline::mount().await;
    p.sender.offline.store(true, Ordering::SeqCst);

    p.signal_at(100, InteractionSignal::Click { x: 1.0, y: 1.0 }).await;
    p.clock.set(1_000);
    assert_err!(p.coordinator.flush_cycle(FlushReason::Periodic).await);
    assert_eq!(p.store.drain_all().await.unwrap().len(), 2);

    p.signal_at(2_000, InteractionSignal::Click { x: 2.0, y: 2.0 }).await;
    p.clock.set(3_000);
    assert_err!(p.coordinator.flush_cycle(FlushReason::Periodic).await);
    assert!(p.repo.find_all().await.unwrap().is_empty());

    p.sender.offline.store(false, Ordering::SeqCst);
    p.clock.set(4_000);
    let outcome = p.coordinator.flush_cycle(FlushReason::Periodic).await.unwrap();
    assert_eq!(outcome, SyncOutcome::Delivered { events: 3 });

    let doc = p.repo.find_one("s1", "/shop").await.unwrap().unwrap();
    assert_eq!(
        doc.clicks.iter().map(|c| c.timestamp).collect::<Vec<_>>(),
        vec![100, 2_000]
    );
    assert_eq!(doc.duration, 4_000);
}

#[tokio::test]
async fn mousemove_burst_is_stored_once() {
    let p = Pipeline::mount().await;
    let mut forwarded = 0;
    for t in 0..1_000 {
        p.clock.set(1_000 + t);
        if p.coordinator.handle(InteractionSignal::MouseMove) {
            forwarded += 1;
        }
    }
    assert!(p.coordinator.barrier().await);
    assert_eq!(forwarded, 1);

    p.clock.set(2_000);
    p.coordinator
        .flush_cycle(FlushReason::Periodic)
        .await
        .unwrap();
    let doc = p.repo.find_one("s1", "/shop").await.unwrap().unwrap();
    assert_eq!(doc.activities.len(), 1);
}

#[tokio::test]
async fn resends_grow_one_document_and_teardown_flushes_the_rest() {
    let p = Pipeline::mount().await;
    p.signal_at(100, InteractionSignal::Click { x: 1.0, y: 1.0 }).await;
    p.clock.set(1_000);
    p.coordinator
        .flush_cycle(FlushReason::Periodic)
        .await
        .unwrap();

    p.signal_at(1_500, InteractionSignal::Click { x: 2.0, y: 2.0 }).await;
    p.clock.set(4_000);
    p.coordinator
        .flush_cycle(FlushReason::Periodic)
        .await
        .unwrap();

    p.signal_at(8_000, InteractionSignal::Click { x: 3.0, y: 3.0 }).await;
    p.clock.set(9_000);
    assert!(p.coordinator.teardown().await.is_some());
    assert!(!p.coordinator.is_listening());

    let all = p.repo.find_all().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].clicks.len(), 3);
    assert_eq!(all[0].start_time, 0);
    assert_eq!(all[0].duration, 9_000);
}

#[tokio::test]
async fn idle_teardown_leaves_the_last_reported_duration() {
    let p = Pipeline::mount().await;
    p.clock.set(1_000);
    p.coordinator
        .flush_cycle(FlushReason::Periodic)
        .await
        .unwrap();

    p.clock.set(9_000);
    assert!(p.coordinator.teardown().await.is_some());

    let doc = p.repo.find_one("s1", "/shop").await.unwrap().unwrap();
    assert_eq!(doc.duration, 1_000);
}
