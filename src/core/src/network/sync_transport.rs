//! Sync cycle: drain → flatten → POST → conditional clear.
//!
//! The transport is the only component that removes events from the local
//! buffer, and it does so only after the server acknowledged the batch. A
//! failed delivery leaves the buffer untouched, so the next cycle retries
//! with everything captured so far.

use std::sync::Arc;

use log::{debug, error, info};

use super::batch_sender::BatchSender;
use super::types::FlattenedEvent;
use crate::clock::Clock;
use crate::data_capture::local_store::EventStore;
use crate::data_capture::types::{RawEvent, SessionContext, StoredEvent};
use crate::error_handling::types::TransportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReason {
    Periodic,
    Teardown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Nothing buffered, no request made.
    Empty,
    /// `events` buffered events were acknowledged and removed.
    Delivered { events: usize },
}

pub struct SyncTransport {
    store: Arc<dyn EventStore>,
    context: Arc<SessionContext>,
    sender: Arc<dyn BatchSender>,
    clock: Arc<dyn Clock>,
}

impl SyncTransport {
    pub fn new(
        store: Arc<dyn EventStore>,
        context: Arc<SessionContext>,
        sender: Arc<dyn BatchSender>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            context,
            sender,
            clock,
        }
    }

    pub async fn sync(&self, reason: FlushReason) -> Result<SyncOutcome, TransportError> {
        let drained = self.store.drain_all().await?;
        if drained.is_empty() {
            debug!("[{}] no events to sync ({:?})", self.context.session_id, reason);
            return Ok(SyncOutcome::Empty);
        }

        let now = self.clock.now_millis();
        let mut batch = flatten(&drained, &self.context, now);
        if !batch.iter().any(FlattenedEvent::is_init) {
            // the init event went out with an earlier batch; keep the page
            // duration moving with every delivery
            batch.insert(0, heartbeat(&self.context, now));
        }

        info!(
            "[{}] syncing {} events ({} buffered)",
            self.context.session_id,
            batch.len(),
            drained.len()
        );
        if let Err(e) = self.sender.send_batch(&batch).await {
            error!("[{}] sync failed, keeping buffer: {}", self.context.session_id, e);
            return Err(e);
        }

        if let Some(last) = drained.last() {
            self.store.clear_through(last.seq).await?;
        }
        info!(
            "[{}] synced {} events, buffer cleared",
            self.context.session_id,
            drained.len()
        );
        Ok(SyncOutcome::Delivered {
            events: drained.len(),
        })
    }
}

/// Maps buffered events to the wire format. Identity comes from `context`;
/// `init` durations are measured against `now`.
pub fn flatten(events: &[StoredEvent], context: &SessionContext, now: i64) -> Vec<FlattenedEvent> {
    events
        .iter()
        .map(|stored| match &stored.event {
            RawEvent::Init { page_load_time, .. } => FlattenedEvent::Init {
                session_id: context.session_id.clone(),
                page: context.page.clone(),
                timestamp: *page_load_time,
                duration: now - page_load_time,
            },
            RawEvent::Click { x, y, timestamp } => FlattenedEvent::Click {
                session_id: context.session_id.clone(),
                page: context.page.clone(),
                timestamp: *timestamp,
                x: *x,
                y: *y,
            },
            RawEvent::Activity { timestamp, .. } => FlattenedEvent::Activity {
                session_id: context.session_id.clone(),
                page: context.page.clone(),
                timestamp: *timestamp,
            },
        })
        .collect()
}

fn heartbeat(context: &SessionContext, now: i64) -> FlattenedEvent {
    FlattenedEvent::Init {
        session_id: context.session_id.clone(),
        page: context.page.clone(),
        timestamp: context.page_load_time,
        duration: now - context.page_load_time,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::data_capture::local_store::MemoryEventStore;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio_test::{assert_err, assert_ok};

    /// Records batches; fails while `fail` is set.
    #[derive(Default)]
    struct RecordingSender {
        fail: Mutex<bool>,
        batches: Mutex<Vec<Vec<FlattenedEvent>>>,
    }

    impl RecordingSender {
        fn set_failing(&self, fail: bool) {
            *self.fail.lock().unwrap() = fail;
        }

        fn batches(&self) -> Vec<Vec<FlattenedEvent>> {
            self.batches.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl BatchSender for RecordingSender {
        async fn send_batch(&self, batch: &[FlattenedEvent]) -> Result<(), TransportError> {
            if *self.fail.lock().unwrap() {
                return Err(TransportError::Rejected {
                    status: 500,
                    body: "boom".into(),
                });
            }
            self.batches.lock().unwrap().push(batch.to_vec());
            Ok(())
        }
    }

    fn context() -> Arc<SessionContext> {
        Arc::new(SessionContext {
            session_id: "s1".into(),
            page: "/shop".into(),
            page_load_time: 1_000,
            viewport_width: 1280,
            viewport_height: 800,
            base_url: "http://localhost:3000".into(),
        })
    }

    fn init_event() -> RawEvent {
        RawEvent::Init {
            session_id: "s1".into(),
            page: "/shop".into(),
            page_load_time: 1_000,
            viewport_width: 1280,
            viewport_height: 800,
        }
    }

    struct Fixture {
        store: Arc<MemoryEventStore>,
        sender: Arc<RecordingSender>,
        clock: Arc<ManualClock>,
        transport: SyncTransport,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryEventStore::new());
        store.init().await.unwrap();
        let sender = Arc::new(RecordingSender::default());
        let clock = Arc::new(ManualClock::new(1_000));
        let transport =
            SyncTransport::new(store.clone(), context(), sender.clone(), clock.clone());
        Fixture {
            store,
            sender,
            clock,
            transport,
        }
    }

    #[test]
    fn flatten_injects_identity_and_recomputes_duration() {
        let events = vec![
            StoredEvent {
                seq: 1,
                event: init_event(),
            },
            StoredEvent {
                seq: 2,
                event: RawEvent::Click {
                    x: 5.0,
                    y: 6.0,
                    timestamp: 1_100,
                },
            },
        ];
        let ctx = context();
        let first = flatten(&events, &ctx, 2_000);
        let later = flatten(&events, &ctx, 9_000);

        assert_eq!(
            first[0],
            FlattenedEvent::Init {
                session_id: "s1".into(),
                page: "/shop".into(),
                timestamp: 1_000,
                duration: 1_000,
            }
        );
        assert!(matches!(later[0], FlattenedEvent::Init { duration: 8_000, .. }));
        assert_eq!(first[1].session_id(), "s1");
        assert_eq!(first[1].page(), "/shop");
    }

    #[tokio::test]
    async fn empty_buffer_makes_no_request() {
        let f = fixture().await;
        let outcome = f.transport.sync(FlushReason::Periodic).await.unwrap();
        assert_eq!(outcome, SyncOutcome::Empty);
        assert!(f.sender.batches().is_empty());
    }

    #[tokio::test]
    async fn successful_sync_empties_the_buffer() {
        let f = fixture().await;
        f.store.append(&init_event()).await.unwrap();
        for t in 0..5 {
            f.store
                .append(&RawEvent::Click {
                    x: 1.0,
                    y: 1.0,
                    timestamp: 1_000 + t,
                })
                .await
                .unwrap();
        }
        f.clock.set(4_000);

        let outcome = assert_ok!(f.transport.sync(FlushReason::Periodic).await);
        assert_eq!(outcome, SyncOutcome::Delivered { events: 6 });
        assert!(f.store.drain_all().await.unwrap().is_empty());

        let batches = f.sender.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 6);
        assert!(batches[0]
            .iter()
            .all(|e| e.session_id() == "s1" && e.page() == "/shop"));
    }

    #[tokio::test]
    async fn failed_sync_keeps_every_event_for_the_next_cycle() {
        let f = fixture().await;
        f.store.append(&init_event()).await.unwrap();
        f.store
            .append(&RawEvent::Activity {
                activity_type: "user_interaction".into(),
                timestamp: 1_200,
            })
            .await
            .unwrap();
        f.sender.set_failing(true);

        assert_err!(f.transport.sync(FlushReason::Periodic).await);
        assert_eq!(f.store.drain_all().await.unwrap().len(), 2);

        // captured while the server was down
        f.store
            .append(&RawEvent::Click {
                x: 2.0,
                y: 3.0,
                timestamp: 1_300,
            })
            .await
            .unwrap();
        assert_eq!(f.store.drain_all().await.unwrap().len(), 3);

        f.sender.set_failing(false);
        let outcome = f.transport.sync(FlushReason::Periodic).await.unwrap();
        assert_eq!(outcome, SyncOutcome::Delivered { events: 3 });
        assert_eq!(f.sender.batches()[0].len(), 3);
        assert!(f.store.drain_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn later_batches_carry_a_duration_heartbeat() {
        let f = fixture().await;
        f.store.append(&init_event()).await.unwrap();
        f.transport.sync(FlushReason::Periodic).await.unwrap();

        f.store
            .append(&RawEvent::Click {
                x: 1.0,
                y: 1.0,
                timestamp: 2_000,
            })
            .await
            .unwrap();
        f.clock.set(6_000);
        f.transport.sync(FlushReason::Periodic).await.unwrap();

        let second = &f.sender.batches()[1];
        assert_eq!(second.len(), 2);
        assert_eq!(
            second[0],
            FlattenedEvent::Init {
                session_id: "s1".into(),
                page: "/shop".into(),
                timestamp: 1_000,
                duration: 5_000,
            }
        );
    }

    #[tokio::test]
    async fn idle_teardown_makes_no_request() {
        let f = fixture().await;
        f.clock.set(31_000);
        let outcome = f.transport.sync(FlushReason::Teardown).await.unwrap();
        assert_eq!(outcome, SyncOutcome::Empty);
        assert!(f.sender.batches().is_empty());
    }

    #[tokio::test]
    async fn teardown_with_pending_events_carries_final_duration() {
        let f = fixture().await;
        f.store
            .append(&RawEvent::Click {
                x: 1.0,
                y: 1.0,
                timestamp: 20_000,
            })
            .await
            .unwrap();
        f.clock.set(31_000);
        let outcome = f.transport.sync(FlushReason::Teardown).await.unwrap();
        assert_eq!(outcome, SyncOutcome::Delivered { events: 1 });

        let batches = f.sender.batches();
        assert_eq!(batches.len(), 1);
        assert!(matches!(
            batches[0][0],
            FlattenedEvent::Init {
                duration: 30_000,
                ..
            }
        ));
    }
}
