use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, error, info};
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::clock::Clock;
use crate::data_capture::types::USER_INTERACTION;
use crate::error_handling::types::AggregatorError;
use crate::network::types::FlattenedEvent;
use crate::storage::storage_trait::SessionPageRepository;
use crate::storage::types::{Activity, Click, SessionPageDocument, SessionPageUpdate};

/// Folds incoming batches into the session page repository.
pub struct Aggregator {
    repo: Arc<dyn SessionPageRepository>,
    clock: Arc<dyn Clock>,
}

impl Aggregator {
    pub fn new(repo: Arc<dyn SessionPageRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { repo, clock }
    }

    /// Decodes `payload`, groups it by `(session_id, page)` and upserts every
    /// group concurrently.
    ///
    /// Returns the document ids in group order. A failed group fails the
    /// whole call, but groups that already landed stay persisted.
    pub async fn ingest(&self, payload: serde_json::Value) -> Result<Vec<Uuid>, AggregatorError> {
        if !payload.is_array() {
            return Err(AggregatorError::InvalidPayload(
                "Data must be an array of events".to_string(),
            ));
        }
        let events: Vec<FlattenedEvent> = serde_json::from_value(payload)
            .map_err(|e| AggregatorError::InvalidPayload(e.to_string()))?;

        let groups = group_events(events, self.clock.now_millis());
        debug!("Ingesting {} session page groups", groups.len());

        let mut tasks = JoinSet::new();
        for (index, update) in groups.into_iter().enumerate() {
            let repo = Arc::clone(&self.repo);
            tasks.spawn(async move { (index, repo.upsert_merge(&update).await) });
        }

        let mut ids: Vec<Option<Uuid>> = vec![None; tasks.len()];
        let mut failure = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, Ok(id))) => ids[index] = Some(id),
                Ok((index, Err(e))) => {
                    error!("Upsert of group {} failed: {}", index, e);
                    failure.get_or_insert_with(|| e.to_string());
                }
                Err(e) => {
                    error!("Upsert task aborted: {}", e);
                    failure.get_or_insert_with(|| e.to_string());
                }
            }
        }
        if let Some(details) = failure {
            return Err(AggregatorError::Persistence(details));
        }

        let ids: Vec<Uuid> = ids.into_iter().flatten().collect();
        info!("Saved {} session page documents", ids.len());
        Ok(ids)
    }

    pub async fn documents(&self) -> Result<Vec<SessionPageDocument>, AggregatorError> {
        self.repo
            .find_all()
            .await
            .map_err(|e| AggregatorError::Persistence(e.to_string()))
    }
}

/// Groups a batch by `(session_id, page)` in first-seen order.
///
/// `start_time` is the last `init` timestamp of the group, else its earliest
/// event, else `now`. Clicks and activities keep batch order.
pub fn group_events(events: Vec<FlattenedEvent>, now: i64) -> Vec<SessionPageUpdate> {
    let mut order: Vec<SessionPageUpdate> = Vec::new();
    let mut index: HashMap<(String, String), usize> = HashMap::new();
    let mut init_seen: Vec<bool> = Vec::new();

    for event in events {
        let key = (event.session_id().to_string(), event.page().to_string());
        let slot = *index.entry(key).or_insert_with(|| {
            order.push(SessionPageUpdate {
                session_id: event.session_id().to_string(),
                page: event.page().to_string(),
                start_time: i64::MAX,
                duration: None,
                clicks: Vec::new(),
                activities: Vec::new(),
            });
            init_seen.push(false);
            order.len() - 1
        });
        let group = &mut order[slot];

        match event {
            FlattenedEvent::Init {
                timestamp,
                duration,
                ..
            } => {
                group.start_time = timestamp;
                group.duration = Some(duration);
                init_seen[slot] = true;
            }
            FlattenedEvent::Click { timestamp, x, y, .. } => {
                group.clicks.push(Click { x, y, timestamp });
                if !init_seen[slot] {
                    group.start_time = group.start_time.min(timestamp);
                }
            }
            FlattenedEvent::Activity { timestamp, .. } => {
                group.activities.push(Activity {
                    activity_type: USER_INTERACTION.to_string(),
                    timestamp,
                });
                if !init_seen[slot] {
                    group.start_time = group.start_time.min(timestamp);
                }
            }
        }
    }

    for group in &mut order {
        if group.start_time == i64::MAX {
            group.start_time = now;
        }
    }
    order
}
