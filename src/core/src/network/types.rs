use serde::{Deserialize, Serialize};

/// Wire representation of one captured event, as POSTed by the sync
/// transport and consumed by the server aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum FlattenedEvent {
    Init {
        session_id: String,
        page: String,
        timestamp: i64,
        /// Milliseconds on page as of the flush that produced this event.
        #[serde(default)]
        duration: i64,
    },
    Click {
        session_id: String,
        page: String,
        timestamp: i64,
        x: f64,
        y: f64,
    },
    Activity {
        session_id: String,
        page: String,
        timestamp: i64,
    },
}

impl FlattenedEvent {
    pub fn session_id(&self) -> &str {
        match self {
            FlattenedEvent::Init { session_id, .. }
            | FlattenedEvent::Click { session_id, .. }
            | FlattenedEvent::Activity { session_id, .. } => session_id,
        }
    }

    pub fn page(&self) -> &str {
        match self {
            FlattenedEvent::Init { page, .. }
            | FlattenedEvent::Click { page, .. }
            | FlattenedEvent::Activity { page, .. } => page,
        }
    }

    pub fn timestamp(&self) -> i64 {
        match self {
            FlattenedEvent::Init { timestamp, .. }
            | FlattenedEvent::Click { timestamp, .. }
            | FlattenedEvent::Activity { timestamp, .. } => *timestamp,
        }
    }

    pub fn is_init(&self) -> bool {
        matches!(self, FlattenedEvent::Init { .. })
    }
}
