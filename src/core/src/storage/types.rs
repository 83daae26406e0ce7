use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Click {
    pub x: f64,
    pub y: f64,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub activity_type: String,
    pub timestamp: i64,
}

/// Persisted aggregate for one `(session_id, page)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPageDocument {
    pub id: Uuid,
    pub session_id: String,
    pub page: String,
    /// Epoch milliseconds of the earliest known event.
    pub start_time: i64,
    /// Milliseconds on page as last reported.
    pub duration: i64,
    pub clicks: Vec<Click>,
    pub activities: Vec<Activity>,
    /// RFC3339
    pub created_at: String,
    /// RFC3339
    pub updated_at: String,
}

/// What one batch contributes to a session page.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionPageUpdate {
    pub session_id: String,
    pub page: String,
    pub start_time: i64,
    /// Present only when the batch carried an `init` event.
    pub duration: Option<i64>,
    pub clicks: Vec<Click>,
    pub activities: Vec<Activity>,
}

impl SessionPageUpdate {
    /// `startTime` never moves forward on resend.
    pub fn merged_start_time(&self, existing: i64) -> i64 {
        existing.min(self.start_time)
    }

    /// Last reported duration wins; batches without one keep the old value.
    pub fn merged_duration(&self, existing: i64) -> i64 {
        self.duration.unwrap_or(existing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(start_time: i64, duration: Option<i64>) -> SessionPageUpdate {
        SessionPageUpdate {
            session_id: "s".into(),
            page: "/".into(),
            start_time,
            duration,
            clicks: vec![],
            activities: vec![],
        }
    }

    #[test]
    fn merge_rules() {
        assert_eq!(update(500, None).merged_start_time(100), 100);
        assert_eq!(update(50, None).merged_start_time(100), 50);
        assert_eq!(update(0, Some(4000)).merged_duration(1000), 4000);
        assert_eq!(update(0, None).merged_duration(1000), 1000);
    }

    #[test]
    fn document_serializes_camel_case() {
        let doc = SessionPageDocument {
            id: Uuid::nil(),
            session_id: "s1".into(),
            page: "/shop".into(),
            start_time: 0,
            duration: 5000,
            clicks: vec![Click {
                x: 10.0,
                y: 20.0,
                timestamp: 100,
            }],
            activities: vec![Activity {
                activity_type: "user_interaction".into(),
                timestamp: 200,
            }],
            created_at: "2024-01-01T00:00:00+00:00".into(),
            updated_at: "2024-01-01T00:00:00+00:00".into(),
        };
        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["sessionId"], "s1");
        assert_eq!(value["startTime"], 0);
        assert_eq!(value["activities"][0]["activityType"], "user_interaction");
        assert_eq!(value["clicks"][0]["timestamp"], 100);
    }
}
