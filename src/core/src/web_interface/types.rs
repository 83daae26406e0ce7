use serde::Serialize;
use uuid::Uuid;

use crate::storage::types::SessionPageDocument;

/// 201 body of `POST /api/tracker`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveEventsResponse {
    pub message: String,
    pub session_ids: Vec<Uuid>,
}

/// 200 body of `GET /api/tracker`.
#[derive(Debug, Serialize)]
pub struct EventsResponse {
    pub events: Vec<SessionPageDocument>,
}

/// API error payload
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub details: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}
