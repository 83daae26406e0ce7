use std::sync::Arc;

use log::{debug, error};
use warp::{http::StatusCode, reply, Filter, Rejection, Reply};

use super::types::{ApiError, EventsResponse, HealthResponse, SaveEventsResponse};
use crate::session_management::Aggregator;

/// Every route the server exposes.
pub fn api_routes(
    aggregator: Arc<Aggregator>,
    max_body_bytes: u64,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    save_events_route(aggregator.clone(), max_body_bytes)
        .or(list_events_route(aggregator))
        .or(health_route())
}

fn with_aggregator(
    aggregator: Arc<Aggregator>,
) -> impl Filter<Extract = (Arc<Aggregator>,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || aggregator.clone())
}

/// POST /api/tracker
pub fn save_events_route(
    aggregator: Arc<Aggregator>,
    max_body_bytes: u64,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path!("api" / "tracker")
        .and(warp::post())
        .and(warp::body::content_length_limit(max_body_bytes))
        .and(warp::body::bytes())
        .and(with_aggregator(aggregator))
        .and_then(save_events)
}

/// GET /api/tracker
pub fn list_events_route(
    aggregator: Arc<Aggregator>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path!("api" / "tracker")
        .and(warp::get())
        .and(with_aggregator(aggregator))
        .and_then(list_events)
}

/// GET /health
pub fn health_route() -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path!("health")
        .and(warp::get())
        .map(|| reply::json(&HealthResponse { status: "ok" }))
}

async fn save_events<B: AsRef<[u8]>>(
    body: B,
    aggregator: Arc<Aggregator>,
) -> Result<reply::Response, Rejection> {
    let payload: serde_json::Value = match serde_json::from_slice(body.as_ref()) {
        Ok(v) => v,
        Err(e) => {
            error!("Rejected malformed tracker body: {}", e);
            return Ok(failure("Failed to save events", e.to_string()));
        }
    };

    match aggregator.ingest(payload).await {
        Ok(ids) => {
            debug!("Saved batch into {} documents", ids.len());
            Ok(reply::with_status(
                reply::json(&SaveEventsResponse {
                    message: "Events saved".to_string(),
                    session_ids: ids,
                }),
                StatusCode::CREATED,
            )
            .into_response())
        }
        Err(e) => {
            error!("Error saving events: {}", e);
            Ok(failure("Failed to save events", e.to_string()))
        }
    }
}

async fn list_events(aggregator: Arc<Aggregator>) -> Result<reply::Response, Rejection> {
    match aggregator.documents().await {
        Ok(events) => Ok(reply::json(&EventsResponse { events }).into_response()),
        Err(e) => {
            error!("Error retrieving events: {}", e);
            Ok(failure("Failed to retrieve events", e.to_string()))
        }
    }
}

fn failure(error: &str, details: String) -> reply::Response {
    reply::with_status(
        reply::json(&ApiError {
            error: error.to_string(),
            details,
        }),
        StatusCode::INTERNAL_SERVER_ERROR,
    )
    .into_response()
}
