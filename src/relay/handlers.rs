// src/relay/handlers.rs

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::state::RelayState;
use crate::counting::AggregateCounts;
use crate::delivery::CountUpdate;

fn no_json() -> (StatusCode, Json<Value>) {
    (StatusCode::BAD_REQUEST, Json(json!({"error": "No JSON"})))
}

/// `POST /update` from the on-board counter.
///
/// A body that is not JSON, is `null`, or is an empty object is rejected.
pub async fn update_counts(
    State(state): State<RelayState>,
    body: Result<Json<Value>, JsonRejection>,
) -> (StatusCode, Json<Value>) {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => {
            warn!("[RELAY] Rejected update: {}", rejection.body_text());
            return no_json();
        }
    };
    if body.is_null() || body.as_object().is_some_and(|fields| fields.is_empty()) {
        warn!("[RELAY] Rejected empty update");
        return no_json();
    }
    let update = match CountUpdate::deserialize(&body) {
        Ok(update) => update,
        Err(e) => {
            warn!("[RELAY] Rejected update {}: {}", body, e);
            return no_json();
        }
    };

    let counts = state.apply(update);
    info!(
        "[RELAY] Updated -> entered={} exited={}",
        counts.entered, counts.exited
    );
    (StatusCode::OK, Json(json!({"status": "ok"})))
}

/// `GET /latest`
pub async fn latest_counts(State(state): State<RelayState>) -> Json<AggregateCounts> {
    Json(state.latest())
}
