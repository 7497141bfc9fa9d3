//! Service statistics.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/stats", get(get_stats))
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct StatsResponse {
    /// Live websocket sessions, counting each connection separately.
    pub connected_sessions: usize,
    /// Messages persisted so far. Reported as 0 when the store is unavailable.
    pub total_messages: i64,
}

#[utoipa::path(
    get,
    path = "/api/stats",
    tag = "Stats",
    responses((status = 200, description = "Current service statistics", body = StatsResponse)),
)]
pub async fn get_stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let connected_sessions = state.hub.session_count().await;
    let total_messages = match state.messages.message_count().await {
        Ok(count) => count,
        Err(e) => {
            tracing::warn!(error = %e, "failed to count messages");
            0
        }
    };

    Json(StatsResponse {
        connected_sessions,
        total_messages,
    })
}
