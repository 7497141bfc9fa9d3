pub mod health;
pub mod messages;
pub mod stats;

use axum::Router;
use utoipa::OpenApi;

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(crate::gateway::server::router())
        .merge(stats::router())
        .merge(messages::router())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        crate::gateway::server::ws_upgrade,
        stats::get_stats,
        messages::list_messages,
    ),
    components(
        schemas(
            crate::error::ApiErrorBody,
            crate::error::ApiErrorDetail,
            crate::models::message::ChatMessage,
            health::HealthResponse,
            stats::StatsResponse,
            messages::ListMessagesResponse,
        )
    ),
    tags(
        (name = "Health", description = "Health check"),
        (name = "Chat", description = "Live chat websocket"),
        (name = "Stats", description = "Service statistics"),
        (name = "Messages", description = "Message history"),
    )
)]
pub struct ApiDoc;
