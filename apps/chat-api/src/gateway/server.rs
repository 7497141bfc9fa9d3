//! WebSocket upgrade handler and per-connection event loop.

use std::sync::Arc;

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use utoipa::IntoParams;

use super::chat;
use super::hub::HubHandle;
use super::session::{Payload, Session};
use crate::error::ApiError;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/ws", get(ws_upgrade))
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ConnectParams {
    /// Bearer token issued by the auth service.
    pub token: Option<String>,
}

/// Authenticate and upgrade to a chat websocket.
///
/// The token is checked before the upgrade so a bad token gets a plain
/// 401 instead of a socket.
#[utoipa::path(
    get,
    path = "/ws",
    tag = "Chat",
    params(ConnectParams),
    responses(
        (status = 101, description = "Switching to the chat websocket"),
        (status = 401, description = "Missing or invalid token", body = crate::error::ApiErrorBody),
    ),
)]
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(params): Query<ConnectParams>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let token = match params.token.as_deref() {
        Some(token) if !token.is_empty() => token,
        _ => return ApiError::unauthorized("Token required").into_response(),
    };

    let subject = match state.auth.validate_token(token).await {
        Ok(subject) => subject,
        Err(e) => {
            tracing::debug!(error = %e, "rejected websocket token");
            return ApiError::unauthorized("Invalid token").into_response();
        }
    };

    match ws {
        Ok(ws) => ws
            .on_upgrade(move |socket| handle_connection(socket, state, subject))
            .into_response(),
        Err(rejection) => rejection.into_response(),
    }
}

async fn handle_connection(socket: WebSocket, state: AppState, subject: String) {
    let (session, outbound) = state.hub.new_session(&subject);
    let (ws_tx, ws_rx) = socket.split();
    let transmit = tokio::spawn(transmit(session.clone(), outbound, ws_tx, state.hub.clone()));

    replay_history(&state, &session).await;
    state.hub.register(session.clone());

    tracing::info!(session_id = %session.id, %subject, "chat session established");

    receive(&state, &session, ws_rx).await;

    state.hub.unregister(&session.id, "disconnected");
    let _ = transmit.await;

    tracing::info!(session_id = %session.id, %subject, "chat session ended");
}

/// Queue the most recent messages ahead of any live traffic.
///
/// Replay takes at most half the outbound buffer so the session joins the
/// hub with room left for live broadcasts.
async fn replay_history(state: &AppState, session: &Session) {
    let limit = replay_limit(state.config.history_limit, state.hub.outbound_capacity());
    if limit == 0 {
        return;
    }
    let history = match state.messages.recent_messages(limit).await {
        Ok(history) => history,
        Err(e) => {
            tracing::warn!(session_id = %session.id, error = %e, "failed to load message history");
            return;
        }
    };

    for message in history {
        let frame = match serde_json::to_string(&message) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, message_id = message.id, "failed to encode history frame");
                continue;
            }
        };
        // Not registered yet, so nothing else is queued; stop once full.
        if session.push(Payload::from(frame)).is_err() {
            break;
        }
    }
}

fn replay_limit(history_limit: i64, outbound_capacity: usize) -> i64 {
    let headroom = i64::try_from(outbound_capacity / 2).unwrap_or(i64::MAX);
    history_limit.clamp(0, headroom)
}

/// Drain the outbound buffer to the socket. Ends when the buffer is closed
/// and empty, or when a write fails.
async fn transmit(
    session: Arc<Session>,
    mut outbound: mpsc::Receiver<Payload>,
    mut ws_tx: SplitSink<WebSocket, Message>,
    hub: HubHandle,
) {
    while let Some(payload) = outbound.recv().await {
        if let Err(e) = ws_tx.send(Message::Text(payload)).await {
            tracing::debug!(session_id = %session.id, error = %e, "ws write error");
            // Closing first keeps a register that has not landed yet from
            // reviving the session.
            session.close();
            hub.unregister(&session.id, "write failed");
            return;
        }
    }
    let _ = ws_tx.send(Message::Close(None)).await;
}

/// Read client frames until the client leaves or the session is closed.
async fn receive(state: &AppState, session: &Session, mut ws_rx: SplitStream<WebSocket>) {
    loop {
        let frame = tokio::select! {
            biased;
            _ = session.closed() => break,
            frame = ws_rx.next() => frame,
        };

        match frame {
            Some(Ok(Message::Text(text))) => {
                let fields: serde_json::Map<String, serde_json::Value> =
                    match serde_json::from_str(text.as_str()) {
                        Ok(fields) => fields,
                        Err(e) => {
                            tracing::debug!(session_id = %session.id, error = %e, "undecodable client frame");
                            break;
                        }
                    };

                let Some(text) = fields.get("text").and_then(|v| v.as_str()) else {
                    continue;
                };
                if text.is_empty() {
                    continue;
                }

                if let Err(e) = chat::post_message(state, &session.subject, text).await {
                    tracing::error!(session_id = %session.id, error = %e, "failed to save message");
                }
            }
            Some(Ok(Message::Close(_))) | None => break,
            Some(Err(e)) => {
                tracing::debug!(session_id = %session.id, error = %e, "ws read error");
                break;
            }
            Some(Ok(_)) => continue,
        }
    }
}
