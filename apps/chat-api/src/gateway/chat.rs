//! Handling of chat messages posted over a live connection.

use axum::extract::ws::Utf8Bytes;

use crate::db::StoreError;
use crate::models::message::ChatMessage;
use crate::AppState;

/// Longest message text accepted, in characters. Longer text is cut.
pub const MAX_MESSAGE_CHARS: usize = 1000;

/// Cut `text` to at most [`MAX_MESSAGE_CHARS`] characters.
pub fn clamp_message(text: &str) -> &str {
    match text.char_indices().nth(MAX_MESSAGE_CHARS) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

/// Persist a message, broadcast it to every live session (the author
/// included) and start the notification fan-out.
///
/// Nothing is broadcast or notified when the store rejects the message.
pub async fn post_message(state: &AppState, author: &str, text: &str) -> Result<ChatMessage, StoreError> {
    let text = clamp_message(text);
    let message = state.messages.save_message(author, text).await?;

    match serde_json::to_string(&message) {
        Ok(frame) => state.hub.broadcast(Utf8Bytes::from(frame)),
        Err(e) => tracing::error!(error = %e, message_id = message.id, "failed to encode chat frame"),
    }
    state.notifier.notify_others_detached(author, &message.text);

    Ok(message)
}
