//! Notification data model shared by the chat service and the worker pool.
//!
//! A [`NotificationRequest`] is the ephemeral queue form pushed by producers.
//! A [`Notification`] is the durable form written by the worker pool and
//! pushed to clients wrapped in a [`PushFrame`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{prefix, PrefixedId};

/// Durable queue the worker pool consumes.
pub const QUEUE_NAME: &str = "notifications";

pub const TYPE_MESSAGE: &str = "message";
pub const TYPE_MENTION: &str = "mention";
pub const TYPE_DIRECT_MESSAGE: &str = "direct_message";

/// Pub/sub channel carrying pushes for one recipient.
pub fn notification_channel(subject: &str) -> String {
    format!("user:{subject}:notifications")
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    MissingField(&'static str),
}

/// Queue payload asking for a notification to be stored and delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRequest {
    pub user_id: String,
    pub title: String,
    pub message: String,
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
}

impl NotificationRequest {
    pub fn new(
        user_id: impl Into<String>,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            title: title.into(),
            message: message.into(),
            kind: TYPE_MESSAGE.to_string(),
        }
    }

    /// Reject requests with an empty recipient, title or body.
    /// An empty type tag is filled with [`TYPE_MESSAGE`].
    pub fn validate(&mut self) -> Result<(), ValidationError> {
        if self.user_id.is_empty() {
            return Err(ValidationError::MissingField("user_id"));
        }
        if self.title.is_empty() {
            return Err(ValidationError::MissingField("title"));
        }
        if self.message.is_empty() {
            return Err(ValidationError::MissingField("message"));
        }
        if self.kind.is_empty() {
            self.kind = TYPE_MESSAGE.to_string();
        }
        Ok(())
    }
}

/// A persisted notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl PrefixedId for Notification {
    const PREFIX: &'static str = prefix::NOTIFICATION;
}

impl Notification {
    /// Build the unread, freshly-identified record for a validated request.
    pub fn from_request(request: &NotificationRequest) -> Self {
        Self {
            id: Self::generate(),
            user_id: request.user_id.clone(),
            title: request.title.clone(),
            message: request.message.clone(),
            kind: request.kind.clone(),
            is_read: false,
            created_at: Utc::now(),
        }
    }
}

/// Frame pushed to a client over its live connection.
///
/// Serializes as `{"type": "notification", "data": {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum PushFrame {
    Notification(Notification),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_name_is_scoped_to_subject() {
        assert_eq!(notification_channel("bob"), "user:bob:notifications");
    }

    #[test]
    fn validate_rejects_missing_fields() {
        let mut req = NotificationRequest::new("", "t", "m");
        assert_eq!(req.validate(), Err(ValidationError::MissingField("user_id")));

        let mut req = NotificationRequest::new("bob", "", "m");
        assert_eq!(req.validate(), Err(ValidationError::MissingField("title")));

        let mut req = NotificationRequest::new("bob", "t", "");
        assert_eq!(req.validate(), Err(ValidationError::MissingField("message")));
    }

    #[test]
    fn validate_defaults_type() {
        let mut req: NotificationRequest =
            serde_json::from_str(r#"{"user_id":"B","title":"t","message":"m"}"#).unwrap();
        assert!(req.kind.is_empty());
        req.validate().unwrap();
        assert_eq!(req.kind, TYPE_MESSAGE);
    }

    #[test]
    fn push_frame_wire_shape() {
        let mut req = NotificationRequest::new("B", "t", "m");
        req.kind = TYPE_MENTION.to_string();
        let notification = Notification::from_request(&req);
        assert!(notification.id.starts_with("ntf_"));
        assert!(!notification.is_read);

        let value = serde_json::to_value(PushFrame::Notification(notification.clone())).unwrap();
        assert_eq!(value["type"], "notification");
        assert_eq!(value["data"]["id"], notification.id.as_str());
        assert_eq!(value["data"]["user_id"], "B");
        assert_eq!(value["data"]["title"], "t");
        assert_eq!(value["data"]["message"], "m");
        assert_eq!(value["data"]["type"], "mention");
        assert_eq!(value["data"]["is_read"], false);
        assert!(value["data"]["created_at"].is_string());
    }
}
