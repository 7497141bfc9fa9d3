use chrono::{DateTime, Utc};
use diesel::prelude::*;
use parley_common::Notification;

use crate::db::schema::notifications;

/// Row form of a [`Notification`].
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = notifications)]
pub struct NotificationRow {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub message: String,
    pub kind: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl From<NotificationRow> for Notification {
    fn from(row: NotificationRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            title: row.title,
            message: row.message,
            kind: row.kind,
            is_read: row.is_read,
            created_at: row.created_at,
        }
    }
}

impl From<&Notification> for NotificationRow {
    fn from(notification: &Notification) -> Self {
        Self {
            id: notification.id.clone(),
            user_id: notification.user_id.clone(),
            title: notification.title.clone(),
            message: notification.message.clone(),
            kind: notification.kind.clone(),
            is_read: notification.is_read,
            created_at: notification.created_at,
        }
    }
}
