use async_trait::async_trait;
use diesel::prelude::*;
use parking_lot::Mutex;
use parley_common::{Notification, NotificationRequest};

use super::pool::DbPool;
use super::schema::notifications;
use super::StoreError;
use crate::models::notification::NotificationRow;

/// Durable notification storage.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Persist a validated request as a new unread notification.
    async fn create_notification(&self, request: &NotificationRequest) -> Result<Notification, StoreError>;

    /// A user's notifications, newest first.
    async fn list_for_user(&self, user_id: &str, limit: i64) -> Result<Vec<Notification>, StoreError>;

    /// Mark the given notifications read. Ids belonging to other users are
    /// ignored. Returns how many rows changed.
    async fn mark_read(&self, user_id: &str, ids: &[String]) -> Result<usize, StoreError>;

    async fn unread_count(&self, user_id: &str) -> Result<i64, StoreError>;
}

// ---------------------------------------------------------------------------
// Postgres implementation
// ---------------------------------------------------------------------------

pub struct PgNotificationStore {
    pool: DbPool,
}

impl PgNotificationStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationStore for PgNotificationStore {
    async fn create_notification(&self, request: &NotificationRequest) -> Result<Notification, StoreError> {
        let notification = Notification::from_request(request);
        let mut conn = self.pool.get().await?;
        diesel_async::RunQueryDsl::execute(
            diesel::insert_into(notifications::table).values(NotificationRow::from(&notification)),
            &mut conn,
        )
        .await?;
        Ok(notification)
    }

    async fn list_for_user(&self, user_id: &str, limit: i64) -> Result<Vec<Notification>, StoreError> {
        let mut conn = self.pool.get().await?;
        let rows: Vec<NotificationRow> = diesel_async::RunQueryDsl::load(
            notifications::table
                .filter(notifications::user_id.eq(user_id))
                .order(notifications::created_at.desc())
                .limit(limit)
                .select(NotificationRow::as_select()),
            &mut conn,
        )
        .await?;
        Ok(rows.into_iter().map(Notification::from).collect())
    }

    async fn mark_read(&self, user_id: &str, ids: &[String]) -> Result<usize, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut conn = self.pool.get().await?;
        let updated = diesel_async::RunQueryDsl::execute(
            diesel::update(
                notifications::table
                    .filter(notifications::user_id.eq(user_id))
                    .filter(notifications::id.eq_any(ids)),
            )
            .set(notifications::is_read.eq(true)),
            &mut conn,
        )
        .await?;
        Ok(updated)
    }

    async fn unread_count(&self, user_id: &str) -> Result<i64, StoreError> {
        let mut conn = self.pool.get().await?;
        let count: i64 = diesel_async::RunQueryDsl::get_result(
            notifications::table
                .filter(notifications::user_id.eq(user_id))
                .filter(notifications::is_read.eq(false))
                .count(),
            &mut conn,
        )
        .await?;
        Ok(count)
    }
}

// ---------------------------------------------------------------------------
// In-memory implementation (for tests)
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryNotificationStore {
    notifications: Mutex<Vec<Notification>>,
}

impl MemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored notification, in insertion order.
    pub fn all(&self) -> Vec<Notification> {
        self.notifications.lock().clone()
    }
}

#[async_trait]
impl NotificationStore for MemoryNotificationStore {
    async fn create_notification(&self, request: &NotificationRequest) -> Result<Notification, StoreError> {
        let notification = Notification::from_request(request);
        self.notifications.lock().push(notification.clone());
        Ok(notification)
    }

    async fn list_for_user(&self, user_id: &str, limit: i64) -> Result<Vec<Notification>, StoreError> {
        let notifications = self.notifications.lock();
        Ok(notifications
            .iter()
            .rev()
            .filter(|n| n.user_id == user_id)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn mark_read(&self, user_id: &str, ids: &[String]) -> Result<usize, StoreError> {
        let mut notifications = self.notifications.lock();
        let mut updated = 0;
        for n in notifications
            .iter_mut()
            .filter(|n| n.user_id == user_id && ids.contains(&n.id))
        {
            n.is_read = true;
            updated += 1;
        }
        Ok(updated)
    }

    async fn unread_count(&self, user_id: &str) -> Result<i64, StoreError> {
        let notifications = self.notifications.lock();
        Ok(notifications
            .iter()
            .filter(|n| n.user_id == user_id && !n.is_read)
            .count() as i64)
    }
}
