use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use parking_lot::Mutex;

use super::pool::DbPool;
use super::schema::messages;
use super::StoreError;
use crate::models::message::{ChatMessage, NewChatMessage};

/// Chat message persistence.
///
/// Backed by Postgres in production and an in-memory list in tests.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist a message; the store assigns its id and timestamp.
    async fn save_message(&self, username: &str, text: &str) -> Result<ChatMessage, StoreError>;

    /// The `limit` most recent messages, oldest first.
    async fn recent_messages(&self, limit: i64) -> Result<Vec<ChatMessage>, StoreError>;

    async fn message_count(&self) -> Result<i64, StoreError>;
}

// ---------------------------------------------------------------------------
// Postgres implementation
// ---------------------------------------------------------------------------

pub struct PgMessageStore {
    pool: DbPool,
}

impl PgMessageStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageStore for PgMessageStore {
    async fn save_message(&self, username: &str, text: &str) -> Result<ChatMessage, StoreError> {
        let mut conn = self.pool.get().await?;
        let message = diesel_async::RunQueryDsl::get_result(
            diesel::insert_into(messages::table)
                .values(NewChatMessage {
                    username,
                    text,
                    created_at: Utc::now(),
                })
                .returning(ChatMessage::as_returning()),
            &mut conn,
        )
        .await?;
        Ok(message)
    }

    async fn recent_messages(&self, limit: i64) -> Result<Vec<ChatMessage>, StoreError> {
        let mut conn = self.pool.get().await?;
        let mut recent: Vec<ChatMessage> = diesel_async::RunQueryDsl::load(
            messages::table
                .order(messages::id.desc())
                .limit(limit)
                .select(ChatMessage::as_select()),
            &mut conn,
        )
        .await?;
        recent.reverse();
        Ok(recent)
    }

    async fn message_count(&self) -> Result<i64, StoreError> {
        let mut conn = self.pool.get().await?;
        let count: i64 =
            diesel_async::RunQueryDsl::get_result(messages::table.count(), &mut conn).await?;
        Ok(count)
    }
}

// ---------------------------------------------------------------------------
// In-memory implementation (for tests)
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryMessageStore {
    messages: Mutex<Vec<ChatMessage>>,
}

impl MemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn save_message(&self, username: &str, text: &str) -> Result<ChatMessage, StoreError> {
        let mut messages = self.messages.lock();
        let message = ChatMessage {
            id: messages.len() as i64 + 1,
            username: username.to_string(),
            text: text.to_string(),
            timestamp: Utc::now(),
        };
        messages.push(message.clone());
        Ok(message)
    }

    async fn recent_messages(&self, limit: i64) -> Result<Vec<ChatMessage>, StoreError> {
        let messages = self.messages.lock();
        let skip = messages.len().saturating_sub(limit.max(0) as usize);
        Ok(messages[skip..].to_vec())
    }

    async fn message_count(&self) -> Result<i64, StoreError> {
        Ok(self.messages.lock().len() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_assigns_increasing_ids() {
        let store = MemoryMessageStore::new();
        let a = store.save_message("alice", "one").await.unwrap();
        let b = store.save_message("bob", "two").await.unwrap();
        assert_eq!(a.id, 1);
        assert_eq!(b.id, 2);
        assert_eq!(store.message_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn recent_messages_are_oldest_first() {
        let store = MemoryMessageStore::new();
        for text in ["one", "two", "three"] {
            store.save_message("alice", text).await.unwrap();
        }

        let recent = store.recent_messages(2).await.unwrap();
        let texts: Vec<&str> = recent.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, ["two", "three"]);

        assert_eq!(store.recent_messages(10).await.unwrap().len(), 3);
    }
}
