use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::db::schema::messages;

/// A persisted chat message. Also the broadcast wire frame:
/// `{"id", "username", "text", "timestamp"}`.
#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Serialize, Deserialize, ToSchema)]
#[diesel(table_name = messages)]
pub struct ChatMessage {
    pub id: i64,
    pub username: String,
    pub text: String,
    #[diesel(column_name = created_at)]
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = messages)]
pub struct NewChatMessage<'a> {
    pub username: &'a str,
    pub text: &'a str,
    pub created_at: DateTime<Utc>,
}
