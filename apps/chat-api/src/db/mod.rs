pub mod messages;
pub mod pool;
pub mod schema;

pub use messages::{MemoryMessageStore, MessageStore, PgMessageStore};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error("pool error: {0}")]
    Pool(#[from] diesel_async::pooled_connection::deadpool::PoolError),
}
