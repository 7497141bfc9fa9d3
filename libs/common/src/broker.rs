//! Broker abstraction: a durable FIFO queue plus publish/subscribe channels.
//!
//! Backed by Redis in production and an in-process broker in tests.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::BoxStream;

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("broker closed")]
    Closed,
}

/// Stream of payloads delivered on one subscribed channel.
///
/// Dropping the stream releases the subscription.
pub type Subscription = BoxStream<'static, String>;

#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Append a payload to the tail of `queue`.
    async fn enqueue(&self, queue: &str, payload: &str) -> Result<(), BrokerError>;

    /// Pop the head of `queue`, waiting at most `timeout`.
    ///
    /// Returns `Ok(None)` when the wait expires with nothing to pop.
    async fn dequeue(&self, queue: &str, timeout: Duration) -> Result<Option<String>, BrokerError>;

    async fn len(&self, queue: &str) -> Result<u64, BrokerError>;
}

#[async_trait]
pub trait PubSub: Send + Sync {
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), BrokerError>;

    async fn subscribe(&self, channel: &str) -> Result<Subscription, BrokerError>;
}
