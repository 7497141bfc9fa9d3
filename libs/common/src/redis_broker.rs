use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use parking_lot::Mutex;
use redis::aio::{ConnectionManager, MultiplexedConnection};
use redis::AsyncCommands;

use crate::broker::{BrokerError, MessageQueue, PubSub, Subscription};

/// Redis-backed broker.
///
/// Queues are lists (`LPUSH` to enqueue, `BRPOP` to dequeue, so FIFO).
/// Non-blocking commands share one auto-reconnecting [`ConnectionManager`].
/// `BRPOP` parks its connection server-side, so blocking pops run on
/// dedicated connections kept in a small idle pool. Each subscription opens
/// its own pub/sub connection, closed when the stream is dropped.
pub struct RedisBroker {
    client: redis::Client,
    conn: ConnectionManager,
    blocking: Mutex<Vec<MultiplexedConnection>>,
}

impl RedisBroker {
    /// Connect to Redis and verify the server answers.
    pub async fn connect(redis_url: &str) -> Result<Self, BrokerError> {
        let client = redis::Client::open(redis_url)?;
        let mut conn = ConnectionManager::new(client.clone()).await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;

        tracing::info!("redis connection established");

        Ok(Self {
            client,
            conn,
            blocking: Mutex::new(Vec::new()),
        })
    }

    async fn checkout_blocking(&self) -> Result<MultiplexedConnection, BrokerError> {
        let idle = self.blocking.lock().pop();
        match idle {
            Some(conn) => Ok(conn),
            None => Ok(self.client.get_multiplexed_async_connection().await?),
        }
    }
}

#[async_trait]
impl MessageQueue for RedisBroker {
    async fn enqueue(&self, queue: &str, payload: &str) -> Result<(), BrokerError> {
        let mut conn = self.conn.clone();
        conn.lpush::<_, _, ()>(queue, payload).await.map_err(|e| {
            tracing::error!(?e, queue, "redis lpush failed");
            BrokerError::from(e)
        })
    }

    async fn dequeue(&self, queue: &str, timeout: Duration) -> Result<Option<String>, BrokerError> {
        let mut conn = self.checkout_blocking().await?;
        // BRPOP treats 0 as "block forever".
        let secs = timeout.as_secs().max(1);
        let popped: Option<(String, String)> = redis::cmd("BRPOP")
            .arg(queue)
            .arg(secs)
            .query_async(&mut conn)
            .await?;
        // Errored connections are dropped rather than returned to the pool.
        self.blocking.lock().push(conn);
        Ok(popped.map(|(_, payload)| payload))
    }

    async fn len(&self, queue: &str) -> Result<u64, BrokerError> {
        let mut conn = self.conn.clone();
        Ok(conn.llen(queue).await?)
    }
}

#[async_trait]
impl PubSub for RedisBroker {
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), BrokerError> {
        let mut conn = self.conn.clone();
        conn.publish::<_, _, ()>(channel, payload).await.map_err(|e| {
            tracing::error!(?e, channel, "redis publish failed");
            BrokerError::from(e)
        })
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription, BrokerError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(channel).await?;

        let stream = pubsub.into_on_message().filter_map(|msg| async move {
            match msg.get_payload::<String>() {
                Ok(payload) => Some(payload),
                Err(e) => {
                    tracing::warn!(?e, channel = msg.get_channel_name(), "undecodable pubsub payload");
                    None
                }
            }
        });

        Ok(stream.boxed())
    }
}

/// These need a live Redis: `cargo test -p parley-common -- --ignored`.
/// `REDIS_TEST_URL` overrides the default database 15 on localhost.
#[cfg(test)]
mod tests {
    use super::*;

    async fn broker() -> RedisBroker {
        let url = std::env::var("REDIS_TEST_URL")
            .unwrap_or_else(|_| "redis://127.0.0.1:6379/15".to_string());
        RedisBroker::connect(&url).await.expect("connect to test redis")
    }

    fn unique(name: &str) -> String {
        format!("test:{name}:{}", ulid::Ulid::new())
    }

    #[tokio::test]
    #[ignore]
    async fn queue_pops_in_push_order() {
        let broker = broker().await;
        let queue = unique("queue");

        for payload in ["a", "b", "c"] {
            broker.enqueue(&queue, payload).await.unwrap();
        }
        assert_eq!(broker.len(&queue).await.unwrap(), 3);

        let wait = Duration::from_secs(1);
        for expected in ["a", "b", "c"] {
            assert_eq!(broker.dequeue(&queue, wait).await.unwrap().as_deref(), Some(expected));
        }
        assert!(broker.dequeue(&queue, wait).await.unwrap().is_none());
    }

    #[tokio::test]
    #[ignore]
    async fn dropped_subscription_leaves_the_channel() {
        let broker = broker().await;
        let channel = unique("channel");

        let mut subscription = broker.subscribe(&channel).await.unwrap();
        broker.publish(&channel, "hello").await.unwrap();
        let received = tokio::time::timeout(Duration::from_secs(2), subscription.next())
            .await
            .unwrap();
        assert_eq!(received.as_deref(), Some("hello"));

        drop(subscription);
        let mut conn = broker.conn.clone();
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let (_, subscribers): (String, u64) = redis::cmd("PUBSUB")
                    .arg("NUMSUB")
                    .arg(&channel)
                    .query_async(&mut conn)
                    .await
                    .unwrap();
                if subscribers == 0 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("subscription was not released");
    }
}
