use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::stream::{self, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{broadcast, Notify};
use tokio::time::Instant;

use crate::broker::{BrokerError, MessageQueue, PubSub, Subscription};

/// Per-channel fan-out capacity. Subscribers that fall further behind skip
/// the oldest payloads.
const CHANNEL_CAPACITY: usize = 1024;

#[derive(Default)]
struct Queue {
    items: Mutex<VecDeque<String>>,
    ready: Notify,
}

// ---------------------------------------------------------------------------
// In-memory implementation (for tests)
// ---------------------------------------------------------------------------

/// In-process queue and pub/sub broker with the same semantics as
/// [`RedisBroker`](crate::RedisBroker).
#[derive(Default)]
pub struct MemoryBroker {
    queues: Mutex<HashMap<String, Arc<Queue>>>,
    channels: DashMap<String, broadcast::Sender<String>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn queue(&self, name: &str) -> Arc<Queue> {
        self.queues
            .lock()
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    /// Number of channels currently tracked.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Number of live subscriptions on `channel`.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .get(channel)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }
}

#[async_trait]
impl MessageQueue for MemoryBroker {
    async fn enqueue(&self, queue: &str, payload: &str) -> Result<(), BrokerError> {
        let queue = self.queue(queue);
        queue.items.lock().push_back(payload.to_string());
        queue.ready.notify_one();
        Ok(())
    }

    async fn dequeue(&self, queue: &str, timeout: Duration) -> Result<Option<String>, BrokerError> {
        let queue = self.queue(queue);
        let deadline = Instant::now() + timeout;
        loop {
            // Arm the waiter before checking so a concurrent push is not missed.
            let ready = queue.ready.notified();
            if let Some(item) = queue.items.lock().pop_front() {
                return Ok(Some(item));
            }
            if tokio::time::timeout_at(deadline, ready).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn len(&self, queue: &str) -> Result<u64, BrokerError> {
        Ok(self.queue(queue).items.lock().len() as u64)
    }
}

#[async_trait]
impl PubSub for MemoryBroker {
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), BrokerError> {
        // No receivers is not an error, same as PUBLISH returning 0.
        let delivered = match self.channels.get(channel) {
            Some(sender) => sender.send(payload.to_string()).is_ok(),
            None => return Ok(()),
        };
        if !delivered {
            self.channels
                .remove_if(channel, |_, sender| sender.receiver_count() == 0);
        }
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription, BrokerError> {
        self.channels.retain(|_, sender| sender.receiver_count() > 0);
        let receiver = self
            .channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe();

        let stream = stream::unfold(receiver, |mut receiver| async move {
            loop {
                match receiver.recv().await {
                    Ok(payload) => return Some((payload, receiver)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "memory subscription lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });

        Ok(stream.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn queue_is_fifo() {
        let broker = MemoryBroker::new();
        broker.enqueue("q", "a").await.unwrap();
        broker.enqueue("q", "b").await.unwrap();
        assert_eq!(broker.len("q").await.unwrap(), 2);

        let wait = Duration::from_millis(10);
        assert_eq!(broker.dequeue("q", wait).await.unwrap().as_deref(), Some("a"));
        assert_eq!(broker.dequeue("q", wait).await.unwrap().as_deref(), Some("b"));
        assert_eq!(broker.len("q").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn dequeue_times_out_empty() {
        let broker = MemoryBroker::new();
        let started = std::time::Instant::now();
        let popped = broker.dequeue("q", Duration::from_millis(50)).await.unwrap();
        assert!(popped.is_none());
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn dequeue_wakes_on_enqueue() {
        let broker = Arc::new(MemoryBroker::new());
        let waiter = {
            let broker = broker.clone();
            tokio::spawn(async move { broker.dequeue("q", Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        broker.enqueue("q", "late").await.unwrap();

        let popped = waiter.await.unwrap().unwrap();
        assert_eq!(popped.as_deref(), Some("late"));
    }

    #[tokio::test]
    async fn publish_reaches_subscribers_of_that_channel_only() {
        let broker = MemoryBroker::new();
        let mut alice = broker.subscribe("user:alice:notifications").await.unwrap();
        let mut bob = broker.subscribe("user:bob:notifications").await.unwrap();
        assert_eq!(broker.subscriber_count("user:alice:notifications"), 1);

        broker.publish("user:alice:notifications", "hello").await.unwrap();
        assert_eq!(alice.next().await.as_deref(), Some("hello"));

        let nothing = tokio::time::timeout(Duration::from_millis(20), bob.next()).await;
        assert!(nothing.is_err());
    }

    #[tokio::test]
    async fn dropping_subscription_releases_it() {
        let broker = MemoryBroker::new();
        let sub = broker.subscribe("c").await.unwrap();
        assert_eq!(broker.subscriber_count("c"), 1);
        drop(sub);
        assert_eq!(broker.subscriber_count("c"), 0);
        broker.publish("c", "nobody listening").await.unwrap();
    }

    #[tokio::test]
    async fn abandoned_channels_are_pruned() {
        let broker = MemoryBroker::new();
        for user in ["alice", "bob", "carol"] {
            drop(broker.subscribe(&format!("user:{user}:notifications")).await.unwrap());
        }
        // Each subscribe sweeps the channels abandoned before it.
        assert_eq!(broker.channel_count(), 1);

        broker.publish("user:carol:notifications", "gone").await.unwrap();
        assert_eq!(broker.channel_count(), 0);

        let _live = broker.subscribe("user:dave:notifications").await.unwrap();
        broker.publish("user:dave:notifications", "kept").await.unwrap();
        assert_eq!(broker.channel_count(), 1);
    }
}
