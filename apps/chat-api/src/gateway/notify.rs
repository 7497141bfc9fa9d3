//! Notification fan-out for new chat messages.
//!
//! Every other subject connected when a message is posted gets one
//! [`NotificationRequest`] on the durable queue. Delivery is best-effort:
//! failures are logged and dropped, and nothing here ever delays the chat
//! path.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use parley_common::notification::{NotificationRequest, QUEUE_NAME};
use parley_common::{BrokerError, MessageQueue, ValidationError};

use super::hub::HubHandle;

/// Maximum characters of message text carried in a notification body.
pub const BODY_PREVIEW_CHARS: usize = 100;

const ELLIPSIS: &str = "...";

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("invalid notification: {0}")]
    Invalid(#[from] ValidationError),
    #[error("failed to encode notification: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("enqueue timed out after {0:?}")]
    Timeout(Duration),
    #[error("enqueue failed: {0}")]
    Queue(#[from] BrokerError),
}

pub struct Notifier {
    queue: Arc<dyn MessageQueue>,
    hub: HubHandle,
    enqueue_timeout: Duration,
}

impl Notifier {
    pub fn new(queue: Arc<dyn MessageQueue>, hub: HubHandle, enqueue_timeout: Duration) -> Self {
        Self {
            queue,
            hub,
            enqueue_timeout,
        }
    }

    /// Fire-and-forget variant of [`notify_others`](Self::notify_others).
    pub fn notify_others_detached(self: &Arc<Self>, author: &str, text: &str) {
        let notifier = self.clone();
        let author = author.to_string();
        let text = text.to_string();
        tokio::spawn(async move {
            notifier.notify_others(&author, &text).await;
        });
    }

    /// Enqueue a notification for every connected subject except `author`.
    ///
    /// Recipients come from a registry snapshot taken now. Returns how many
    /// requests were enqueued.
    pub async fn notify_others(&self, author: &str, text: &str) -> usize {
        let recipients: BTreeSet<String> = self
            .hub
            .subjects()
            .await
            .into_iter()
            .filter(|subject| subject != author)
            .collect();
        if recipients.is_empty() {
            return 0;
        }

        let title = format!("New message from {author}");
        let body = truncate_with_ellipsis(text, BODY_PREVIEW_CHARS);

        let sends = recipients.iter().map(|recipient| {
            let request = NotificationRequest::new(recipient.as_str(), title.as_str(), body.as_str());
            async move {
                let result = self.send(request).await;
                if let Err(e) = &result {
                    tracing::warn!(recipient = %recipient, error = %e, "failed to enqueue notification");
                }
                result.is_ok()
            }
        });
        let sent = join_all(sends).await.into_iter().filter(|ok| *ok).count();

        tracing::debug!(author, recipients = recipients.len(), sent, "notification fan-out finished");
        sent
    }

    /// Validate and enqueue a single request, bounded by the enqueue timeout.
    pub async fn send(&self, mut request: NotificationRequest) -> Result<(), NotifyError> {
        request.validate()?;
        let payload = serde_json::to_string(&request)?;
        tokio::time::timeout(self.enqueue_timeout, self.queue.enqueue(QUEUE_NAME, &payload))
            .await
            .map_err(|_| NotifyError::Timeout(self.enqueue_timeout))??;
        Ok(())
    }
}

/// Cut `text` to at most `max_chars` characters, replacing the tail with
/// `...` when anything was removed.
pub fn truncate_with_ellipsis(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(ELLIPSIS.len());
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(ELLIPSIS);
    out
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use parley_common::MemoryBroker;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use super::super::hub::{self, HubConfig};
    use super::super::session::Payload;
    use super::*;

    #[test]
    fn short_text_is_untouched() {
        assert_eq!(truncate_with_ellipsis("hi", 100), "hi");
        let exact = "x".repeat(100);
        assert_eq!(truncate_with_ellipsis(&exact, 100), exact);
    }

    #[test]
    fn long_text_keeps_97_chars_plus_ellipsis() {
        let text: String = ('a'..='z').cycle().take(150).collect();
        let body = truncate_with_ellipsis(&text, BODY_PREVIEW_CHARS);
        assert_eq!(body.chars().count(), 100);
        assert!(body.ends_with("..."));
        assert_eq!(&body[..97], &text[..97]);
    }

    #[test]
    fn truncation_counts_characters_not_bytes() {
        let text = "é".repeat(120);
        let body = truncate_with_ellipsis(&text, BODY_PREVIEW_CHARS);
        assert_eq!(body.chars().count(), 100);
        assert!(body.starts_with(&"é".repeat(97)));
    }

    async fn hub_with(subjects: &[&str]) -> (HubHandle, Vec<mpsc::Receiver<Payload>>) {
        let (hub, _task) = hub::spawn(
            HubConfig {
                outbound_capacity: 8,
            },
            Arc::new(MemoryBroker::new()),
            CancellationToken::new(),
        );
        let mut receivers = Vec::new();
        for subject in subjects {
            let (session, rx) = hub.new_session(subject);
            hub.register(session);
            receivers.push(rx);
        }
        assert_eq!(hub.session_count().await, subjects.len());
        (hub, receivers)
    }

    async fn drain(broker: &MemoryBroker) -> Vec<NotificationRequest> {
        let mut requests = Vec::new();
        while let Some(raw) = broker
            .dequeue(QUEUE_NAME, Duration::from_millis(10))
            .await
            .unwrap()
        {
            requests.push(serde_json::from_str(&raw).unwrap());
        }
        requests
    }

    #[tokio::test]
    async fn fan_out_skips_author_and_dedupes_subjects() {
        let (hub, _rx) = hub_with(&["alice", "bob", "bob", "carol"]).await;
        let broker = Arc::new(MemoryBroker::new());
        let notifier = Notifier::new(broker.clone(), hub, Duration::from_secs(5));

        assert_eq!(notifier.notify_others("alice", "hello there").await, 2);

        let mut requests = drain(&broker).await;
        requests.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        let recipients: Vec<&str> = requests.iter().map(|r| r.user_id.as_str()).collect();
        assert_eq!(recipients, ["bob", "carol"]);
        for request in &requests {
            assert_eq!(request.title, "New message from alice");
            assert_eq!(request.message, "hello there");
            assert_eq!(request.kind, "message");
        }
    }

    #[tokio::test]
    async fn lone_author_sends_nothing() {
        let (hub, _rx) = hub_with(&["alice"]).await;
        let broker = Arc::new(MemoryBroker::new());
        let notifier = Notifier::new(broker.clone(), hub, Duration::from_secs(5));

        assert_eq!(notifier.notify_others("alice", "anyone?").await, 0);
        assert_eq!(broker.len(QUEUE_NAME).await.unwrap(), 0);
    }

    struct StalledQueue;

    #[async_trait]
    impl MessageQueue for StalledQueue {
        async fn enqueue(&self, _queue: &str, _payload: &str) -> Result<(), BrokerError> {
            std::future::pending().await
        }

        async fn dequeue(&self, _queue: &str, _timeout: Duration) -> Result<Option<String>, BrokerError> {
            Ok(None)
        }

        async fn len(&self, _queue: &str) -> Result<u64, BrokerError> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn stalled_queue_times_out_and_is_dropped() {
        let (hub, _rx) = hub_with(&["alice", "bob"]).await;
        let notifier = Notifier::new(Arc::new(StalledQueue), hub, Duration::from_millis(50));

        let err = notifier
            .send(NotificationRequest::new("bob", "t", "m"))
            .await
            .unwrap_err();
        assert!(matches!(err, NotifyError::Timeout(_)));

        let sent = tokio::time::timeout(Duration::from_secs(2), notifier.notify_others("alice", "hi"))
            .await
            .expect("fan-out must be bounded by the enqueue timeout");
        assert_eq!(sent, 0);
    }

    #[tokio::test]
    async fn invalid_request_never_reaches_queue() {
        let (hub, _rx) = hub_with(&[]).await;
        let broker = Arc::new(MemoryBroker::new());
        let notifier = Notifier::new(broker.clone(), hub, Duration::from_secs(5));

        let err = notifier
            .send(NotificationRequest::new("bob", "", "m"))
            .await
            .unwrap_err();
        assert!(matches!(err, NotifyError::Invalid(ValidationError::MissingField("title"))));
        assert_eq!(broker.len(QUEUE_NAME).await.unwrap(), 0);
    }
}
