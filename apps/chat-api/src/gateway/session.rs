//! Per-connection session state and its bounded outbound buffer.

use std::sync::Arc;

use axum::extract::ws::Utf8Bytes;
use parking_lot::Mutex;
use parley_common::id::{prefix, PrefixedId};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;

/// A serialized frame waiting to be written to the client.
pub type Payload = Utf8Bytes;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PushError {
    #[error("outbound buffer full")]
    Full,
    #[error("outbound buffer closed")]
    Closed,
}

/// Bounded FIFO between payload producers (hub broadcast, subscription
/// bridge) and the session's transmit task.
///
/// Pushes never block: a full buffer is reported to the caller, which
/// disconnects the session. Closing drops the only sender, so the transmit
/// task drains what is already queued and then sees the end of the stream.
pub struct OutboundBuffer {
    sender: Mutex<Option<mpsc::Sender<Payload>>>,
}

impl OutboundBuffer {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Payload>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let buffer = Self {
            sender: Mutex::new(Some(sender)),
        };
        (buffer, receiver)
    }

    pub fn push(&self, payload: Payload) -> Result<(), PushError> {
        let sender = self.sender.lock();
        let sender = sender.as_ref().ok_or(PushError::Closed)?;
        sender.try_send(payload).map_err(|e| match e {
            TrySendError::Full(_) => PushError::Full,
            TrySendError::Closed(_) => PushError::Closed,
        })
    }

    /// Returns `true` only for the call that actually closed the buffer.
    pub fn close(&self) -> bool {
        self.sender.lock().take().is_some()
    }
}

/// One live, authenticated websocket connection.
pub struct Session {
    /// Unique per connection (`ses_` prefixed ULID). The same subject may
    /// hold several sessions at once.
    pub id: String,
    /// Authenticated username.
    pub subject: String,
    outbound: OutboundBuffer,
    /// Fires on teardown; observed by the receive task and the bridge.
    shutdown: CancellationToken,
}

impl PrefixedId for Session {
    const PREFIX: &'static str = prefix::SESSION;
}

impl Session {
    pub fn new(subject: impl Into<String>, capacity: usize) -> (Arc<Self>, mpsc::Receiver<Payload>) {
        let (outbound, receiver) = OutboundBuffer::new(capacity);
        let session = Self {
            id: Self::generate(),
            subject: subject.into(),
            outbound,
            shutdown: CancellationToken::new(),
        };
        (Arc::new(session), receiver)
    }

    /// Non-blocking enqueue onto the outbound buffer.
    pub fn push(&self, payload: Payload) -> Result<(), PushError> {
        self.outbound.push(payload)
    }

    /// Close the outbound buffer and cancel everything scoped to this
    /// session. Idempotent; returns `true` the first time.
    pub fn close(&self) -> bool {
        self.shutdown.cancel();
        self.outbound.close()
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Resolves once the session has been closed.
    pub async fn closed(&self) {
        self.shutdown.cancelled().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_per_connection() {
        let (a, _rx_a) = Session::new("alice", 4);
        let (b, _rx_b) = Session::new("alice", 4);
        assert!(a.id.starts_with("ses_"));
        assert_ne!(a.id, b.id);
        assert_eq!(a.subject, b.subject);
    }

    #[tokio::test]
    async fn push_is_fifo_and_bounded() {
        let (session, mut rx) = Session::new("alice", 3);
        for i in 0..3 {
            session.push(Payload::from(format!("m{i}"))).unwrap();
        }
        assert_eq!(session.push(Payload::from("overflow")), Err(PushError::Full));

        for i in 0..3 {
            assert_eq!(rx.recv().await.unwrap().as_str(), format!("m{i}"));
        }
        // Room again once drained.
        session.push(Payload::from("m3")).unwrap();
    }

    #[tokio::test]
    async fn close_drains_then_ends() {
        let (session, mut rx) = Session::new("alice", 4);
        session.push(Payload::from("queued")).unwrap();

        assert!(session.close());
        assert!(!session.close(), "second close is a no-op");
        assert!(session.is_closed());
        assert_eq!(session.push(Payload::from("late")), Err(PushError::Closed));

        assert_eq!(rx.recv().await.unwrap().as_str(), "queued");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn closed_resolves_after_close() {
        let (session, _rx) = Session::new("alice", 1);
        let waiter = {
            let session = session.clone();
            tokio::spawn(async move { session.closed().await })
        };
        session.close();
        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
