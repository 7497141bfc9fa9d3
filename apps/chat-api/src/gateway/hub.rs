//! Connection hub: the single owner of the live-session registry.
//!
//! All registry mutation happens inside one spawned loop that consumes
//! [`Command`]s in arrival order, so no lock guards the registry. Other
//! components talk to it through a cloneable [`HubHandle`].
//!
//! Broadcast never blocks: each session gets a non-blocking push, and a
//! session whose outbound buffer is full is disconnected on the spot.

use std::collections::HashMap;
use std::sync::Arc;

use parley_common::PubSub;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::bridge;
use super::session::{Payload, PushError, Session};

/// Unregister reason for a session whose outbound buffer could not take a payload.
pub const OVERFLOW: &str = "outbound buffer overflow";

#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Outbound buffer capacity for every session created through the hub.
    pub outbound_capacity: usize,
}

enum Command {
    Register(Arc<Session>),
    Unregister(String, &'static str),
    Broadcast(Payload),
    Subjects(oneshot::Sender<Vec<String>>),
    Count(oneshot::Sender<usize>),
    Contains(String, oneshot::Sender<bool>),
}

/// Cheap, cloneable handle to the hub loop.
#[derive(Clone)]
pub struct HubHandle {
    commands: mpsc::UnboundedSender<Command>,
    config: Arc<HubConfig>,
}

impl HubHandle {
    /// Create a session sized by the hub's configuration. It is not live
    /// until passed to [`register`](Self::register).
    pub fn new_session(&self, subject: &str) -> (Arc<Session>, mpsc::Receiver<Payload>) {
        Session::new(subject, self.config.outbound_capacity)
    }

    pub fn register(&self, session: Arc<Session>) {
        self.send(Command::Register(session));
    }

    pub fn outbound_capacity(&self) -> usize {
        self.config.outbound_capacity
    }

    /// Remove and close a session. Unknown or already-removed ids are ignored.
    /// `reason` is logged with the removal.
    pub fn unregister(&self, session_id: &str, reason: &'static str) {
        self.send(Command::Unregister(session_id.to_string(), reason));
    }

    pub fn broadcast(&self, payload: Payload) {
        self.send(Command::Broadcast(payload));
    }

    /// Subjects of every registered session at the time the hub answers,
    /// one entry per session.
    pub async fn subjects(&self) -> Vec<String> {
        self.query(Command::Subjects).await.unwrap_or_default()
    }

    pub async fn session_count(&self) -> usize {
        self.query(Command::Count).await.unwrap_or(0)
    }

    pub async fn contains(&self, session_id: &str) -> bool {
        let id = session_id.to_string();
        self.query(|reply| Command::Contains(id, reply))
            .await
            .unwrap_or(false)
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            tracing::debug!("hub stopped, command dropped");
        }
    }

    async fn query<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Option<T> {
        let (reply, answer) = oneshot::channel();
        self.send(command(reply));
        answer.await.ok()
    }
}

struct Entry {
    session: Arc<Session>,
    bridge: JoinHandle<()>,
}

struct Hub {
    sessions: HashMap<String, Entry>,
    pubsub: Arc<dyn PubSub>,
    /// Handed to bridges so an overflowing bridge can ask for unregistration.
    handle: HubHandle,
}

/// Start the hub loop. It runs until `shutdown` fires, then closes every
/// live session and waits for their bridges to finish.
pub fn spawn(
    config: HubConfig,
    pubsub: Arc<dyn PubSub>,
    shutdown: CancellationToken,
) -> (HubHandle, JoinHandle<()>) {
    let (commands, receiver) = mpsc::unbounded_channel();
    let handle = HubHandle {
        commands,
        config: Arc::new(config),
    };
    let hub = Hub {
        sessions: HashMap::new(),
        pubsub,
        handle: handle.clone(),
    };
    let task = tokio::spawn(hub.run(receiver, shutdown));
    (handle, task)
}

impl Hub {
    async fn run(mut self, mut receiver: mpsc::UnboundedReceiver<Command>, shutdown: CancellationToken) {
        tracing::info!("hub started");
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                Some(command) = receiver.recv() => self.apply(command),
            }
        }

        let live = self.sessions.len();
        for (_, entry) in self.sessions.drain() {
            entry.session.close();
            let _ = entry.bridge.await;
        }
        tracing::info!(closed = live, "hub stopped");
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::Register(session) => self.register(session),
            Command::Unregister(id, reason) => self.unregister(&id, reason),
            Command::Broadcast(payload) => self.broadcast(payload),
            Command::Subjects(reply) => {
                let subjects = self
                    .sessions
                    .values()
                    .map(|entry| entry.session.subject.clone())
                    .collect();
                let _ = reply.send(subjects);
            }
            Command::Count(reply) => {
                let _ = reply.send(self.sessions.len());
            }
            Command::Contains(id, reply) => {
                let _ = reply.send(self.sessions.contains_key(&id));
            }
        }
    }

    fn register(&mut self, session: Arc<Session>) {
        // A session torn down before its register arrived stays dead.
        if session.is_closed() {
            tracing::debug!(session_id = %session.id, "ignoring register for closed session");
            return;
        }
        if self.sessions.contains_key(&session.id) {
            return;
        }

        let bridge = bridge::spawn(session.clone(), self.pubsub.clone(), self.handle.clone());
        tracing::info!(
            session_id = %session.id,
            subject = %session.subject,
            sessions = self.sessions.len() + 1,
            "session registered"
        );
        self.sessions.insert(session.id.clone(), Entry { session, bridge });
    }

    fn unregister(&mut self, session_id: &str, reason: &'static str) {
        let Some(entry) = self.sessions.remove(session_id) else {
            return;
        };
        // Closing ends the transmit task after it drains and cancels the bridge.
        entry.session.close();
        tracing::info!(
            session_id = %entry.session.id,
            subject = %entry.session.subject,
            sessions = self.sessions.len(),
            reason,
            "session unregistered"
        );
    }

    fn broadcast(&mut self, payload: Payload) {
        let mut overflowed = Vec::new();
        for (id, entry) in &self.sessions {
            match entry.session.push(payload.clone()) {
                Ok(()) => {}
                Err(PushError::Full) => {
                    tracing::warn!(session_id = %id, "outbound buffer full, disconnecting slow session");
                    overflowed.push(id.clone());
                }
                Err(PushError::Closed) => overflowed.push(id.clone()),
            }
        }
        for id in overflowed {
            self.unregister(&id, OVERFLOW);
        }
    }
}
