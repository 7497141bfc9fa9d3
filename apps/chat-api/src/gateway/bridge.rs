//! Subscription bridge: relays a subject's notification channel into one
//! session's outbound buffer.
//!
//! Each registered session owns exactly one bridge. The bridge lives until
//! the session closes; a dropped subscription is re-established after
//! [`RESUBSCRIBE_DELAY`].

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use parley_common::notification::notification_channel;
use parley_common::PubSub;
use tokio::task::JoinHandle;

use super::hub::{HubHandle, OVERFLOW};
use super::session::{Payload, PushError, Session};

pub const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(1);

pub fn spawn(session: Arc<Session>, pubsub: Arc<dyn PubSub>, hub: HubHandle) -> JoinHandle<()> {
    tokio::spawn(run(session, pubsub, hub))
}

async fn run(session: Arc<Session>, pubsub: Arc<dyn PubSub>, hub: HubHandle) {
    let channel = notification_channel(&session.subject);

    loop {
        let subscribed = tokio::select! {
            biased;
            _ = session.closed() => return,
            result = pubsub.subscribe(&channel) => result,
        };

        match subscribed {
            Ok(mut subscription) => {
                tracing::debug!(session_id = %session.id, %channel, "notification bridge subscribed");
                loop {
                    let payload = tokio::select! {
                        biased;
                        _ = session.closed() => return,
                        next = subscription.next() => next,
                    };
                    let Some(payload) = payload else {
                        break;
                    };

                    match session.push(Payload::from(payload)) {
                        Ok(()) => {}
                        Err(PushError::Full) => {
                            tracing::warn!(
                                session_id = %session.id,
                                "outbound buffer full on notification, disconnecting"
                            );
                            hub.unregister(&session.id, OVERFLOW);
                            return;
                        }
                        Err(PushError::Closed) => return,
                    }
                }
                tracing::warn!(session_id = %session.id, %channel, "notification subscription ended");
            }
            Err(e) => {
                tracing::warn!(session_id = %session.id, %channel, error = %e, "notification subscribe failed");
            }
        }

        tokio::select! {
            biased;
            _ = session.closed() => return,
            _ = tokio::time::sleep(RESUBSCRIBE_DELAY) => {}
        }
    }
}
