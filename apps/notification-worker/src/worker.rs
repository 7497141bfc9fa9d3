//! Notification worker pool.
//!
//! Each worker pops one request at a time from the durable queue, validates
//! it, persists it, and only then publishes it on the recipient's channel.
//! Any failing step drops that item and the worker moves on; nothing is
//! retried here.

use std::sync::Arc;
use std::time::Duration;

use parley_common::notification::{notification_channel, QUEUE_NAME};
use parley_common::{
    BrokerError, MessageQueue, Notification, NotificationRequest, PubSub, PushFrame, ValidationError,
};
use serde::Serialize;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::db::{NotificationStore, StoreError};

/// Pause after a failed pop so an unreachable broker is not hammered.
const DEQUEUE_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Why an item was dropped, by the step that failed.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("dequeue failed: {0}")]
    Dequeue(#[source] BrokerError),
    #[error("malformed request: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("invalid request: {0}")]
    Invalid(#[from] ValidationError),
    #[error("persist failed: {0}")]
    Persist(#[from] StoreError),
    #[error("failed to encode push frame: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("publish failed: {0}")]
    Publish(#[source] BrokerError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerStats {
    pub queue_size: u64,
    pub workers: usize,
}

#[derive(Clone)]
pub struct WorkerPool {
    queue: Arc<dyn MessageQueue>,
    pubsub: Arc<dyn PubSub>,
    store: Arc<dyn NotificationStore>,
    workers: usize,
    dequeue_timeout: Duration,
}

impl WorkerPool {
    pub fn new(
        queue: Arc<dyn MessageQueue>,
        pubsub: Arc<dyn PubSub>,
        store: Arc<dyn NotificationStore>,
        workers: usize,
        dequeue_timeout: Duration,
    ) -> Self {
        Self {
            queue,
            pubsub,
            store,
            workers: workers.max(1),
            dequeue_timeout,
        }
    }

    /// Run every worker until `shutdown` fires, then wait for all of them
    /// to finish their current item.
    pub async fn run(&self, shutdown: CancellationToken) {
        tracing::info!(workers = self.workers, "starting workers");

        let mut workers = JoinSet::new();
        for worker in 0..self.workers {
            let pool = self.clone();
            let shutdown = shutdown.clone();
            workers.spawn(async move { pool.work(worker, shutdown).await });
        }

        while let Some(result) = workers.join_next().await {
            if let Err(e) = result {
                tracing::error!(error = %e, "worker task failed");
            }
        }
        tracing::info!("all workers stopped");
    }

    async fn work(&self, worker: usize, shutdown: CancellationToken) {
        tracing::info!(worker, "worker started");

        while !shutdown.is_cancelled() {
            match self.process_next(worker).await {
                Ok(Some(notification)) => {
                    tracing::info!(
                        worker,
                        notification_id = %notification.id,
                        user_id = %notification.user_id,
                        "notification delivered"
                    );
                }
                Ok(None) => {}
                Err(e @ ProcessError::Dequeue(_)) => {
                    tracing::warn!(worker, error = %e, "failed to dequeue");
                    tokio::select! {
                        _ = shutdown.cancelled() => {}
                        _ = tokio::time::sleep(DEQUEUE_ERROR_BACKOFF) => {}
                    }
                }
                Err(e) => {
                    tracing::warn!(worker, error = %e, "notification dropped");
                }
            }
        }

        tracing::info!(worker, "worker stopped");
    }

    /// Take one item through dequeue, validate, persist and publish.
    ///
    /// `Ok(None)` means the queue stayed empty for the whole wait.
    pub async fn process_next(&self, worker: usize) -> Result<Option<Notification>, ProcessError> {
        let Some(raw) = self
            .queue
            .dequeue(QUEUE_NAME, self.dequeue_timeout)
            .await
            .map_err(ProcessError::Dequeue)?
        else {
            return Ok(None);
        };

        let mut request: NotificationRequest = serde_json::from_str(&raw).map_err(ProcessError::Decode)?;
        request.validate()?;
        tracing::debug!(worker, user_id = %request.user_id, "processing notification");

        let notification = self.store.create_notification(&request).await?;

        let frame = serde_json::to_string(&PushFrame::Notification(notification.clone()))
            .map_err(ProcessError::Encode)?;
        self.pubsub
            .publish(&notification_channel(&notification.user_id), &frame)
            .await
            .map_err(ProcessError::Publish)?;

        Ok(Some(notification))
    }

    pub async fn stats(&self) -> Result<WorkerStats, BrokerError> {
        Ok(WorkerStats {
            queue_size: self.queue.len(QUEUE_NAME).await?,
            workers: self.workers,
        })
    }
}
