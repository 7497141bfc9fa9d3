#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use notification_worker::db::MemoryNotificationStore;
use notification_worker::WorkerPool;
use parley_common::MemoryBroker;

pub const DEQUEUE_TIMEOUT: Duration = Duration::from_millis(50);

pub struct TestPool {
    pub pool: WorkerPool,
    pub broker: Arc<MemoryBroker>,
    pub store: Arc<MemoryNotificationStore>,
}

/// A worker pool over an in-process broker and in-memory store.
pub fn test_pool(workers: usize) -> TestPool {
    let broker = Arc::new(MemoryBroker::new());
    let store = Arc::new(MemoryNotificationStore::new());
    let pool = WorkerPool::new(
        broker.clone(),
        broker.clone(),
        store.clone(),
        workers,
        DEQUEUE_TIMEOUT,
    );
    TestPool {
        pool,
        broker,
        store,
    }
}
