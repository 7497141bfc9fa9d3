use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use notification_worker::config::Config;
use notification_worker::db::PgNotificationStore;
use notification_worker::WorkerPool;
use parley_common::RedisBroker;

#[tokio::main]
async fn main() {
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    let db = notification_worker::db::pool::connect(&config.database_url, config.workers)
        .await
        .expect("failed to connect to database");
    let broker = Arc::new(
        RedisBroker::connect(&config.redis_url)
            .await
            .expect("failed to connect to redis"),
    );

    let pool = WorkerPool::new(
        broker.clone(),
        broker,
        Arc::new(PgNotificationStore::new(db)),
        config.workers,
        config.dequeue_timeout,
    );

    match pool.stats().await {
        Ok(stats) => tracing::info!(
            queue_size = stats.queue_size,
            workers = stats.workers,
            "notification-worker configured"
        ),
        Err(e) => tracing::warn!(error = %e, "failed to read queue stats"),
    }

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
                return;
            }
            tracing::info!("shutdown requested");
            shutdown.cancel();
        }
    });

    pool.run(shutdown).await;
    tracing::info!("notification-worker stopped");
}
