use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chat_api::auth::JwtValidator;
use chat_api::config::Config;
use chat_api::db::PgMessageStore;
use chat_api::gateway::hub::{self, HubConfig};
use chat_api::gateway::notify::Notifier;
use chat_api::AppState;
use parley_common::RedisBroker;

#[tokio::main]
async fn main() {
    // Load .env file (silently skip if missing, env vars may be set externally)
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let port = config.port;

    let db = chat_api::db::pool::connect(&config.database_url)
        .await
        .expect("failed to connect to database");

    // One broker serves both the notification queue and the push channels.
    let broker = Arc::new(
        RedisBroker::connect(&config.redis_url)
            .await
            .expect("failed to connect to redis"),
    );

    let shutdown = CancellationToken::new();
    let (hub, hub_task) = hub::spawn(
        HubConfig {
            outbound_capacity: config.outbound_buffer_size,
        },
        broker.clone(),
        shutdown.clone(),
    );
    let notifier = Arc::new(Notifier::new(broker, hub.clone(), config.notify_timeout));

    tracing::info!(
        outbound_buffer_size = config.outbound_buffer_size,
        history_limit = config.history_limit,
        "chat-api configured"
    );

    let state = AppState {
        messages: Arc::new(PgMessageStore::new(db)),
        auth: Arc::new(JwtValidator::new(&config.jwt_secret)),
        hub,
        notifier,
        config: Arc::new(config),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(chat_api::routes::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "chat-api listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await
        .expect("server error");

    shutdown.cancel();
    let _ = hub_task.await;
    tracing::info!("chat-api stopped");
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
    // Live sockets end once the hub closes their sessions.
    shutdown.cancel();
}
