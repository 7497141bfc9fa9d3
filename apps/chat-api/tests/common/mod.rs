#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use tokio_util::sync::CancellationToken;

use chat_api::auth::tokens::Claims;
use chat_api::auth::JwtValidator;
use chat_api::config::Config;
use chat_api::db::{MemoryMessageStore, MessageStore};
use chat_api::gateway::hub::{self, HubConfig};
use chat_api::gateway::notify::Notifier;
use chat_api::AppState;
use parley_common::MemoryBroker;

pub const TEST_SECRET: &str = "test-secret-do-not-use-in-production";

pub struct TestContext {
    pub state: AppState,
    pub messages: Arc<MemoryMessageStore>,
    pub broker: Arc<MemoryBroker>,
    pub shutdown: CancellationToken,
}

pub fn test_config() -> Config {
    Config {
        database_url: String::new(),
        redis_url: String::new(),
        jwt_secret: TEST_SECRET.to_string(),
        port: 0,
        outbound_buffer_size: 256,
        history_limit: 50,
        notify_timeout: Duration::from_secs(5),
    }
}

/// Build a test AppState over in-memory stores and an in-process broker.
pub fn test_context() -> TestContext {
    test_context_with(test_config(), Arc::new(MemoryBroker::new()))
}

pub fn test_context_with(config: Config, broker: Arc<MemoryBroker>) -> TestContext {
    let messages = Arc::new(MemoryMessageStore::new());
    let shutdown = CancellationToken::new();
    let (hub, _task) = hub::spawn(
        HubConfig {
            outbound_capacity: config.outbound_buffer_size,
        },
        broker.clone(),
        shutdown.clone(),
    );
    let notifier = Arc::new(Notifier::new(broker.clone(), hub.clone(), config.notify_timeout));

    let state = AppState {
        messages: messages.clone() as Arc<dyn MessageStore>,
        auth: Arc::new(JwtValidator::new(&config.jwt_secret)),
        hub,
        notifier,
        config: Arc::new(config),
    };

    TestContext {
        state,
        messages,
        broker,
        shutdown,
    }
}

pub fn test_app(state: &AppState) -> Router {
    chat_api::routes::router().with_state(state.clone())
}

/// Mint a token the way the auth service does.
pub fn mint_token(username: &str) -> String {
    let claims = Claims {
        username: username.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp(),
    };
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
    )
    .expect("mint test token")
}

/// Start an actual TCP server for WebSocket testing. The server runs in the
/// background.
pub async fn start_server(state: &AppState) -> SocketAddr {
    let app = test_app(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    addr
}

/// Poll `condition` until it holds, failing the test after two seconds.
pub async fn eventually<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not met in time");
}
