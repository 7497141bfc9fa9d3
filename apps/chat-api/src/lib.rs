pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod models;
pub mod routes;

use std::sync::Arc;

use auth::TokenValidator;
use config::Config;
use db::MessageStore;
use gateway::hub::HubHandle;
use gateway::notify::Notifier;

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub messages: Arc<dyn MessageStore>,
    pub auth: Arc<dyn TokenValidator>,
    pub hub: HubHandle,
    pub notifier: Arc<Notifier>,
    pub config: Arc<Config>,
}
