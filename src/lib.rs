pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod services;
pub mod startup;
pub mod utils;

use std::sync::Arc;

use config::Settings;
use services::{backend_client::BackendClient, chat_relay::ChatRelay};

/// Shared application state: configuration plus the upstream clients.
/// Constructed once at bootstrap and injected through the router.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub backend: Arc<BackendClient>,
    pub chat: Arc<ChatRelay>,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        let backend = Arc::new(BackendClient::new(settings.backend.clone()));
        let chat = Arc::new(ChatRelay::new(settings.ai.clone()));
        Self {
            settings: Arc::new(settings),
            backend,
            chat,
        }
    }
}
