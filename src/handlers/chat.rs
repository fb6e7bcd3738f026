use axum::{extract::State, response::Response, Json};
use axum_extra::extract::cookie::CookieJar;
use secrecy::ExposeSecret;
use serde::Deserialize;
use tower_sessions::Session;
use validator::Validate;

use crate::auth::resolver::{peek_token, ResolveContext};
use crate::auth::store::CredentialStore;
use crate::error::AppError;
use crate::services::chat_relay::ChatPrompt;
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct ChatRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "question is required"))]
    pub question: String,
    #[serde(default)]
    pub chat_history: Vec<serde_json::Value>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub site_token: Option<String>,
}

impl ChatRequest {
    fn prompt(&self) -> ChatPrompt {
        ChatPrompt {
            question: self.question.clone(),
            chat_history: self.chat_history.clone(),
            session_id: self.session_id.clone(),
        }
    }
}

/// `POST /api/chat` — chat as the logged-in user. The resolved credential is
/// the bearer; a supplied site token overrides it.
pub async fn chat_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    session: Session,
    Json(payload): Json<ChatRequest>,
) -> Result<Response, AppError> {
    payload.validate()?;

    let bearer = match &payload.site_token {
        Some(token) => token.clone(),
        None => {
            let store = CredentialStore::new(jar, session, state.settings.server.secure_cookies);
            peek_token(&store, ResolveContext::Server)
                .await
                .ok_or(AppError::Unauthenticated)?
        }
    };

    state.chat.stream(&payload.prompt(), &bearer).await
}

/// `POST /api/sites/chat` — widget chat against one site's knowledge base.
/// Authenticates with the site chat token; the configured service token is
/// the fallback when the widget supplies none.
pub async fn site_chat_handler(
    State(state): State<AppState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Response, AppError> {
    payload.validate()?;

    let bearer = payload
        .site_token
        .clone()
        .or_else(|| {
            state
                .settings
                .ai
                .token
                .as_ref()
                .map(|secret| secret.expose_secret().clone())
        })
        .ok_or_else(|| AppError::Validation("site_token is required".to_string()))?;

    state.chat.stream(&payload.prompt(), &bearer).await
}
