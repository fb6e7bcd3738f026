use axum::{
    body::Body,
    http::{header, StatusCode},
    response::Response,
};
use reqwest::Client;
use serde::Serialize;

use crate::config::AiSettings;
use crate::error::AppError;
use crate::services::backend_client::upstream_error;

/// Payload for the upstream chat completion endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ChatPrompt {
    pub question: String,
    pub chat_history: Vec<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Streaming relay to the chat completion service.
///
/// The generic proxy buffers upstream bodies; chat answers arrive as a slow
/// token stream, so this client hands the upstream byte stream straight to
/// the response body. Chunks are relayed in arrival order and nothing is
/// held back waiting for the stream to finish. When the downstream caller
/// disconnects the response body is dropped, which aborts the upstream
/// connection with it.
pub struct ChatRelay {
    client: Client,
    settings: AiSettings,
}

impl ChatRelay {
    pub fn new(settings: AiSettings) -> Self {
        Self {
            client: Client::new(),
            settings,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.settings.url
    }

    /// Open the upstream chat stream and relay it. A non-2xx upstream answer
    /// before any bytes were streamed surfaces as a structured error rather
    /// than an empty stream.
    pub async fn stream(&self, prompt: &ChatPrompt, bearer: &str) -> Result<Response, AppError> {
        let url = format!("{}/api/v1/chat", self.settings.url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(bearer)
            .json(prompt)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(url = %url, error = %e, "Failed to open chat stream");
                AppError::Transport(anyhow::anyhow!("HTTP request failed: {}", e))
            })?;

        if !response.status().is_success() {
            return Err(upstream_error(response).await);
        }

        let body = Body::from_stream(response.bytes_stream());

        Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(body)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Response build failed: {}", e)))
    }
}
