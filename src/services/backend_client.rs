use axum::body::Bytes;
use axum::http::{Method, StatusCode};
use reqwest::Client;

use crate::config::BackendSettings;
use crate::error::AppError;

/// HTTP client for the upstream backend service. All upstream traffic from
/// the gateway and the resolver goes through here.
pub struct BackendClient {
    client: Client,
    settings: BackendSettings,
}

impl BackendClient {
    pub fn new(settings: BackendSettings) -> Self {
        Self {
            client: Client::new(),
            settings,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.settings.url
    }

    /// Form-encoded POST. Login and register credentials travel this way and
    /// must never be served from an intermediate cache.
    pub async fn post_form(
        &self,
        path: &str,
        form: &[(&str, &str)],
    ) -> Result<reqwest::Response, AppError> {
        let url = format!("{}{}", self.settings.url, path);

        self.client
            .post(&url)
            .header(reqwest::header::CACHE_CONTROL, "no-store")
            .form(form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(url = %url, error = %e, "Failed to send form POST");
                AppError::Transport(anyhow::anyhow!("HTTP request failed: {}", e))
            })
    }

    /// JSON POST, optionally authenticated.
    pub async fn post_json(
        &self,
        path: &str,
        body: &serde_json::Value,
        bearer: Option<&str>,
    ) -> Result<reqwest::Response, AppError> {
        let url = format!("{}{}", self.settings.url, path);

        let mut request = self
            .client
            .post(&url)
            .header(reqwest::header::CACHE_CONTROL, "no-store")
            .json(body);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }

        request.send().await.map_err(|e| {
            tracing::error!(url = %url, error = %e, "Failed to send JSON POST");
            AppError::Transport(anyhow::anyhow!("HTTP request failed: {}", e))
        })
    }

    /// Authenticated GET.
    pub async fn get_with_auth(
        &self,
        path: &str,
        access_token: &str,
    ) -> Result<reqwest::Response, AppError> {
        let url = format!("{}{}", self.settings.url, path);

        self.client
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(url = %url, error = %e, "Failed to send GET");
                AppError::Transport(anyhow::anyhow!("HTTP request failed: {}", e))
            })
    }

    /// Forward a request verbatim: the body bytes and content type go out
    /// exactly as they came in, so multipart payloads keep their boundary.
    pub async fn forward(
        &self,
        method: Method,
        path_and_query: &str,
        content_type: Option<&str>,
        accept: Option<&str>,
        body: Bytes,
        bearer: Option<&str>,
    ) -> Result<reqwest::Response, AppError> {
        let url = format!("{}{}", self.settings.url, path_and_query);

        let mut request = self.client.request(method, &url);
        if let Some(value) = content_type {
            request = request.header(reqwest::header::CONTENT_TYPE, value);
        }
        if let Some(value) = accept {
            request = request.header(reqwest::header::ACCEPT, value);
        }
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        if !body.is_empty() {
            request = request.body(body);
        }

        request.send().await.map_err(|e| {
            tracing::error!(url = %url, error = %e, "Failed to forward request");
            AppError::Transport(anyhow::anyhow!("HTTP request failed: {}", e))
        })
    }
}

/// Consume a non-2xx upstream response into the normalized error variant.
pub async fn upstream_error(response: reqwest::Response) -> AppError {
    let status = StatusCode::from_u16(response.status().as_u16())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = response.bytes().await.unwrap_or_default();

    AppError::Upstream {
        status,
        message: parse_error_message(status, &body),
    }
}

/// Upstream error bodies vary: `{"detail": …}`, `{"error": …}`,
/// `{"message": …}` or plain text. Try structured shapes first and fall back
/// to a status-keyed generic message.
pub fn parse_error_message(status: StatusCode, body: &[u8]) -> String {
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) {
        for key in ["detail", "error", "message"] {
            if let Some(message) = value.get(key).and_then(|v| v.as_str()) {
                if !message.is_empty() {
                    return message.to_string();
                }
            }
        }
    }

    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if !text.is_empty() && text.len() <= 512 && !text.starts_with('{') && !text.starts_with('<') {
        return text.to_string();
    }

    format!("Upstream request failed with status {}", status.as_u16())
}
