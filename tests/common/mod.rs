//! Shared helpers for the integration tests. The upstream backend and the
//! chat service are stand-ins (wiremock or a local axum app); the router
//! under test is the real one.

#![allow(dead_code)]

use axum::Router;
use secrecy::Secret;
use sitechat_console::config::{AiSettings, BackendSettings, ServerSettings, Settings};
use sitechat_console::startup::build_router;
use sitechat_console::AppState;

pub fn test_settings(backend_url: &str, ai_url: &str) -> Settings {
    Settings {
        server: ServerSettings {
            host: "127.0.0.1".to_string(),
            port: 0,
            session_secret: Secret::new("test-secret".to_string()),
            secure_cookies: false,
        },
        backend: BackendSettings {
            url: backend_url.to_string(),
        },
        ai: AiSettings {
            url: ai_url.to_string(),
            token: None,
        },
    }
}

pub fn test_router(backend_url: &str, ai_url: &str) -> Router {
    sitechat_console::services::metrics::init_metrics();
    build_router(AppState::new(test_settings(backend_url, ai_url)))
}

/// Serve the router on an ephemeral port and return its base URL. Used by
/// tests that need a real connection (streaming).
pub async fn spawn_app(backend_url: &str, ai_url: &str) -> String {
    let app = test_router(backend_url, ai_url);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind test listener");
    let addr = listener.local_addr().expect("listener has no local addr");

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("test server failed");
    });

    format!("http://{}", addr)
}

/// All `set-cookie` header values of a response.
pub fn set_cookies(response: &axum::response::Response) -> Vec<String> {
    response
        .headers()
        .get_all(axum::http::header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(str::to_string)
        .collect()
}

/// The value a response assigns to `name`, if any `set-cookie` starts with it.
pub fn cookie_assignment(response: &axum::response::Response, name: &str) -> Option<String> {
    set_cookies(response).into_iter().find_map(|raw| {
        let (pair, _) = raw.split_once(';').unwrap_or((raw.as_str(), ""));
        let (cookie_name, value) = pair.split_once('=')?;
        (cookie_name == name).then(|| value.to_string())
    })
}

/// True when the response expires `name` (clears it).
pub fn clears_cookie(response: &axum::response::Response, name: &str) -> bool {
    set_cookies(response)
        .iter()
        .any(|raw| raw.starts_with(&format!("{}=", name)) && raw.contains("Max-Age=0"))
}
