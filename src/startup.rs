use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{any, get, post},
    Router,
};
use time::Duration;
use tower_http::trace::TraceLayer;
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer};

use crate::handlers::{
    app::health_check,
    auth::{
        forgot_password_handler, login_handler, logout_handler, register_handler,
        reset_password_handler, session_handler, token_handler,
    },
    chat::{chat_handler, site_chat_handler},
    proxy::{authenticated_proxy, public_proxy},
};
use crate::middleware::{
    guard::route_guard, metrics::metrics_middleware, tracing::request_id_middleware,
};
use crate::AppState;

pub fn build_router(state: AppState) -> Router {
    // Session setup; the session plays the part of the browser's persistent
    // local store on the server side.
    let session_store = MemoryStore::default();
    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(state.settings.server.secure_cookies)
        .with_expiry(Expiry::OnInactivity(Duration::hours(24)));

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(crate::handlers::metrics::metrics))
        .route("/api/auth/login", post(login_handler))
        .route("/api/auth/register", post(register_handler))
        .route("/api/auth/token", post(token_handler))
        .route("/api/auth/session", get(session_handler))
        .route("/api/auth/logout", post(logout_handler))
        .route("/api/auth/forgot-password", post(forgot_password_handler))
        .route("/api/auth/reset-password", post(reset_password_handler))
        .route("/api/chat", post(chat_handler))
        .route("/api/sites/chat", post(site_chat_handler))
        .route("/api/sites", any(authenticated_proxy))
        .route("/api/sites/*rest", any(authenticated_proxy))
        .route("/api/subscriptions", any(authenticated_proxy))
        .route("/api/subscriptions/*rest", any(authenticated_proxy))
        .route("/api/dashboard", get(authenticated_proxy))
        .route("/api/users/me", get(authenticated_proxy))
        .route("/api/plans", get(public_proxy))
        .route("/api/plans/:id", get(public_proxy))
        .layer(from_fn_with_state(state.clone(), route_guard))
        .layer(session_layer)
        .layer(from_fn(metrics_middleware))
        // Add tracing layer
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            }),
        )
        // Add tracing middleware for request_id
        .layer(from_fn(request_id_middleware))
        .with_state(state)
}
