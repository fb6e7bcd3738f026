//! Authenticated resource proxy.
//!
//! The handlers here relay client requests to the upstream backend verbatim,
//! injecting the resolved bearer credential and normalizing upstream error
//! shapes. Bodies pass through as raw bytes with their original content
//! type, so multipart uploads keep their boundary untouched.

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderValue, StatusCode},
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use tower_sessions::Session;

use crate::auth::resolver::{peek_token, ResolveContext};
use crate::auth::store::CredentialStore;
use crate::error::AppError;
use crate::services::backend_client::upstream_error;
use crate::AppState;

const MAX_BODY_BYTES: usize = 50 * 1024 * 1024;

/// Map a client-facing `/api/…` path to the upstream `/api/v1/…` namespace,
/// keeping the query string.
fn upstream_path(path_and_query: &str) -> String {
    match path_and_query.strip_prefix("/api") {
        Some(rest) => format!("/api/v1{}", rest),
        None => path_and_query.to_string(),
    }
}

/// Proxy routes that require a resolved credential. Fails closed: without a
/// credential the upstream is never contacted.
pub async fn authenticated_proxy(
    State(state): State<AppState>,
    jar: CookieJar,
    session: Session,
    request: Request,
) -> Result<Response, AppError> {
    forward(state, jar, session, request, true).await
}

/// Proxy routes that are public (plan listing); a credential is attached
/// when one happens to be present.
pub async fn public_proxy(
    State(state): State<AppState>,
    jar: CookieJar,
    session: Session,
    request: Request,
) -> Result<Response, AppError> {
    forward(state, jar, session, request, false).await
}

async fn forward(
    state: AppState,
    jar: CookieJar,
    session: Session,
    request: Request,
    require_credential: bool,
) -> Result<Response, AppError> {
    let (parts, body) = request.into_parts();

    let store = CredentialStore::new(jar, session, state.settings.server.secure_cookies);
    let token = peek_token(&store, ResolveContext::Server).await;
    if require_credential && token.is_none() {
        return Err(AppError::Unauthenticated);
    }

    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| parts.uri.path().to_string());
    let content_type = header_string(&parts.headers, header::CONTENT_TYPE);
    let accept = header_string(&parts.headers, header::ACCEPT);

    let body = axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| AppError::Validation(format!("Unreadable request body: {}", e)))?;

    let upstream = state
        .backend
        .forward(
            parts.method,
            &upstream_path(&path_and_query),
            content_type.as_deref(),
            accept.as_deref(),
            body,
            token.as_deref(),
        )
        .await?;

    if !upstream.status().is_success() {
        return Err(upstream_error(upstream).await);
    }

    let status = StatusCode::from_u16(upstream.status().as_u16()).unwrap_or(StatusCode::OK);
    let response_content_type = upstream
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let bytes = upstream
        .bytes()
        .await
        .map_err(|e| AppError::Transport(anyhow::anyhow!("Failed to read upstream body: {}", e)))?;

    let mut builder = Response::builder().status(status);
    if let Some(value) = response_content_type.and_then(|v| HeaderValue::from_str(&v).ok()) {
        builder = builder.header(header::CONTENT_TYPE, value);
    }

    builder
        .body(Body::from(bytes))
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Response build failed: {}", e)))
}

fn header_string(headers: &axum::http::HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}
