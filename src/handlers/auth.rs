use axum::{extract::State, Json};
use axum_extra::extract::cookie::CookieJar;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_sessions::Session;
use validator::Validate;

use crate::auth::resolver::{peek_token, resolve, ResolveContext};
use crate::auth::store::{CredentialStore, StoreScope};
use crate::error::AppError;
use crate::models::user::{IdentitySnapshot, Role};
use crate::services::backend_client::upstream_error;
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "identifier is required"))]
    pub identifier: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "password is required"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ForgotPasswordRequest {
    #[serde(default)]
    #[validate(email(message = "a valid email is required"))]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResetPasswordRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "token is required"))]
    pub token: String,
    #[serde(default)]
    #[validate(length(min = 8, message = "password must be at least 8 characters"))]
    pub new_password: String,
}

/// Token pushed from the browser, e.g. after a client-side OAuth exchange.
#[derive(Debug, Deserialize, Validate)]
pub struct TokenPushRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "token is required"))]
    pub token: String,
    #[serde(default)]
    pub expired_at: Option<String>,
    #[serde(default, alias = "userId")]
    pub user_id: Option<String>,
    #[serde(default, alias = "userIdentifier")]
    pub user_identifier: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub brand_logos: Option<Vec<String>>,
}

/// Token-bearing success body from the upstream identity endpoints.
#[derive(Debug, Deserialize)]
struct TokenGrant {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default, alias = "expired_at")]
    expires_at: Option<String>,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    user: Option<GrantUser>,
    #[serde(default)]
    brand_logos: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct GrantUser {
    id: String,
    identifier: String,
}

fn parse_expiry(raw: Option<&str>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn snapshot_from_grant(grant: &TokenGrant) -> IdentitySnapshot {
    IdentitySnapshot {
        access_token: grant.access_token.clone(),
        user_id: grant.user.as_ref().map(|u| u.id.clone()),
        user_identifier: grant.user.as_ref().map(|u| u.identifier.clone()),
        role: grant.role.as_deref().and_then(Role::parse),
        expires_at: parse_expiry(grant.expires_at.as_deref()),
        brand_logos: grant.brand_logos.clone().unwrap_or_default(),
    }
}

pub async fn login_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    session: Session,
    Json(payload): Json<LoginRequest>,
) -> Result<(CookieJar, Json<Value>), AppError> {
    payload.validate()?;

    let response = state
        .backend
        .post_form(
            "/api/v1/login",
            &[
                ("identifier", payload.identifier.as_str()),
                ("password", payload.password.as_str()),
            ],
        )
        .await?;

    if !response.status().is_success() {
        return Err(upstream_error(response).await);
    }

    let body: Value = response
        .json()
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Malformed login response: {}", e)))?;
    let grant: TokenGrant = serde_json::from_value(body.clone())
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Malformed login response: {}", e)))?;

    let snapshot = snapshot_from_grant(&grant);
    let mut store = CredentialStore::new(jar, session, state.settings.server.secure_cookies);
    store
        .write(&snapshot, grant.refresh_token.as_deref(), StoreScope::All)
        .await;

    tracing::info!(identifier = %payload.identifier, "User logged in");

    Ok((store.into_jar(), Json(body)))
}

pub async fn register_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    session: Session,
    Json(payload): Json<LoginRequest>,
) -> Result<(CookieJar, Json<Value>), AppError> {
    payload.validate()?;

    let response = state
        .backend
        .post_form(
            "/api/v1/register",
            &[
                ("identifier", payload.identifier.as_str()),
                ("password", payload.password.as_str()),
            ],
        )
        .await?;

    if response.status() == reqwest::StatusCode::CONFLICT {
        return Err(AppError::user_already_exists());
    }
    if !response.status().is_success() {
        return Err(upstream_error(response).await);
    }

    let body: Value = response.json().await.unwrap_or_else(|_| json!({}));

    // Some deployments log the user straight in on registration; persist the
    // credential whenever one came back.
    let mut store = CredentialStore::new(jar, session, state.settings.server.secure_cookies);
    if let Ok(grant) = serde_json::from_value::<TokenGrant>(body.clone()) {
        let snapshot = snapshot_from_grant(&grant);
        store
            .write(&snapshot, grant.refresh_token.as_deref(), StoreScope::All)
            .await;
    }

    tracing::info!(identifier = %payload.identifier, "User registered");

    Ok((store.into_jar(), Json(body)))
}

/// Accept a token the browser obtained out-of-band (OAuth) and fan it out to
/// the server-side stores. When the payload carries no identity, the token
/// is validated and enriched through the resolver before we report success.
pub async fn token_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    session: Session,
    Json(payload): Json<TokenPushRequest>,
) -> Result<(CookieJar, Json<Value>), AppError> {
    payload.validate()?;

    let snapshot = IdentitySnapshot {
        access_token: payload.token.clone(),
        user_id: payload.user_id.clone(),
        user_identifier: payload.user_identifier.clone(),
        role: payload.role.as_deref().and_then(Role::parse),
        expires_at: parse_expiry(payload.expired_at.as_deref()),
        brand_logos: payload.brand_logos.clone().unwrap_or_default(),
    };

    let mut store = CredentialStore::new(jar, session, state.settings.server.secure_cookies);
    store.write(&snapshot, None, StoreScope::All).await;

    if snapshot.has_identity() && snapshot.role.is_some() {
        return Ok((store.into_jar(), Json(json!({ "status": "ok" }))));
    }

    match resolve(&mut store, &state.backend, ResolveContext::Server).await? {
        Some(user) => Ok((
            store.into_jar(),
            Json(json!({ "status": "ok", "user": user })),
        )),
        // The pushed token was rejected upstream; the resolver already
        // cleared whatever we just wrote.
        None => Err(AppError::Unauthenticated),
    }
}

/// Debug introspection: resolved user plus which stores hold a snapshot.
/// Never echoes token values.
pub async fn session_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    session: Session,
) -> Result<(CookieJar, Json<Value>), AppError> {
    let mut store = CredentialStore::new(jar, session, state.settings.server.secure_cookies);

    let user = resolve(&mut store, &state.backend, ResolveContext::Server).await?;
    let presence = store.presence().await;

    Ok((
        store.into_jar(),
        Json(json!({
            "authenticated": user.is_some(),
            "user": user,
            "stores": presence,
        })),
    ))
}

/// Logout clears all local stores unconditionally. Upstream revocation is
/// attempted but its failure never keeps the browser logged in.
pub async fn logout_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    session: Session,
) -> Result<(CookieJar, Json<Value>), AppError> {
    let mut store = CredentialStore::new(jar, session, state.settings.server.secure_cookies);

    if let Some(token) = peek_token(&store, ResolveContext::Server).await {
        match state
            .backend
            .post_json("/api/v1/logout", &json!({ "token": token }), Some(&token))
            .await
        {
            Ok(response) if response.status().is_success() => {
                tracing::info!("Token revoked upstream");
            }
            Ok(response) => {
                tracing::warn!(status = %response.status(), "Upstream logout reported failure");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to reach upstream for logout");
            }
        }
    }

    store.clear(StoreScope::All).await;

    Ok((store.into_jar(), Json(json!({ "status": "logged_out" }))))
}

pub async fn forgot_password_handler(
    State(state): State<AppState>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> Result<Json<Value>, AppError> {
    payload.validate()?;

    let response = state
        .backend
        .post_json(
            "/api/v1/forgot_password",
            &json!({ "email": payload.email }),
            None,
        )
        .await?;

    if !response.status().is_success() {
        return Err(upstream_error(response).await);
    }

    let body: Value = response.json().await.unwrap_or_else(|_| json!({ "status": "ok" }));
    Ok(Json(body))
}

pub async fn reset_password_handler(
    State(state): State<AppState>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<Json<Value>, AppError> {
    payload.validate()?;

    let response = state
        .backend
        .post_json(
            "/api/v1/reset_password",
            &json!({
                "token": payload.token,
                "new_password": payload.new_password,
            }),
            None,
        )
        .await?;

    if !response.status().is_success() {
        return Err(upstream_error(response).await);
    }

    let body: Value = response.json().await.unwrap_or_else(|_| json!({ "status": "ok" }));
    Ok(Json(body))
}
