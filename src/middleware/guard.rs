//! Route guard.
//!
//! Classifies every inbound path and redirects requests whose resolved auth
//! state does not fit the class. API routes enforce credentials themselves
//! (the proxy fails closed), so they classify as public here; the guard's
//! gate applies to page navigation.

use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use chrono::Utc;
use tower_sessions::Session;

use crate::auth::store::{CredentialStore, ReadPreference};
use crate::models::user::Role;
use crate::utils::jwt::decode_jwt_claims;
use crate::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    Public,
    AuthPage,
    Protected,
    AdminOnly,
}

pub fn classify(path: &str) -> RouteClass {
    let matches_section = |section: &str| {
        path == section || path.starts_with(&format!("{}/", section))
    };

    if matches_section("/admin") {
        RouteClass::AdminOnly
    } else if matches_section("/login")
        || matches_section("/register")
        || matches_section("/forgot-password")
        || matches_section("/reset-password")
    {
        RouteClass::AuthPage
    } else if matches_section("/dashboard")
        || matches_section("/sites")
        || matches_section("/settings")
        || matches_section("/subscription")
        || matches_section("/subscriptions")
    {
        RouteClass::Protected
    } else {
        RouteClass::Public
    }
}

pub async fn route_guard(
    State(state): State<AppState>,
    session: Session,
    jar: CookieJar,
    request: Request,
    next: Next,
) -> Response {
    let class = classify(request.uri().path());

    let store = CredentialStore::new(jar, session, state.settings.server.secure_cookies);
    // An expired snapshot is no credential, same as the resolver's view.
    let snapshot = store
        .read(ReadPreference::Any)
        .await
        .filter(|s| !s.is_expired(Utc::now()));
    let role = snapshot.as_ref().and_then(|s| {
        s.role.or_else(|| {
            decode_jwt_claims(&s.access_token)
                .ok()
                .and_then(|claims| claims.role.as_deref().and_then(Role::parse))
        })
    });

    match class {
        RouteClass::AuthPage if snapshot.is_some() => {
            // Already logged in; bounce away from login/register.
            return Redirect::to("/dashboard").into_response();
        }
        RouteClass::Protected | RouteClass::AdminOnly if snapshot.is_none() => {
            return Redirect::to("/login?reason=unauthorized").into_response();
        }
        RouteClass::AdminOnly if !role.map(|r| r.is_admin()).unwrap_or(false) => {
            tracing::warn!(
                path = %request.uri().path(),
                role = role.map(|r| r.as_str()).unwrap_or("none"),
                "Blocked non-admin access to admin route"
            );
            return Redirect::to("/dashboard?reason=forbidden").into_response();
        }
        _ => {}
    }

    let mut response = next.run(request).await;

    let auth_state = if snapshot.is_some() {
        "authenticated"
    } else {
        "anonymous"
    };
    response
        .headers_mut()
        .insert("x-auth-state", HeaderValue::from_static(auth_state));
    if let Some(role) = role {
        response
            .headers_mut()
            .insert("x-auth-role", HeaderValue::from_static(role.as_str()));
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_paths_classify_admin_only() {
        assert_eq!(classify("/admin"), RouteClass::AdminOnly);
        assert_eq!(classify("/admin/users"), RouteClass::AdminOnly);
        assert_eq!(classify("/administrators"), RouteClass::Public);
    }

    #[test]
    fn auth_pages_classified() {
        assert_eq!(classify("/login"), RouteClass::AuthPage);
        assert_eq!(classify("/register"), RouteClass::AuthPage);
        assert_eq!(classify("/reset-password/abc"), RouteClass::AuthPage);
    }

    #[test]
    fn protected_sections_classified() {
        assert_eq!(classify("/dashboard"), RouteClass::Protected);
        assert_eq!(classify("/sites/42/documents"), RouteClass::Protected);
        assert_eq!(classify("/settings"), RouteClass::Protected);
        assert_eq!(classify("/subscription"), RouteClass::Protected);
    }

    #[test]
    fn everything_else_is_public() {
        assert_eq!(classify("/"), RouteClass::Public);
        assert_eq!(classify("/pricing"), RouteClass::Public);
        assert_eq!(classify("/api/sites"), RouteClass::Public);
        assert_eq!(classify("/health"), RouteClass::Public);
    }
}
