//! Credential store adapter.
//!
//! Identity material is replicated across three server-manipulable stores:
//! httpOnly cookies (server scope), client-readable cookies (client scope)
//! and the per-browser server session (local scope). All writes and clears go
//! through this one type so rotation replaces every copy, never a subset:
//! mutations land on the request's cookie jar and session before the
//! response is produced, so a reader either observes the prior value in full
//! or the new value in full.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{DateTime, Utc};
use time::Duration;
use tower_sessions::Session;

use crate::models::user::{IdentitySnapshot, Role};

pub const ACCESS_TOKEN_COOKIE: &str = "access_token";
pub const CLIENT_ACCESS_TOKEN_COOKIE: &str = "client_access_token";
pub const REFRESH_TOKEN_COOKIE: &str = "refresh_token";
pub const USER_ID_COOKIE: &str = "user_id";
pub const USER_IDENTIFIER_COOKIE: &str = "user_identifier";
pub const USER_ROLE_COOKIE: &str = "user_role";
pub const TOKEN_EXPIRED_AT_COOKIE: &str = "token_expired_at";
pub const BRAND_LOGOS_COOKIE: &str = "brand_logos";

const ALL_COOKIES: [&str; 8] = [
    ACCESS_TOKEN_COOKIE,
    CLIENT_ACCESS_TOKEN_COOKIE,
    REFRESH_TOKEN_COOKIE,
    USER_ID_COOKIE,
    USER_IDENTIFIER_COOKIE,
    USER_ROLE_COOKIE,
    TOKEN_EXPIRED_AT_COOKIE,
    BRAND_LOGOS_COOKIE,
];

/// Fixed expiry policy: 7 days for access material, 30 for the refresh token.
const ACCESS_TTL: Duration = Duration::days(7);
const REFRESH_TTL: Duration = Duration::days(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreScope {
    /// httpOnly cookie material (refresh token plus the access cookie set).
    Server,
    /// Cookies readable by browser JS.
    Client,
    /// The per-browser server session.
    Local,
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadPreference {
    Server,
    Client,
    Local,
    Any,
}

/// Which stores currently hold a snapshot. Exposed by the session debug
/// endpoint and used by the resolver to detect write-through gaps.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct StorePresence {
    pub server: bool,
    pub client: bool,
    pub local: bool,
}

pub struct CredentialStore {
    jar: CookieJar,
    session: Session,
    secure: bool,
}

impl CredentialStore {
    pub fn new(jar: CookieJar, session: Session, secure: bool) -> Self {
        Self { jar, session, secure }
    }

    /// Hand the mutated jar back so the handler can include it in the
    /// response; cookie writes are only visible to the client through it.
    pub fn into_jar(self) -> CookieJar {
        self.jar
    }

    /// Write the snapshot to the requested scope(s). Session write failures
    /// are logged and non-fatal; the cookie copies still go out.
    pub async fn write(
        &mut self,
        snapshot: &IdentitySnapshot,
        refresh_token: Option<&str>,
        scope: StoreScope,
    ) {
        if matches!(scope, StoreScope::Server | StoreScope::All) {
            self.add(ACCESS_TOKEN_COOKIE, snapshot.access_token.clone(), ACCESS_TTL, false);
            if let Some(refresh) = refresh_token {
                self.add(REFRESH_TOKEN_COOKIE, refresh.to_string(), REFRESH_TTL, true);
            }
            if let Some(expires_at) = snapshot.expires_at {
                self.add(
                    TOKEN_EXPIRED_AT_COOKIE,
                    expires_at.to_rfc3339(),
                    ACCESS_TTL,
                    false,
                );
            }
        }

        if matches!(scope, StoreScope::Client | StoreScope::All) {
            self.add(
                CLIENT_ACCESS_TOKEN_COOKIE,
                snapshot.access_token.clone(),
                ACCESS_TTL,
                false,
            );
            if let Some(user_id) = &snapshot.user_id {
                self.add(USER_ID_COOKIE, user_id.clone(), ACCESS_TTL, false);
            }
            if let Some(identifier) = &snapshot.user_identifier {
                self.add(USER_IDENTIFIER_COOKIE, identifier.clone(), ACCESS_TTL, false);
            }
            if let Some(role) = snapshot.role {
                self.add(USER_ROLE_COOKIE, role.as_str().to_string(), ACCESS_TTL, false);
            }
            if !snapshot.brand_logos.is_empty() {
                match serde_json::to_string(&snapshot.brand_logos) {
                    Ok(encoded) => self.add(BRAND_LOGOS_COOKIE, encoded, ACCESS_TTL, false),
                    Err(e) => tracing::warn!(error = %e, "Failed to encode brand logos cookie"),
                }
            }
        }

        if matches!(scope, StoreScope::Local | StoreScope::All) {
            if let Err(e) = self.session.insert("snapshot", snapshot).await {
                tracing::warn!(error = %e, "Session write failed; cookie stores remain authoritative");
            }
        }
    }

    /// Return the first syntactically valid snapshot in preference order.
    /// Expiry and token validity are the resolver's concern, not ours.
    pub async fn read(&self, preference: ReadPreference) -> Option<IdentitySnapshot> {
        let order: &[ReadPreference] = match preference {
            ReadPreference::Any => &[
                ReadPreference::Server,
                ReadPreference::Client,
                ReadPreference::Local,
            ],
            _ => return self.read_one(preference).await,
        };

        for source in order {
            if let Some(snapshot) = self.read_one(*source).await {
                return Some(snapshot);
            }
        }
        None
    }

    async fn read_one(&self, source: ReadPreference) -> Option<IdentitySnapshot> {
        match source {
            ReadPreference::Server => self.snapshot_from_cookie(ACCESS_TOKEN_COOKIE),
            ReadPreference::Client => self.snapshot_from_cookie(CLIENT_ACCESS_TOKEN_COOKIE),
            ReadPreference::Local => self
                .session
                .get::<IdentitySnapshot>("snapshot")
                .await
                .unwrap_or(None),
            ReadPreference::Any => unreachable!("Any is expanded by read()"),
        }
    }

    fn snapshot_from_cookie(&self, token_cookie: &str) -> Option<IdentitySnapshot> {
        let access_token = self.jar.get(token_cookie)?.value().to_string();
        if access_token.is_empty() {
            return None;
        }

        Some(IdentitySnapshot {
            access_token,
            user_id: self.cookie_value(USER_ID_COOKIE),
            user_identifier: self.cookie_value(USER_IDENTIFIER_COOKIE),
            role: self
                .cookie_value(USER_ROLE_COOKIE)
                .and_then(|r| Role::parse(&r)),
            expires_at: self
                .cookie_value(TOKEN_EXPIRED_AT_COOKIE)
                .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
                .map(|dt| dt.with_timezone(&Utc)),
            brand_logos: self
                .cookie_value(BRAND_LOGOS_COOKIE)
                .and_then(|raw| serde_json::from_str(&raw).ok())
                .unwrap_or_default(),
        })
    }

    /// Remove identity material from the requested scope(s). Idempotent:
    /// clearing an empty store is a success.
    pub async fn clear(&mut self, scope: StoreScope) {
        if matches!(scope, StoreScope::Server | StoreScope::Client | StoreScope::All) {
            let names: &[&str] = match scope {
                StoreScope::Server => &[
                    ACCESS_TOKEN_COOKIE,
                    REFRESH_TOKEN_COOKIE,
                    TOKEN_EXPIRED_AT_COOKIE,
                ],
                StoreScope::Client => &[
                    CLIENT_ACCESS_TOKEN_COOKIE,
                    USER_ID_COOKIE,
                    USER_IDENTIFIER_COOKIE,
                    USER_ROLE_COOKIE,
                    BRAND_LOGOS_COOKIE,
                ],
                _ => &ALL_COOKIES,
            };
            for name in names {
                self.jar = self.jar.clone().add(self.removal(name));
            }
        }

        if matches!(scope, StoreScope::Local | StoreScope::All) {
            self.session.clear().await;
        }
    }

    pub async fn presence(&self) -> StorePresence {
        StorePresence {
            server: self.cookie_value(ACCESS_TOKEN_COOKIE).is_some(),
            client: self.cookie_value(CLIENT_ACCESS_TOKEN_COOKIE).is_some(),
            local: self
                .session
                .get::<IdentitySnapshot>("snapshot")
                .await
                .unwrap_or(None)
                .is_some(),
        }
    }

    fn cookie_value(&self, name: &str) -> Option<String> {
        self.jar
            .get(name)
            .map(|c| c.value().to_string())
            .filter(|v| !v.is_empty())
    }

    fn add(&mut self, name: &str, value: String, ttl: Duration, http_only: bool) {
        let cookie = Cookie::build((name.to_string(), value))
            .path("/".to_string())
            .same_site(SameSite::Lax)
            .secure(self.secure)
            .http_only(http_only)
            .max_age(ttl)
            .build();
        self.jar = self.jar.clone().add(cookie);
    }

    fn removal(&self, name: &str) -> Cookie<'static> {
        Cookie::build((name.to_string(), String::new()))
            .path("/".to_string())
            .same_site(SameSite::Lax)
            .secure(self.secure)
            .max_age(Duration::ZERO)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tower_sessions::MemoryStore;

    fn empty_store() -> CredentialStore {
        let session = Session::new(None, Arc::new(MemoryStore::default()), None);
        CredentialStore::new(CookieJar::new(), session, false)
    }

    fn snapshot() -> IdentitySnapshot {
        IdentitySnapshot {
            access_token: "tok123".into(),
            user_id: Some("1".into()),
            user_identifier: Some("bob".into()),
            role: Some(Role::Admin),
            expires_at: None,
            brand_logos: vec!["logo.png".into()],
        }
    }

    #[tokio::test]
    async fn write_all_is_readable_from_every_scope() {
        let mut store = empty_store();
        store.write(&snapshot(), Some("refresh123"), StoreScope::All).await;

        for pref in [
            ReadPreference::Server,
            ReadPreference::Client,
            ReadPreference::Local,
        ] {
            let read = store.read(pref).await.expect("snapshot present");
            assert_eq!(read.access_token, "tok123");
        }

        let jar = store.into_jar();
        assert_eq!(jar.get(ACCESS_TOKEN_COOKIE).unwrap().value(), "tok123");
        assert_eq!(jar.get(USER_ROLE_COOKIE).unwrap().value(), "admin");
        assert_eq!(jar.get(REFRESH_TOKEN_COOKIE).unwrap().value(), "refresh123");
        assert!(jar.get(REFRESH_TOKEN_COOKIE).unwrap().http_only().unwrap_or(false));
    }

    #[tokio::test]
    async fn clear_all_twice_is_idempotent() {
        let mut store = empty_store();
        store.write(&snapshot(), None, StoreScope::All).await;

        store.clear(StoreScope::All).await;
        let after_first: Vec<String> = {
            let presence = store.presence().await;
            assert!(!presence.local);
            store
                .jar
                .iter()
                .map(|c| format!("{}={}", c.name(), c.value()))
                .collect()
        };

        store.clear(StoreScope::All).await;
        let after_second: Vec<String> = store
            .jar
            .iter()
            .map(|c| format!("{}={}", c.name(), c.value()))
            .collect();

        assert_eq!(after_first, after_second);
        assert!(store.read(ReadPreference::Any).await.is_none());
    }

    #[tokio::test]
    async fn read_ignores_cleared_cookie_values() {
        let mut store = empty_store();
        store.write(&snapshot(), None, StoreScope::Server).await;
        store.clear(StoreScope::Server).await;

        assert!(store.read(ReadPreference::Server).await.is_none());
    }

    #[tokio::test]
    async fn scoped_write_leaves_other_scopes_empty() {
        let mut store = empty_store();
        store.write(&snapshot(), None, StoreScope::Client).await;

        assert!(store.read(ReadPreference::Server).await.is_none());
        assert!(store.read(ReadPreference::Local).await.is_none());
        assert!(store.read(ReadPreference::Client).await.is_some());
    }
}
