//! Session resolver.
//!
//! Collapses the replicated credential stores into one canonical
//! `CurrentUser`, or `None` when nothing resolvable is present. "Not
//! authenticated" is a value here, never an error; an error means the
//! upstream could not be consulted and the caller should offer a retry
//! instead of redirecting to login.

use chrono::{DateTime, TimeZone, Utc};

use crate::auth::store::{CredentialStore, ReadPreference, StoreScope};
use crate::error::AppError;
use crate::models::user::{CurrentUser, IdentitySnapshot, Role, UserProfile};
use crate::services::backend_client::{upstream_error, BackendClient};
use crate::utils::jwt::decode_jwt_claims;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveContext {
    /// Server-executed reads prefer the httpOnly cookie material.
    Server,
    /// Browser-context reads prefer the local store, then client cookies.
    Browser,
}

fn read_order(context: ResolveContext) -> [ReadPreference; 3] {
    match context {
        ResolveContext::Server => [
            ReadPreference::Server,
            ReadPreference::Client,
            ReadPreference::Local,
        ],
        ResolveContext::Browser => [
            ReadPreference::Local,
            ReadPreference::Client,
            ReadPreference::Server,
        ],
    }
}

/// Return the bearer token of the preferred snapshot without consulting the
/// upstream. Used by the proxy, which only needs the credential itself.
pub async fn peek_token(store: &CredentialStore, context: ResolveContext) -> Option<String> {
    for source in read_order(context) {
        if let Some(snapshot) = store.read(source).await {
            if snapshot.is_expired(Utc::now()) {
                return None;
            }
            return Some(snapshot.access_token);
        }
    }
    None
}

/// Resolve the current user.
///
/// 1. Read snapshots in the order appropriate to `context`.
/// 2. No snapshot: `Ok(None)`.
/// 3. An expired snapshot destroys the credential everywhere.
/// 4. Identity embedded in cookies or JWT claims is used as-is; otherwise
///    the upstream is asked who the token belongs to. A 401 there clears all
///    stores and resolves to `Ok(None)`; a transport failure is an error.
/// 5. Stores that were missing the snapshot, or disagreed with the preferred
///    source, are written through so every copy converges.
pub async fn resolve(
    store: &mut CredentialStore,
    backend: &BackendClient,
    context: ResolveContext,
) -> Result<Option<CurrentUser>, AppError> {
    let order = read_order(context);

    let mut copies: [Option<IdentitySnapshot>; 3] = [None, None, None];
    for (slot, source) in copies.iter_mut().zip(order) {
        *slot = store.read(source).await;
    }

    let Some(mut snapshot) = copies.iter().flatten().next().cloned() else {
        return Ok(None);
    };

    // Expired credentials are destroyed, not resolved.
    if snapshot.is_expired(Utc::now()) {
        store.clear(StoreScope::All).await;
        return Ok(None);
    }

    let diverged = copies
        .iter()
        .flatten()
        .any(|copy| copy.access_token != snapshot.access_token);
    let gap = copies.iter().any(Option::is_none);

    let mut enriched = enrich_from_claims(&mut snapshot);

    let user = if snapshot.has_identity() && snapshot.role.is_some() {
        CurrentUser {
            id: snapshot.user_id.clone().unwrap_or_default(),
            identifier: snapshot.user_identifier.clone().unwrap_or_default(),
            name: None,
            email: None,
            role: snapshot.role.unwrap_or_default(),
            brand_logos: snapshot.brand_logos.clone(),
        }
    } else {
        match who_am_i(store, backend, &snapshot).await? {
            Some(profile) => {
                // Freshly fetched fields win; cached snapshot fields fill gaps.
                snapshot.user_id = Some(profile.id.clone());
                snapshot.user_identifier = Some(profile.identifier.clone());
                snapshot.role = profile.role.or(snapshot.role);
                if let Some(logos) = &profile.brand_logos {
                    snapshot.brand_logos = logos.clone();
                }
                enriched = true;

                CurrentUser {
                    id: profile.id,
                    identifier: profile.identifier,
                    name: profile.name,
                    email: profile.email,
                    role: snapshot.role.unwrap_or_default(),
                    brand_logos: snapshot.brand_logos.clone(),
                }
            }
            None => return Ok(None),
        }
    };

    if diverged || gap || enriched {
        store.write(&snapshot, None, StoreScope::All).await;
    }

    Ok(Some(user))
}

/// Fill identity fields from unverified JWT claims where the cookies carry
/// none. Returns whether anything was added.
fn enrich_from_claims(snapshot: &mut IdentitySnapshot) -> bool {
    if snapshot.has_identity() && snapshot.role.is_some() {
        return false;
    }

    let Ok(claims) = decode_jwt_claims(&snapshot.access_token) else {
        return false;
    };

    let mut enriched = false;
    if snapshot.user_id.is_none() {
        if let Some(sub) = claims.sub {
            snapshot.user_id = Some(sub);
            enriched = true;
        }
    }
    if snapshot.user_identifier.is_none() {
        if let Some(identifier) = claims.identifier.or(claims.email) {
            snapshot.user_identifier = Some(identifier);
            enriched = true;
        }
    }
    if snapshot.role.is_none() {
        if let Some(role) = claims.role.as_deref().and_then(Role::parse) {
            snapshot.role = Some(role);
            enriched = true;
        }
    }
    if snapshot.expires_at.is_none() {
        if let Some(exp) = claims.exp.and_then(timestamp_to_datetime) {
            snapshot.expires_at = Some(exp);
            enriched = true;
        }
    }
    enriched
}

fn timestamp_to_datetime(exp: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(exp, 0).single()
}

/// Ask the upstream who the token belongs to. 401 means the token is dead:
/// clear everything and report "no user". Transport failures propagate so
/// callers can distinguish "retry later" from "log in again".
async fn who_am_i(
    store: &mut CredentialStore,
    backend: &BackendClient,
    snapshot: &IdentitySnapshot,
) -> Result<Option<UserProfile>, AppError> {
    let response = backend
        .get_with_auth("/api/v1/users/me", &snapshot.access_token)
        .await?;

    if response.status() == reqwest::StatusCode::UNAUTHORIZED {
        tracing::info!("Stale credential rejected upstream; clearing all stores");
        store.clear(StoreScope::All).await;
        return Ok(None);
    }

    if !response.status().is_success() {
        return Err(upstream_error(response).await);
    }

    let profile = response
        .json::<UserProfile>()
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Malformed who-am-I response: {}", e)))?;

    Ok(Some(profile))
}
