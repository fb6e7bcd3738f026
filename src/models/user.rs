use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role carried by the upstream identity. Unknown role strings parse to
/// `None`, which callers treat as non-admin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
    Superadmin,
}

impl Role {
    pub fn parse(value: &str) -> Option<Role> {
        match value {
            "user" => Some(Role::User),
            "admin" => Some(Role::Admin),
            "superadmin" => Some(Role::Superadmin),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
            Role::Superadmin => "superadmin",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin | Role::Superadmin)
    }
}

/// The identity fields replicated across the credential stores. One copy per
/// store scope; the resolver reconciles copies that drift apart.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentitySnapshot {
    pub access_token: String,
    pub user_id: Option<String>,
    pub user_identifier: Option<String>,
    pub role: Option<Role>,
    pub expires_at: Option<DateTime<Utc>>,
    pub brand_logos: Vec<String>,
}

impl IdentitySnapshot {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            ..Default::default()
        }
    }

    /// True when the snapshot carries enough identity to assemble a user
    /// without asking the upstream who the token belongs to.
    pub fn has_identity(&self) -> bool {
        self.user_id.is_some() && self.user_identifier.is_some()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }
}

/// Canonical resolved identity. Only ever produced by a successful
/// resolution; a failed resolution yields no user at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: String,
    pub identifier: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub role: Role,
    #[serde(default)]
    pub brand_logos: Vec<String>,
}

/// Upstream `/users/me` response shape.
#[derive(Debug, Clone, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub identifier: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub brand_logos: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_role_does_not_parse() {
        assert_eq!(Role::parse("admin"), Some(Role::Admin));
        assert_eq!(Role::parse("root"), None);
        assert_eq!(Role::parse(""), None);
    }

    #[test]
    fn superadmin_counts_as_admin() {
        assert!(Role::Superadmin.is_admin());
        assert!(Role::Admin.is_admin());
        assert!(!Role::User.is_admin());
    }

    #[test]
    fn snapshot_without_user_fields_needs_resolution() {
        let snapshot = IdentitySnapshot::new("tok");
        assert!(!snapshot.has_identity());

        let mut full = IdentitySnapshot::new("tok");
        full.user_id = Some("1".into());
        full.user_identifier = Some("bob".into());
        assert!(full.has_identity());
    }

    #[test]
    fn expiry_check_uses_timestamp() {
        let mut snapshot = IdentitySnapshot::new("tok");
        assert!(!snapshot.is_expired(Utc::now()));

        snapshot.expires_at = Some(Utc::now() - chrono::Duration::minutes(1));
        assert!(snapshot.is_expired(Utc::now()));
    }
}
