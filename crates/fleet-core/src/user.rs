//! User, role, and session entities (§3, §4.7).

use crate::ids::{SessionId, UserId};
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Four-tier role hierarchy; ordering matters for the minimum-rank gate
/// (`ensign < lieutenant < captain < admiral`, §4.7).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Lowest rank; default for a freshly signed-up, unverified account.
    Ensign,
    /// Read access to most of the catalog and composition surface.
    Lieutenant,
    /// Can trigger mutating tools subject to trust policy.
    Captain,
    /// Full access, including import and proposal apply/decline routes.
    Admiral,
}

impl Role {
    /// True if `self` meets or exceeds `minimum` in the rank ordering.
    pub fn satisfies(&self, minimum: Role) -> bool {
        *self >= minimum
    }
}

/// A registered account. Never serialises `password_hash` to any boundary
/// (§3 cross-entity invariant) — callers should use [`User::into_public`] at
/// the wire edge rather than deriving `Serialize` directly on this struct,
/// which is why it deliberately does not derive `Serialize`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct User {
    /// Opaque user id.
    pub id: UserId,
    /// Unique, lowercased email address.
    pub email: String,
    /// Display name shown in the UI.
    pub display_name: String,
    /// Access tier.
    pub role: Role,
    /// Whether the email address has been confirmed via [`crate::VerifyToken`].
    pub email_verified: bool,
    /// Set when an operator locks the account; locked accounts fail auth (§4.7).
    pub locked_at: Option<DateTime<Utc>>,
    /// Argon2 password hash. Never emitted at any boundary.
    pub password_hash: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Project to the subset of fields safe to emit across a boundary.
    pub fn into_public(self) -> PublicUser {
        PublicUser {
            id: self.id,
            email: self.email,
            display_name: self.display_name,
            role: self.role,
            email_verified: self.email_verified,
            locked: self.locked_at.is_some(),
            created_at: self.created_at,
        }
    }
}

/// Wire-safe projection of [`User`] with `password_hash` and raw `locked_at`
/// removed.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PublicUser {
    /// Opaque user id.
    pub id: UserId,
    /// Unique, lowercased email address.
    pub email: String,
    /// Display name shown in the UI.
    pub display_name: String,
    /// Access tier.
    pub role: Role,
    /// Whether the email has been confirmed.
    pub email_verified: bool,
    /// Whether the account is currently locked.
    pub locked: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// An opaque-token session created on sign-in (§3). Owned by the `User` it
/// authenticates.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct UserSession {
    /// Opaque random token, at least 128 bits of entropy (§3).
    pub token: SessionId,
    /// Owning user.
    pub user_id: UserId,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last time this session was used to resolve an identity.
    pub last_seen_at: DateTime<Utc>,
    /// Absolute expiry.
    pub expires_at: DateTime<Utc>,
    /// Client IP at creation, if captured.
    pub ip: Option<String>,
    /// Client user agent at creation, if captured.
    pub user_agent: Option<String>,
}

impl UserSession {
    /// True if `now` is at or past `expires_at`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_ordering_matches_rank() {
        assert!(Role::Admiral > Role::Captain);
        assert!(Role::Captain > Role::Lieutenant);
        assert!(Role::Lieutenant > Role::Ensign);
    }

    #[test]
    fn satisfies_is_reflexive_and_monotonic() {
        assert!(Role::Captain.satisfies(Role::Captain));
        assert!(Role::Admiral.satisfies(Role::Lieutenant));
        assert!(!Role::Ensign.satisfies(Role::Lieutenant));
    }

    #[test]
    fn into_public_drops_password_hash() {
        let user = User {
            id: UserId::from("u1"),
            email: "a@b.c".into(),
            display_name: "A".into(),
            role: Role::Ensign,
            email_verified: false,
            locked_at: None,
            password_hash: "super-secret-hash".into(),
            created_at: Utc::now(),
        };
        let public = user.into_public();
        let json = serde_json::to_string(&public).unwrap();
        assert!(!json.contains("super-secret-hash"));
        assert!(!json.contains("password"));
    }

    #[test]
    fn session_expiry_boundary_is_inclusive() {
        let now = Utc::now();
        let session = UserSession {
            token: SessionId::from("tok"),
            user_id: UserId::from("u1"),
            created_at: now,
            last_seen_at: now,
            expires_at: now,
            ip: None,
            user_agent: None,
        };
        assert!(session.is_expired(now), "exact expiry instant is expired");
    }
}
