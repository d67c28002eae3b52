//! Resolved caller identity and the minimum-rank gate (§4.7).

use fleet_core::{Role, UserId};

use crate::error::AuthError;

/// The three ways an inbound request can name an identity; `fleet-server`
/// populates this from headers/cookies, never this crate (§1 non-goal: HTTP
/// plumbing is an external collaborator).
#[derive(Debug, Clone, Default)]
pub struct InboundEnvelope {
    /// `Authorization: Bearer <token>` value, if present.
    pub bearer_token: Option<String>,
    /// Opaque session token from a cookie or header.
    pub session_token: Option<String>,
    /// Legacy invite-tenant token, if the caller presented one.
    pub legacy_invite_token: Option<String>,
}

/// Which of §4.7's three resolution paths produced an [`Identity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentitySource {
    /// Configured `ADMIN_TOKEN` bearer credential.
    AdminToken,
    /// An opaque [`fleet_core::UserSession`] token.
    Session,
    /// A configured legacy invite-tenant token.
    LegacyInvite,
}

/// A resolved caller identity, ready for the minimum-rank gate.
#[derive(Debug, Clone)]
pub struct Identity {
    /// The resolved user id. Synthesized and stable for the admin-token and
    /// legacy-invite paths, since neither corresponds to a `users` row.
    pub user_id: UserId,
    /// Access tier.
    pub role: Role,
    /// Whether the email-verified gate should be honoured; always `true`
    /// for the admin-token path (§4.7: "except admin-token path").
    pub email_verified: bool,
    /// Whether the account is locked.
    pub locked: bool,
    /// Which resolution path produced this identity.
    pub source: IdentitySource,
}

impl Identity {
    /// Apply the auth checks from §4.7: verified-email gate (skipped for
    /// the admin-token path), account-lock gate, then the minimum-rank
    /// comparison.
    pub fn require_rank(&self, minimum: Role) -> Result<(), AuthError> {
        if self.locked {
            return Err(AuthError::AccountLocked(self.user_id.clone()));
        }
        if self.source != IdentitySource::AdminToken && !self.email_verified {
            return Err(AuthError::EmailNotVerified(self.user_id.clone()));
        }
        if !self.role.satisfies(minimum) {
            return Err(AuthError::InsufficientRank {
                have: self.role,
                need: minimum,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(role: Role, source: IdentitySource, verified: bool, locked: bool) -> Identity {
        Identity {
            user_id: UserId::from("u1"),
            role,
            email_verified: verified,
            locked,
            source,
        }
    }

    #[test]
    fn locked_account_blocks_regardless_of_rank() {
        let id = identity(Role::Admiral, IdentitySource::Session, true, true);
        assert!(matches!(id.require_rank(Role::Ensign), Err(AuthError::AccountLocked(_))));
    }

    #[test]
    fn unverified_email_blocks_non_admin_token_paths() {
        let id = identity(Role::Captain, IdentitySource::Session, false, false);
        assert!(matches!(id.require_rank(Role::Ensign), Err(AuthError::EmailNotVerified(_))));
    }

    #[test]
    fn admin_token_path_bypasses_verified_email_gate() {
        let id = identity(Role::Admiral, IdentitySource::AdminToken, false, false);
        assert!(id.require_rank(Role::Admiral).is_ok());
    }

    #[test]
    fn insufficient_rank_is_rejected() {
        let id = identity(Role::Lieutenant, IdentitySource::Session, true, false);
        assert!(matches!(
            id.require_rank(Role::Captain),
            Err(AuthError::InsufficientRank { .. })
        ));
    }

    #[test]
    fn sufficient_rank_passes() {
        let id = identity(Role::Captain, IdentitySource::Session, true, false);
        assert!(id.require_rank(Role::Lieutenant).is_ok());
    }
}
