// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! Identity resolution, session lifecycle, and password handling (§3, §4.7).
//!
//! [`AuthStore`] owns the global `users` table (an admin-pool concern: the
//! `User` entity itself carries no `owner`, per §3's data model table) and
//! the per-user, RLS-isolated `user_sessions`/`verify_tokens` tables.
//! [`AuthStore::resolve_identity`] realizes the three-path resolution order
//! from §4.7: a configured admin bearer token, an opaque session token, or a
//! configured legacy invite-tenant token — first match wins.
//!
//! Session/verify-token lookup by opaque token value is inherently a
//! cross-user operation (the caller presents a secret; which user it
//! belongs to is exactly what must be discovered), which the row-level
//! security model in `fleet-db` structurally cannot answer with a single
//! scoped query. This crate resolves that the same way `fleet-proposal`'s
//! `expire_stale` already does: enumerate the global `users` table and
//! probe each user's scope in turn. See `DESIGN.md` for the tradeoff this
//! implies.

mod error;
mod identity;
mod password;

pub use error::AuthError;
pub use identity::{Identity, IdentitySource, InboundEnvelope};
pub use password::{hash as hash_password, verify as verify_password};

use chrono::{DateTime, Duration, Utc};
use fleet_config::FleetConfig;
use fleet_core::{Role, User, UserId, UserSession, VerifyToken, VerifyTokenType};
use fleet_db::Db;
use rand::RngCore;
use sqlx::FromRow;
use std::sync::Arc;

/// How long a freshly minted session token remains valid.
const SESSION_TTL: Duration = Duration::hours(24);
/// How long an email-verification token remains redeemable.
const VERIFY_TOKEN_TTL: Duration = Duration::hours(48);
/// How long a password-reset token remains redeemable.
const RESET_TOKEN_TTL: Duration = Duration::hours(1);

/// Sink for one-shot verify/reset tokens in non-production deployments,
/// where no SMTP delivery is configured and a caller still needs a way to
/// retrieve the token (§9 design notes: "dev-mode verify-token cache...
/// passed to constructors", not a module-level global).
pub trait DevTokenSink: Send + Sync {
    /// Record a freshly minted token for out-of-band retrieval.
    fn record(&self, token: &VerifyToken);
}

/// A [`DevTokenSink`] that discards every token; the default for
/// deployments where email delivery actually works.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTokenSink;

impl DevTokenSink for NoopTokenSink {
    fn record(&self, _token: &VerifyToken) {}
}

fn random_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::Ensign => "ensign",
        Role::Lieutenant => "lieutenant",
        Role::Captain => "captain",
        Role::Admiral => "admiral",
    }
}

fn parse_role(s: &str) -> Result<Role, AuthError> {
    match s {
        "ensign" => Ok(Role::Ensign),
        "lieutenant" => Ok(Role::Lieutenant),
        "captain" => Ok(Role::Captain),
        "admiral" => Ok(Role::Admiral),
        other => Err(AuthError::Corrupt(format!("unknown role {other}"))),
    }
}

fn token_type_str(t: VerifyTokenType) -> &'static str {
    match t {
        VerifyTokenType::Verify => "verify",
        VerifyTokenType::Reset => "reset",
    }
}

fn parse_token_type(s: &str) -> Result<VerifyTokenType, AuthError> {
    match s {
        "verify" => Ok(VerifyTokenType::Verify),
        "reset" => Ok(VerifyTokenType::Reset),
        other => Err(AuthError::Corrupt(format!("unknown token type {other}"))),
    }
}

#[derive(FromRow)]
struct UserRow {
    id: String,
    email: String,
    display_name: String,
    role: String,
    email_verified: bool,
    locked_at: Option<DateTime<Utc>>,
    password_hash: String,
    created_at: DateTime<Utc>,
}

impl UserRow {
    fn into_user(self) -> Result<User, AuthError> {
        Ok(User {
            id: UserId::from(self.id),
            email: self.email,
            display_name: self.display_name,
            role: parse_role(&self.role)?,
            email_verified: self.email_verified,
            locked_at: self.locked_at,
            password_hash: self.password_hash,
            created_at: self.created_at,
        })
    }
}

const USER_COLUMNS: &str = "id, email, display_name, role, email_verified, locked_at, \
                             password_hash, created_at";

#[derive(FromRow)]
struct SessionRow {
    token: String,
    user_id: String,
    created_at: DateTime<Utc>,
    last_seen_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    ip: Option<String>,
    user_agent: Option<String>,
}

impl SessionRow {
    fn into_session(self) -> UserSession {
        UserSession {
            token: fleet_core::SessionId::from(self.token),
            user_id: UserId::from(self.user_id),
            created_at: self.created_at,
            last_seen_at: self.last_seen_at,
            expires_at: self.expires_at,
            ip: self.ip,
            user_agent: self.user_agent,
        }
    }
}

const SESSION_COLUMNS: &str = "token, user_id, created_at, last_seen_at, expires_at, ip, user_agent";

#[derive(FromRow)]
struct TokenRow {
    token: String,
    user_id: String,
    token_type: String,
    expires_at: DateTime<Utc>,
    consumed_at: Option<DateTime<Utc>>,
}

impl TokenRow {
    fn into_token(self) -> Result<VerifyToken, AuthError> {
        Ok(VerifyToken {
            token: fleet_core::TokenId::from(self.token),
            token_type: parse_token_type(&self.token_type)?,
            user_id: UserId::from(self.user_id),
            expires_at: self.expires_at,
            consumed_at: self.consumed_at,
        })
    }
}

const TOKEN_COLUMNS: &str = "token, user_id, token_type, expires_at, consumed_at";

/// Top-level store handle, constructed once at startup.
#[derive(Clone)]
pub struct AuthStore {
    db: Db,
    dev_sink: Arc<dyn DevTokenSink>,
}

impl AuthStore {
    /// Wrap an already-connected [`Db`], discarding dev-mode tokens.
    pub fn new(db: Db) -> Self {
        Self::with_dev_sink(db, Arc::new(NoopTokenSink))
    }

    /// Wrap an already-connected [`Db`] with a [`DevTokenSink`] that can
    /// capture verify/reset tokens for environments with no SMTP delivery.
    pub fn with_dev_sink(db: Db, dev_sink: Arc<dyn DevTokenSink>) -> Self {
        Self { db, dev_sink }
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AuthError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        let row = sqlx::query_as::<_, UserRow>(&query)
            .bind(email)
            .fetch_optional(self.db.admin_pool())
            .await
            .map_err(fleet_db::DbError::Connect)?;
        row.map(UserRow::into_user).transpose()
    }

    async fn find_user_by_id(&self, user_id: &UserId) -> Result<Option<User>, AuthError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let row = sqlx::query_as::<_, UserRow>(&query)
            .bind(user_id.as_str())
            .fetch_optional(self.db.admin_pool())
            .await
            .map_err(fleet_db::DbError::Connect)?;
        row.map(UserRow::into_user).transpose()
    }

    async fn all_user_ids(&self) -> Result<Vec<UserId>, AuthError> {
        let ids: Vec<String> = sqlx::query_scalar("SELECT id FROM users")
            .fetch_all(self.db.admin_pool())
            .await
            .map_err(fleet_db::DbError::Connect)?;
        Ok(ids.into_iter().map(UserId::from).collect())
    }

    /// Create a new `ensign`-tier account with a lowercased email and a
    /// freshly hashed password, plus a verify token the caller should
    /// deliver by email (§3 sign-up lifecycle, §8 scenario 1).
    ///
    /// # Errors
    ///
    /// [`AuthError::EmailTaken`] if the lowercased email is already
    /// registered.
    pub async fn sign_up(
        &self,
        email: &str,
        raw_password: &str,
        display_name: &str,
    ) -> Result<(User, VerifyToken), AuthError> {
        let email = email.trim().to_ascii_lowercase();
        if self.find_user_by_email(&email).await?.is_some() {
            return Err(AuthError::EmailTaken);
        }

        let password_hash = password::hash(raw_password)?;
        let now = Utc::now();
        let user = User {
            id: UserId::from(uuid::Uuid::new_v4().to_string()),
            email,
            display_name: display_name.to_string(),
            role: Role::Ensign,
            email_verified: false,
            locked_at: None,
            password_hash,
            created_at: now,
        };

        sqlx::query(
            "INSERT INTO users (id, email, display_name, role, email_verified, password_hash, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(user.id.as_str())
        .bind(&user.email)
        .bind(&user.display_name)
        .bind(role_str(user.role))
        .bind(user.email_verified)
        .bind(&user.password_hash)
        .bind(user.created_at)
        .execute(self.db.admin_pool())
        .await
        .map_err(fleet_db::DbError::Connect)?;

        let token = self.issue_token(&user.id, VerifyTokenType::Verify, VERIFY_TOKEN_TTL).await?;
        self.dev_sink.record(&token);

        Ok((user, token))
    }

    async fn issue_token(
        &self,
        user_id: &UserId,
        token_type: VerifyTokenType,
        ttl: Duration,
    ) -> Result<VerifyToken, AuthError> {
        let token = VerifyToken {
            token: fleet_core::TokenId::from(random_token()),
            token_type,
            user_id: user_id.clone(),
            expires_at: Utc::now() + ttl,
            consumed_at: None,
        };

        let token_v = token.clone();
        self.db
            .with_user_scope(user_id, move |tx| {
                Box::pin(async move {
                    sqlx::query(
                        "INSERT INTO verify_tokens (id, user_id, token_type, token, expires_at) \
                         VALUES ($1, $2, $3, $4, $5)",
                    )
                    .bind(uuid::Uuid::new_v4().to_string())
                    .bind(token_v.user_id.as_str())
                    .bind(token_type_str(token_v.token_type))
                    .bind(token_v.token.as_str())
                    .bind(token_v.expires_at)
                    .execute(&mut **tx)
                    .await
                    .map_err(fleet_db::DbError::Connect)
                })
            })
            .await?;

        Ok(token)
    }

    /// Find a one-shot token by its secret value, scanning every user's
    /// scope. See the crate-level docs for why this cannot be a single
    /// scoped query.
    async fn find_token(&self, token: &str) -> Result<Option<VerifyToken>, AuthError> {
        let query = format!("SELECT {TOKEN_COLUMNS} FROM verify_tokens WHERE token = $1");
        for user_id in self.all_user_ids().await? {
            let query = query.clone();
            let token_owned = token.to_string();
            let row = self
                .db
                .with_user_read(&user_id, move |tx| {
                    Box::pin(async move {
                        sqlx::query_as::<_, TokenRow>(&query)
                            .bind(token_owned)
                            .fetch_optional(&mut **tx)
                            .await
                            .map_err(fleet_db::DbError::Connect)
                    })
                })
                .await?;
            if let Some(row) = row {
                return row.into_token().map(Some);
            }
        }
        Ok(None)
    }

    async fn consume_token(&self, token: &VerifyToken) -> Result<(), AuthError> {
        let user_id = token.user_id.clone();
        let token_s = token.token.as_str().to_string();
        let now = Utc::now();
        self.db
            .with_user_scope(&user_id, move |tx| {
                Box::pin(async move {
                    sqlx::query("UPDATE verify_tokens SET consumed_at = $1 WHERE token = $2")
                        .bind(now)
                        .bind(token_s)
                        .execute(&mut **tx)
                        .await
                        .map_err(fleet_db::DbError::Connect)
                })
            })
            .await?;
        Ok(())
    }

    /// Redeem an email-verification token, setting `email_verified = true`
    /// on the owning user. A second redemption of the same token fails
    /// (§8: "password reset token that has been used once is rejected on
    /// second use with `INVALID_PARAM`" — the same one-shot rule applies to
    /// verify tokens).
    pub async fn verify_email(&self, token: &str) -> Result<User, AuthError> {
        let tok = self.find_token(token).await?.ok_or(AuthError::InvalidToken)?;
        if tok.token_type != VerifyTokenType::Verify || tok.is_spent(Utc::now()) {
            return Err(AuthError::InvalidToken);
        }

        self.consume_token(&tok).await?;

        sqlx::query("UPDATE users SET email_verified = true WHERE id = $1")
            .bind(tok.user_id.as_str())
            .execute(self.db.admin_pool())
            .await
            .map_err(fleet_db::DbError::Connect)?;

        self.find_user_by_id(&tok.user_id)
            .await?
            .ok_or(AuthError::InvalidToken)
    }

    /// Verify credentials and mint a fresh session token (§3, §8 scenario
    /// 1). Requires a verified, unlocked account.
    pub async fn sign_in(
        &self,
        email: &str,
        raw_password: &str,
        ip: Option<String>,
        user_agent: Option<String>,
    ) -> Result<(User, UserSession), AuthError> {
        let email = email.trim().to_ascii_lowercase();
        let user = self
            .find_user_by_email(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !password::verify(raw_password, &user.password_hash).unwrap_or(false) {
            return Err(AuthError::InvalidCredentials);
        }
        if user.locked_at.is_some() {
            return Err(AuthError::AccountLocked(user.id.clone()));
        }
        if !user.email_verified {
            return Err(AuthError::EmailNotVerified(user.id.clone()));
        }

        let now = Utc::now();
        let session = UserSession {
            token: fleet_core::SessionId::from(random_token()),
            user_id: user.id.clone(),
            created_at: now,
            last_seen_at: now,
            expires_at: now + SESSION_TTL,
            ip,
            user_agent,
        };

        let session_v = session.clone();
        self.db
            .with_user_scope(&user.id, move |tx| {
                Box::pin(async move {
                    sqlx::query(
                        "INSERT INTO user_sessions \
                         (token, user_id, created_at, last_seen_at, expires_at, ip, user_agent) \
                         VALUES ($1, $2, $3, $4, $5, $6, $7)",
                    )
                    .bind(session_v.token.as_str())
                    .bind(session_v.user_id.as_str())
                    .bind(session_v.created_at)
                    .bind(session_v.last_seen_at)
                    .bind(session_v.expires_at)
                    .bind(session_v.ip)
                    .bind(session_v.user_agent)
                    .execute(&mut **tx)
                    .await
                    .map_err(fleet_db::DbError::Connect)
                })
            })
            .await?;

        Ok((user, session))
    }

    /// Find a session by its opaque token, scanning every user's scope (see
    /// crate docs). Returns `None` for an unknown or expired token.
    async fn find_session(&self, token: &str) -> Result<Option<UserSession>, AuthError> {
        let query = format!("SELECT {SESSION_COLUMNS} FROM user_sessions WHERE token = $1");
        for user_id in self.all_user_ids().await? {
            let query = query.clone();
            let token_owned = token.to_string();
            let row = self
                .db
                .with_user_read(&user_id, move |tx| {
                    Box::pin(async move {
                        sqlx::query_as::<_, SessionRow>(&query)
                            .bind(token_owned)
                            .fetch_optional(&mut **tx)
                            .await
                            .map_err(fleet_db::DbError::Connect)
                    })
                })
                .await?;
            if let Some(row) = row {
                return Ok(Some(row.into_session()));
            }
        }
        Ok(None)
    }

    async fn touch_session(&self, session: &UserSession) -> Result<(), AuthError> {
        let user_id = session.user_id.clone();
        let token_s = session.token.as_str().to_string();
        let now = Utc::now();
        self.db
            .with_user_scope(&user_id, move |tx| {
                Box::pin(async move {
                    sqlx::query("UPDATE user_sessions SET last_seen_at = $1 WHERE token = $2")
                        .bind(now)
                        .bind(token_s)
                        .execute(&mut **tx)
                        .await
                        .map_err(fleet_db::DbError::Connect)
                })
            })
            .await?;
        Ok(())
    }

    /// Destroy one session by token (`logout`).
    pub async fn logout(&self, user_id: &UserId, token: &str) -> Result<(), AuthError> {
        let token = token.to_string();
        self.db
            .with_user_scope(user_id, move |tx| {
                Box::pin(async move {
                    sqlx::query("DELETE FROM user_sessions WHERE token = $1")
                        .bind(token)
                        .execute(&mut **tx)
                        .await
                        .map_err(fleet_db::DbError::Connect)
                })
            })
            .await?;
        Ok(())
    }

    /// Destroy every session for `user_id` (`logout-all`, and the
    /// "destroyed on ... password change" rule in §3).
    pub async fn logout_all(&self, user_id: &UserId) -> Result<u64, AuthError> {
        let affected = self
            .db
            .with_user_scope(user_id, move |tx| {
                Box::pin(async move {
                    sqlx::query("DELETE FROM user_sessions")
                        .execute(&mut **tx)
                        .await
                        .map_err(fleet_db::DbError::Connect)
                })
            })
            .await?;
        Ok(affected.rows_affected())
    }

    /// Destroy every session for `user_id` except `keep_token` (used by
    /// `change-password`, which keeps the caller's own current session
    /// alive per §3: "destroyed on ... password change (other-than-current)").
    pub async fn logout_all_except(&self, user_id: &UserId, keep_token: &str) -> Result<u64, AuthError> {
        let keep = keep_token.to_string();
        let affected = self
            .db
            .with_user_scope(user_id, move |tx| {
                Box::pin(async move {
                    sqlx::query("DELETE FROM user_sessions WHERE token <> $1")
                        .bind(keep)
                        .execute(&mut **tx)
                        .await
                        .map_err(fleet_db::DbError::Connect)
                })
            })
            .await?;
        Ok(affected.rows_affected())
    }

    /// Verify the current password, set a new hash, and destroy every other
    /// session (§3).
    pub async fn change_password(
        &self,
        user_id: &UserId,
        current_password: &str,
        new_password: &str,
        current_token: &str,
    ) -> Result<(), AuthError> {
        let user = self
            .find_user_by_id(user_id)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !password::verify(current_password, &user.password_hash).unwrap_or(false) {
            return Err(AuthError::InvalidCredentials);
        }

        let new_hash = password::hash(new_password)?;
        sqlx::query("UPDATE users SET password_hash = $1 WHERE id = $2")
            .bind(&new_hash)
            .bind(user_id.as_str())
            .execute(self.db.admin_pool())
            .await
            .map_err(fleet_db::DbError::Connect)?;

        self.logout_all_except(user_id, current_token).await?;
        Ok(())
    }

    /// Issue a reset token for `email` if a matching account exists.
    /// Returns `Ok(None)` for an unknown email rather than an error, so
    /// callers do not leak account existence through this endpoint.
    pub async fn forgot_password(&self, email: &str) -> Result<Option<VerifyToken>, AuthError> {
        let email = email.trim().to_ascii_lowercase();
        let Some(user) = self.find_user_by_email(&email).await? else {
            return Ok(None);
        };
        let token = self.issue_token(&user.id, VerifyTokenType::Reset, RESET_TOKEN_TTL).await?;
        self.dev_sink.record(&token);
        Ok(Some(token))
    }

    /// Redeem a reset token, set a new password hash, and destroy every
    /// session for the account (a reset should invalidate anything a
    /// possible attacker already holds).
    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<User, AuthError> {
        let tok = self.find_token(token).await?.ok_or(AuthError::InvalidToken)?;
        if tok.token_type != VerifyTokenType::Reset || tok.is_spent(Utc::now()) {
            return Err(AuthError::InvalidToken);
        }

        self.consume_token(&tok).await?;

        let new_hash = password::hash(new_password)?;
        sqlx::query("UPDATE users SET password_hash = $1 WHERE id = $2")
            .bind(&new_hash)
            .bind(tok.user_id.as_str())
            .execute(self.db.admin_pool())
            .await
            .map_err(fleet_db::DbError::Connect)?;

        self.logout_all(&tok.user_id).await?;

        self.find_user_by_id(&tok.user_id)
            .await?
            .ok_or(AuthError::InvalidToken)
    }

    /// Lock or unlock an account (operator action; no dedicated route in
    /// §6 but named in §3's `User` lifecycle — exposed here for an admin
    /// tool to call).
    pub async fn set_locked(&self, user_id: &UserId, locked: bool) -> Result<(), AuthError> {
        let locked_at = locked.then(Utc::now);
        sqlx::query("UPDATE users SET locked_at = $1 WHERE id = $2")
            .bind(locked_at)
            .bind(user_id.as_str())
            .execute(self.db.admin_pool())
            .await
            .map_err(fleet_db::DbError::Connect)?;
        if locked {
            self.logout_all(user_id).await?;
        }
        Ok(())
    }

    /// Permanently remove a user and everything owned by them: sessions,
    /// overlays, receipts, proposals, and the rest of the per-user tables
    /// — the RLS `user_isolation` policy does not stop an admin-pool
    /// `DELETE ... WHERE user_id = $1` issued outside any scope, since that
    /// statement names the user explicitly rather than relying on
    /// `current_setting`. (§3: "deleted cascades sessions, overlays,
    /// receipts, proposals"; §8: "a subsequent request with that user's
    /// cookie returns UNAUTHORIZED".)
    pub async fn delete_user(&self, user_id: &UserId) -> Result<(), AuthError> {
        const PER_USER_TABLES: &[&str] = &[
            "user_sessions",
            "verify_tokens",
            "officer_overlays",
            "ship_overlays",
            "bridge_cores",
            "below_deck_policies",
            "loadouts",
            "loadout_variants",
            "docks",
            "plan_items",
            "targets",
            "mutation_proposals",
            "import_receipts",
            "behavior_rules",
            "chat_sessions",
            "frames",
            "policy_overrides",
        ];

        let mut tx = self
            .db
            .admin_pool()
            .begin()
            .await
            .map_err(fleet_db::DbError::Connect)?;

        // These table names are a fixed, code-reviewed allow-list (never
        // caller input), so interpolating them is the documented exception
        // in SPEC_FULL.md §9 ("a fixed allow-list for table names").
        for table in PER_USER_TABLES {
            let stmt = format!("DELETE FROM {table} WHERE user_id = $1");
            sqlx::query(&stmt)
                .bind(user_id.as_str())
                .execute(&mut *tx)
                .await
                .map_err(fleet_db::DbError::Connect)?;
        }

        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(fleet_db::DbError::Connect)?;

        tx.commit().await.map_err(fleet_db::DbError::Connect)?;
        Ok(())
    }

    /// Realize §4.7's three-path resolution order. First match wins.
    pub async fn resolve_identity(
        &self,
        envelope: &InboundEnvelope,
        config: &FleetConfig,
    ) -> Result<Identity, AuthError> {
        if let (Some(configured), Some(presented)) =
            (config.admin_token.as_deref(), envelope.bearer_token.as_deref())
        {
            if !configured.is_empty() && constant_time_eq(configured, presented) {
                return Ok(Identity {
                    user_id: UserId::from("admin"),
                    role: Role::Admiral,
                    email_verified: true,
                    locked: false,
                    source: IdentitySource::AdminToken,
                });
            }
        }

        if let Some(token) = envelope.session_token.as_deref() {
            if let Some(session) = self.find_session(token).await? {
                let now = Utc::now();
                if session.is_expired(now) {
                    return Err(AuthError::Unauthorized);
                }
                self.touch_session(&session).await?;
                let user = self
                    .find_user_by_id(&session.user_id)
                    .await?
                    .ok_or(AuthError::Unauthorized)?;
                return Ok(Identity {
                    user_id: user.id,
                    role: user.role,
                    email_verified: user.email_verified,
                    locked: user.locked_at.is_some(),
                    source: IdentitySource::Session,
                });
            }
        }

        if let (Some(configured), Some(presented)) = (
            config.legacy_invite_token.as_deref(),
            envelope.legacy_invite_token.as_deref(),
        ) {
            if !configured.is_empty() && constant_time_eq(configured, presented) {
                return Ok(Identity {
                    user_id: UserId::from("legacy-invite-tenant"),
                    role: Role::Lieutenant,
                    email_verified: true,
                    locked: false,
                    source: IdentitySource::LegacyInvite,
                });
            }
        }

        Err(AuthError::Unauthorized)
    }
}

/// Constant-time string comparison for bearer-token matching (§4.7).
fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_token_has_at_least_128_bits_of_hex_entropy() {
        let token = random_token();
        assert_eq!(token.len(), 64, "32 bytes hex-encoded is 64 chars (256 bits)");
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn random_tokens_are_distinct() {
        assert_ne!(random_token(), random_token());
    }

    #[test]
    fn role_round_trips_through_str() {
        for role in [Role::Ensign, Role::Lieutenant, Role::Captain, Role::Admiral] {
            assert_eq!(parse_role(role_str(role)).unwrap(), role);
        }
    }

    #[test]
    fn token_type_round_trips_through_str() {
        for t in [VerifyTokenType::Verify, VerifyTokenType::Reset] {
            assert_eq!(parse_token_type(token_type_str(t)).unwrap(), t);
        }
    }

    #[test]
    fn constant_time_eq_matches_equal_strings() {
        assert!(constant_time_eq("abc123", "abc123"));
    }

    #[test]
    fn constant_time_eq_rejects_different_lengths() {
        assert!(!constant_time_eq("abc", "abcd"));
    }

    #[test]
    fn constant_time_eq_rejects_different_content() {
        assert!(!constant_time_eq("abc123", "abc124"));
    }
}
