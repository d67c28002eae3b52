// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! Trust-tier policy engine: decides, per `(tool, user)`, whether a
//! mutating tool call is `auto`, `approve`, or `block` (§4.6).
//!
//! Resolution order is strict and short-circuiting:
//!
//! 1. A per-user override row in `policy_overrides` — the mere existence of
//!    a `(user_id, tool_name)` row *is* the "provenance=user" signal from
//!    §4.6 step 1; there is no separate provenance column because an
//!    absent row already means "fall through".
//! 2. The system default map, built once via [`TrustPolicy::with_defaults`]
//!    and shared process-wide (it is read-only after construction, so it
//!    does not need to be a store).
//! 3. `approve`, for any mutating tool the default map does not classify.
//!
//! A database failure while reading step 1 falls through to step 2 rather
//! than surfacing as an error — §4.6's "never treat a policy-system
//! failure as `auto`" means a failure must be at least as strict as
//! whatever the default map says, never more permissive.

mod error;

pub use error::PolicyError;

use fleet_core::UserId;
use fleet_db::Db;
use std::collections::HashMap;

/// Policy verdict for a given `(tool, user)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrustTier {
    /// Execute the full apply path directly, no confirmation required.
    Auto,
    /// Create a proposal and wait for the user to confirm.
    Approve,
    /// Refuse the call outright.
    Block,
}

impl TrustTier {
    fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Approve => "approve",
            Self::Block => "block",
        }
    }

    fn parse(s: &str) -> Result<Self, PolicyError> {
        match s {
            "auto" => Ok(Self::Auto),
            "approve" => Ok(Self::Approve),
            "block" => Ok(Self::Block),
            other => Err(PolicyError::Corrupt(format!("unknown trust tier {other}"))),
        }
    }
}

/// The system default classification map (§4.6 step 2). Built once at
/// startup and shared read-only; extending the map is the only way to
/// classify a new tool without a per-user override.
#[derive(Debug, Clone)]
pub struct TrustPolicy {
    defaults: HashMap<String, TrustTier>,
}

impl TrustPolicy {
    /// The enumerated default classification, per §4.6 and the worked
    /// scenarios in §8: `activate_preset` is `block` by default,
    /// `create_loadout` requires confirmation, and read-only tools never
    /// reach this map at all (they bypass the proposal path before
    /// `resolve` is ever called, per §4.5's mutation-tool classification).
    pub fn with_defaults() -> Self {
        let mut defaults = HashMap::new();
        defaults.insert("activate_preset".to_string(), TrustTier::Block);
        defaults.insert("delete_loadout".to_string(), TrustTier::Block);
        defaults.insert("delete_target".to_string(), TrustTier::Block);
        defaults.insert("create_loadout".to_string(), TrustTier::Approve);
        defaults.insert("update_loadout".to_string(), TrustTier::Approve);
        defaults.insert("assign_bridge_core".to_string(), TrustTier::Approve);
        defaults.insert("create_target".to_string(), TrustTier::Auto);
        defaults.insert("update_target".to_string(), TrustTier::Auto);
        defaults.insert("complete_target".to_string(), TrustTier::Auto);
        defaults.insert("sync_overlay".to_string(), TrustTier::Auto);
        Self { defaults }
    }

    /// The default tier for `tool`, or [`TrustTier::Approve`] if
    /// unclassified (§4.6 step 3, and the testable property in §7: "∀
    /// mutating tool T with no classification and no user override,
    /// policy(T, u) = approve").
    pub fn default_for(&self, tool: &str) -> TrustTier {
        self.defaults.get(tool).copied().unwrap_or(TrustTier::Approve)
    }

    /// Insert or replace a tool's system default. Exposed for tests and
    /// for operators seeding a non-standard deployment; not reachable over
    /// the wire (§4.6 only names per-user overrides as a request-scoped
    /// concept).
    pub fn set_default(&mut self, tool: impl Into<String>, tier: TrustTier) {
        self.defaults.insert(tool.into(), tier);
    }
}

impl Default for TrustPolicy {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Top-level store handle for per-user trust overrides, constructed once
/// at startup alongside a shared [`TrustPolicy`].
#[derive(Clone)]
pub struct PolicyStore {
    db: Db,
}

impl PolicyStore {
    /// Wrap an already-connected [`Db`].
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Bind this store to `user_id` for every subsequent call.
    pub fn for_user(&self, user_id: UserId) -> UserPolicyStore {
        UserPolicyStore {
            db: self.db.clone(),
            user_id,
        }
    }
}

/// A [`PolicyStore`] bound to one user.
#[derive(Clone)]
pub struct UserPolicyStore {
    db: Db,
    user_id: UserId,
}

impl UserPolicyStore {
    /// Resolve the effective trust tier for `tool`, per §4.6's full
    /// 3-step order. `defaults` is shared process-wide and passed in
    /// rather than owned by the store so one `TrustPolicy` instance backs
    /// every user.
    pub async fn resolve(&self, tool: &str, defaults: &TrustPolicy) -> TrustTier {
        match self.get_override(tool).await {
            Ok(Some(tier)) => tier,
            Ok(None) => defaults.default_for(tool),
            Err(err) => {
                tracing::warn!(
                    tool,
                    user_id = %self.user_id,
                    error = %err,
                    "trust override lookup failed, falling through to system default"
                );
                defaults.default_for(tool)
            }
        }
    }

    /// Look up this user's override for `tool`, if any row exists. The
    /// row's mere presence is the "provenance=user" signal (§4.6 step 1);
    /// there is no separate provenance flag to check.
    pub async fn get_override(&self, tool: &str) -> Result<Option<TrustTier>, PolicyError> {
        let tool = tool.to_string();
        let row: Option<String> = self
            .db
            .with_user_read(&self.user_id, move |tx| {
                Box::pin(async move {
                    sqlx::query_scalar(
                        "SELECT trust_tier FROM policy_overrides WHERE tool_name = $1",
                    )
                    .bind(tool)
                    .fetch_optional(&mut **tx)
                    .await
                    .map_err(fleet_db::DbError::Connect)
                    .map_err(PolicyError::Db)
                })
            })
            .await?;

        row.map(|s| TrustTier::parse(&s)).transpose()
    }

    /// List every tool this user has overridden, with its tier.
    pub async fn list_overrides(&self) -> Result<Vec<(String, TrustTier)>, PolicyError> {
        let rows: Vec<(String, String)> = self
            .db
            .with_user_read(&self.user_id, move |tx| {
                Box::pin(async move {
                    sqlx::query_as(
                        "SELECT tool_name, trust_tier FROM policy_overrides ORDER BY tool_name",
                    )
                    .fetch_all(&mut **tx)
                    .await
                    .map_err(fleet_db::DbError::Connect)
                    .map_err(PolicyError::Db)
                })
            })
            .await?;

        rows.into_iter()
            .map(|(tool, tier)| TrustTier::parse(&tier).map(|t| (tool, t)))
            .collect()
    }

    /// Set (insert or replace) this user's override for `tool`.
    pub async fn set_override(&self, tool: &str, tier: TrustTier) -> Result<(), PolicyError> {
        let tool = tool.to_string();
        let tier_str = tier.as_str();
        let user_id = self.user_id.as_str().to_string();
        self.db
            .with_user_scope(&self.user_id, move |tx| {
                Box::pin(async move {
                    sqlx::query(
                        r#"
                        INSERT INTO policy_overrides (user_id, tool_name, trust_tier)
                        VALUES ($1, $2, $3)
                        ON CONFLICT (user_id, tool_name)
                        DO UPDATE SET trust_tier = EXCLUDED.trust_tier
                        "#,
                    )
                    .bind(user_id)
                    .bind(tool)
                    .bind(tier_str)
                    .execute(&mut **tx)
                    .await
                    .map_err(fleet_db::DbError::Connect)
                    .map_err(PolicyError::Db)?;
                    Ok(())
                })
            })
            .await
    }

    /// Remove this user's override for `tool`, if any (reverting it to
    /// provenance=default).
    pub async fn clear_override(&self, tool: &str) -> Result<(), PolicyError> {
        let tool = tool.to_string();
        let user_id = self.user_id.as_str().to_string();
        self.db
            .with_user_scope(&self.user_id, move |tx| {
                Box::pin(async move {
                    sqlx::query(
                        "DELETE FROM policy_overrides WHERE user_id = $1 AND tool_name = $2",
                    )
                    .bind(user_id)
                    .bind(tool)
                    .execute(&mut **tx)
                    .await
                    .map_err(fleet_db::DbError::Connect)
                    .map_err(PolicyError::Db)?;
                    Ok(())
                })
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_map_matches_worked_scenarios() {
        let policy = TrustPolicy::with_defaults();
        assert_eq!(policy.default_for("activate_preset"), TrustTier::Block);
        assert_eq!(policy.default_for("create_loadout"), TrustTier::Approve);
        assert_eq!(policy.default_for("create_target"), TrustTier::Auto);
    }

    #[test]
    fn unclassified_mutating_tool_falls_back_to_approve() {
        let policy = TrustPolicy::with_defaults();
        assert_eq!(policy.default_for("assign_dock"), TrustTier::Approve);
    }

    #[test]
    fn set_default_overrides_builtin_classification() {
        let mut policy = TrustPolicy::with_defaults();
        assert_eq!(policy.default_for("create_target"), TrustTier::Auto);
        policy.set_default("create_target", TrustTier::Block);
        assert_eq!(policy.default_for("create_target"), TrustTier::Block);
    }

    #[test]
    fn tier_round_trips_through_its_string_form() {
        for tier in [TrustTier::Auto, TrustTier::Approve, TrustTier::Block] {
            assert_eq!(TrustTier::parse(tier.as_str()).unwrap(), tier);
        }
    }

    #[test]
    fn tier_parse_rejects_unknown_strings() {
        assert!(TrustTier::parse("maybe").is_err());
    }
}
