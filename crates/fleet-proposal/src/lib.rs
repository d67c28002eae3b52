// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! Mutation proposal store: gates every mutating tool behind an explicit
//! confirmation so a generative model never mutates state directly (§3,
//! §4.4).
//!
//! `apply` enforces the `proposed -> {applied | declined | expired}` state
//! machine from [`fleet_core::ProposalStatus`] and the strict-`<` expiry
//! boundary from [`fleet_core::MutationProposal::is_expired`]; it updates
//! only the proposal row itself. The atomicity invariant in §4.4 ("the
//! proposal's apply, the entity mutation, and the receipt write commit
//! together or not at all") is the caller's responsibility: the tool
//! runtime in `fleet-session` wraps all three in one
//! [`fleet_db::Db::with_user_scope`] call, of which this crate's `apply`
//! is one statement.

mod error;

pub use error::ProposalError;

use chrono::{DateTime, Utc};
use fleet_config::FleetConfig;
use fleet_core::{BatchItem, MutationProposal, ProposalId, ProposalStatus, ReceiptId, UserId};
use fleet_db::Db;
use sha2::{Digest, Sha256};
use sqlx::{FromRow, Postgres, Transaction};

/// Compute `argsHash`: a stable hex-encoded SHA-256 of `{tool, canonicalised
/// args_json}`, used for idempotency and de-duplication (§4.4).
pub fn args_hash(tool: &str, args_json: &serde_json::Value) -> Result<String, serde_json::Error> {
    let canonical = serde_json::to_string(args_json)?;
    let mut hasher = Sha256::new();
    hasher.update(tool.as_bytes());
    hasher.update(b"\0");
    hasher.update(canonical.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

/// Top-level store handle, constructed once at startup.
#[derive(Clone)]
pub struct ProposalStore {
    db: Db,
}

#[derive(FromRow)]
struct ProposalRow {
    id: String,
    user_id: String,
    tool: String,
    args_json: serde_json::Value,
    args_hash: String,
    proposal_json: serde_json::Value,
    batch_items: Option<serde_json::Value>,
    status: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    applied_receipt_id: Option<String>,
    applied_at: Option<DateTime<Utc>>,
    declined_at: Option<DateTime<Utc>>,
    decline_reason: Option<String>,
}

impl ProposalRow {
    fn into_proposal(self) -> Result<MutationProposal, ProposalError> {
        Ok(MutationProposal {
            id: ProposalId::from(self.id),
            user_id: UserId::from(self.user_id),
            tool: self.tool,
            args_json: self.args_json,
            args_hash: self.args_hash,
            proposal_json: self.proposal_json,
            batch_items: self
                .batch_items
                .map(serde_json::from_value::<Vec<BatchItem>>)
                .transpose()?,
            status: parse_status(&self.status)?,
            created_at: self.created_at,
            expires_at: self.expires_at,
            applied_receipt_id: self.applied_receipt_id.map(ReceiptId::from),
            applied_at: self.applied_at,
            declined_at: self.declined_at,
            decline_reason: self.decline_reason,
        })
    }
}

fn status_str(status: ProposalStatus) -> &'static str {
    match status {
        ProposalStatus::Proposed => "proposed",
        ProposalStatus::Applied => "applied",
        ProposalStatus::Declined => "declined",
        ProposalStatus::Expired => "expired",
    }
}

fn parse_status(s: &str) -> Result<ProposalStatus, ProposalError> {
    match s {
        "proposed" => Ok(ProposalStatus::Proposed),
        "applied" => Ok(ProposalStatus::Applied),
        "declined" => Ok(ProposalStatus::Declined),
        "expired" => Ok(ProposalStatus::Expired),
        other => Err(ProposalError::Corrupt(format!("unknown proposal status {other}"))),
    }
}

const SELECT_COLUMNS: &str = "id, user_id, tool, args_json, args_hash, proposal_json, \
                               batch_items, status, created_at, expires_at, \
                               applied_receipt_id, applied_at, declined_at, decline_reason";

impl ProposalStore {
    /// Wrap an already-connected [`Db`].
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Bind this store to `user_id` for every subsequent call.
    pub fn for_user(&self, user_id: UserId) -> UserProposalStore {
        UserProposalStore {
            db: self.db.clone(),
            user_id,
        }
    }

    /// Sweep every user's stale `proposed` proposals to `expired`
    /// (§4.4 `expireStale`). Safe to call concurrently from multiple
    /// workers. Row-level security scopes every query to one user at a
    /// time, so this iterates the global user list and delegates to
    /// [`UserProposalStore::expire_stale`] for each, summing the counts.
    pub async fn expire_stale(&self) -> Result<u64, ProposalError> {
        let user_ids: Vec<String> = sqlx::query_scalar("SELECT id FROM users")
            .fetch_all(self.db.admin_pool())
            .await
            .map_err(fleet_db::DbError::Connect)?;

        let mut total = 0;
        for id in user_ids {
            total += self.for_user(UserId::from(id)).expire_stale().await?;
        }
        Ok(total)
    }
}

/// A [`ProposalStore`] bound to one user.
#[derive(Clone)]
pub struct UserProposalStore {
    db: Db,
    user_id: UserId,
}

impl UserProposalStore {
    /// Create a new proposal with a fresh, opaque, cryptographically
    /// random id (§4.4). `expires_at` defaults to `now + config.proposal_ttl_secs`
    /// when not given explicitly.
    pub async fn create(
        &self,
        tool: impl Into<String>,
        args_json: serde_json::Value,
        proposal_json: serde_json::Value,
        batch_items: Option<Vec<BatchItem>>,
        expires_at: Option<DateTime<Utc>>,
        config: &FleetConfig,
    ) -> Result<MutationProposal, ProposalError> {
        let tool = tool.into();
        let hash = args_hash(&tool, &args_json)?;
        let now = Utc::now();
        let expires_at =
            expires_at.unwrap_or_else(|| now + chrono::Duration::seconds(config.proposal_ttl_secs as i64));

        let proposal = MutationProposal {
            id: ProposalId::from(uuid::Uuid::new_v4().to_string()),
            user_id: self.user_id.clone(),
            tool,
            args_json,
            args_hash: hash,
            proposal_json,
            batch_items,
            status: ProposalStatus::Proposed,
            created_at: now,
            expires_at,
            applied_receipt_id: None,
            applied_at: None,
            declined_at: None,
            decline_reason: None,
        };

        let id = proposal.id.as_str().to_string();
        let user_id = proposal.user_id.as_str().to_string();
        let tool = proposal.tool.clone();
        let args_json_v = proposal.args_json.clone();
        let args_hash_v = proposal.args_hash.clone();
        let proposal_json_v = proposal.proposal_json.clone();
        let batch_items_v = proposal
            .batch_items
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?;

        self.db
            .with_user_scope(&self.user_id, move |tx| {
                Box::pin(async move {
                    sqlx::query(
                        r#"
                        INSERT INTO mutation_proposals
                            (id, user_id, tool, args_json, args_hash, proposal_json,
                             batch_items, status, created_at, expires_at)
                        VALUES ($1, $2, $3, $4, $5, $6, $7, 'proposed', $8, $9)
                        "#,
                    )
                    .bind(id)
                    .bind(user_id)
                    .bind(tool)
                    .bind(args_json_v)
                    .bind(args_hash_v)
                    .bind(proposal_json_v)
                    .bind(batch_items_v)
                    .bind(now)
                    .bind(expires_at)
                    .execute(&mut **tx)
                    .await
                    .map_err(fleet_db::DbError::Connect)?;
                    Ok(())
                })
            })
            .await?;

        Ok(proposal)
    }

    /// Fetch one proposal by id, scoped to this user. Never returns a
    /// proposal owned by another user (§4.4).
    pub async fn get(&self, id: &ProposalId) -> Result<Option<MutationProposal>, ProposalError> {
        let id = id.as_str().to_string();
        let query = format!("SELECT {SELECT_COLUMNS} FROM mutation_proposals WHERE id = $1");
        let row = self
            .db
            .with_user_read(&self.user_id, move |tx| {
                Box::pin(async move {
                    sqlx::query_as::<_, ProposalRow>(&query)
                        .bind(id)
                        .fetch_optional(&mut **tx)
                        .await
                        .map_err(fleet_db::DbError::Connect)
                })
            })
            .await?;

        row.map(ProposalRow::into_proposal).transpose()
    }

    /// List this user's proposals, newest first, optionally filtered by
    /// status (§4.4 `list`).
    pub async fn list(
        &self,
        status: Option<ProposalStatus>,
        limit: i64,
    ) -> Result<Vec<MutationProposal>, ProposalError> {
        let status_filter = status.map(status_str);
        let rows = self
            .db
            .with_user_read(&self.user_id, move |tx| {
                Box::pin(async move {
                    let rows = match status_filter {
                        Some(s) => {
                            let query = format!(
                                "SELECT {SELECT_COLUMNS} FROM mutation_proposals WHERE status = $1 \
                                 ORDER BY created_at DESC LIMIT $2"
                            );
                            sqlx::query_as::<_, ProposalRow>(&query)
                                .bind(s)
                                .bind(limit)
                                .fetch_all(&mut **tx)
                                .await
                        }
                        None => {
                            let query = format!(
                                "SELECT {SELECT_COLUMNS} FROM mutation_proposals \
                                 ORDER BY created_at DESC LIMIT $1"
                            );
                            sqlx::query_as::<_, ProposalRow>(&query)
                                .bind(limit)
                                .fetch_all(&mut **tx)
                                .await
                        }
                    };
                    rows.map_err(fleet_db::DbError::Connect)
                })
            })
            .await?;

        rows.into_iter().map(ProposalRow::into_proposal).collect()
    }

    /// Transition a `proposed` proposal to `applied` inside the caller's
    /// own transaction (§4.4 steps 1-4). The caller is expected to have
    /// opened `tx` via [`Db::with_user_scope`] alongside the entity
    /// mutation and receipt write it is enclosing; this function issues
    /// only the proposal row's own `SELECT ... FOR UPDATE` and `UPDATE`.
    ///
    /// Returns [`ProposalError::Expired`] (marking the row `expired` as a
    /// side effect) if `expires_at` has already passed, and
    /// [`ProposalError::NotProposed`] if the row is not `proposed`.
    pub async fn apply_in_tx<'c>(
        tx: &mut Transaction<'c, Postgres>,
        id: &ProposalId,
        receipt_id: &ReceiptId,
    ) -> Result<MutationProposal, ProposalError> {
        let query = format!(
            "SELECT {SELECT_COLUMNS} FROM mutation_proposals WHERE id = $1 FOR UPDATE"
        );
        let row = sqlx::query_as::<_, ProposalRow>(&query)
            .bind(id.as_str())
            .fetch_optional(&mut **tx)
            .await
            .map_err(fleet_db::DbError::Connect)?
            .ok_or_else(|| ProposalError::NotFound(id.clone()))?;
        let proposal = row.into_proposal()?;

        if proposal.status != ProposalStatus::Proposed {
            return Err(ProposalError::NotProposed(id.clone(), proposal.status));
        }

        let now = Utc::now();
        if proposal.is_expired(now) {
            sqlx::query("UPDATE mutation_proposals SET status = 'expired' WHERE id = $1")
                .bind(id.as_str())
                .execute(&mut **tx)
                .await
                .map_err(fleet_db::DbError::Connect)?;
            return Err(ProposalError::Expired {
                id: id.clone(),
                expires_at: proposal.expires_at,
            });
        }

        sqlx::query(
            r#"
            UPDATE mutation_proposals
            SET status = 'applied', applied_at = $1, applied_receipt_id = $2
            WHERE id = $3
            "#,
        )
        .bind(now)
        .bind(receipt_id.as_str())
        .bind(id.as_str())
        .execute(&mut **tx)
        .await
        .map_err(fleet_db::DbError::Connect)?;

        Ok(MutationProposal {
            status: ProposalStatus::Applied,
            applied_at: Some(now),
            applied_receipt_id: Some(receipt_id.clone()),
            ..proposal
        })
    }

    /// Convenience wrapper around [`Self::apply_in_tx`] for a caller with
    /// no other writes to join into the same transaction (tests, or
    /// callers content with the proposal-only atomicity this store alone
    /// can offer). Production tool-runtime call sites should prefer
    /// `apply_in_tx` joined to their own `with_user_scope` transaction so
    /// the entity mutation and receipt write commit together (§4.4).
    pub async fn apply(
        &self,
        id: &ProposalId,
        receipt_id: &ReceiptId,
    ) -> Result<MutationProposal, ProposalError> {
        let id = id.clone();
        let receipt_id = receipt_id.clone();
        self.db
            .with_user_scope(&self.user_id, move |tx| {
                Box::pin(async move { Self::apply_in_tx(tx, &id, &receipt_id).await })
            })
            .await
    }

    /// Decline a `proposed` proposal; no expiry check required (§4.4:
    /// "declining an expired proposal is fine").
    pub async fn decline(
        &self,
        id: &ProposalId,
        reason: Option<String>,
    ) -> Result<MutationProposal, ProposalError> {
        let proposal = self
            .get(id)
            .await?
            .ok_or_else(|| ProposalError::NotFound(id.clone()))?;

        if proposal.status != ProposalStatus::Proposed {
            return Err(ProposalError::NotProposed(id.clone(), proposal.status));
        }

        let now = Utc::now();
        let id_s = id.as_str().to_string();
        let reason_v = reason.clone();
        self.db
            .with_user_scope(&self.user_id, move |tx| {
                Box::pin(async move {
                    sqlx::query(
                        "UPDATE mutation_proposals SET status = 'declined', declined_at = $1, \
                         decline_reason = $2 WHERE id = $3",
                    )
                    .bind(now)
                    .bind(reason_v)
                    .bind(id_s)
                    .execute(&mut **tx)
                    .await
                    .map_err(fleet_db::DbError::Connect)?;
                    Ok(())
                })
            })
            .await?;

        Ok(MutationProposal {
            status: ProposalStatus::Declined,
            declined_at: Some(now),
            decline_reason: reason,
            ..proposal
        })
    }

    /// Sweep this user's stale `proposed` proposals to `expired`, returning
    /// the number of rows updated (§4.4 `expireStale`).
    pub async fn expire_stale(&self) -> Result<u64, ProposalError> {
        let updated = self
            .db
            .with_user_scope(&self.user_id, move |tx| {
                Box::pin(async move {
                    sqlx::query(
                        "UPDATE mutation_proposals SET status = 'expired' \
                         WHERE status = 'proposed' AND expires_at < now()",
                    )
                    .execute(&mut **tx)
                    .await
                    .map_err(fleet_db::DbError::Connect)
                })
            })
            .await?;
        Ok(updated.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_hash_is_stable_across_key_order() {
        let a = args_hash("create_loadout", &serde_json::json!({"b": 1, "a": 2})).unwrap();
        let b = args_hash("create_loadout", &serde_json::json!({"a": 2, "b": 1})).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn args_hash_differs_by_tool() {
        let args = serde_json::json!({"x": 1});
        assert_ne!(
            args_hash("tool_a", &args).unwrap(),
            args_hash("tool_b", &args).unwrap()
        );
    }

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            ProposalStatus::Proposed,
            ProposalStatus::Applied,
            ProposalStatus::Declined,
            ProposalStatus::Expired,
        ] {
            assert_eq!(parse_status(status_str(status)).unwrap(), status);
        }
    }

    #[test]
    fn unknown_status_str_is_corrupt_error() {
        assert!(parse_status("bogus").is_err());
    }
}
