// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! Persistent, per-user, hash-chained storage for [`ImportReceipt`]s (§3,
//! §4.3, §4.4).
//!
//! Every insert computes the receipt's canonical-form hash
//! (`fleet_receipt::hash`) and chains it from the user's current tail hash,
//! so [`UserReceiptStore::verify_chain`] can detect a row edited out of
//! band. `resolveReceiptItems` (§4.3 stage 5) is realized as
//! [`UserReceiptStore::resolve_items`]: it moves entries out of
//! `unresolved` into a separate `resolved_items` ledger and never touches
//! `inverse`, matching the §9 open-question resolution that `undo` uses
//! `inverse` only.

mod error;

pub use error::ReceiptStoreError;

use chrono::{DateTime, Utc};
use fleet_core::{Changeset, ImportLayer, ImportReceipt, ReceiptId, UnresolvedItem, UserId};
use fleet_db::Db;
use fleet_receipt::ReceiptChain;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Postgres, Transaction};

/// One user's later decision against a previously unresolved import row
/// (§4.3 stage 5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedItem {
    /// Row index within the original mapped import.
    pub row_index: usize,
    /// The reference id the user picked.
    pub ref_id: String,
    /// When this decision was recorded.
    pub resolved_at: DateTime<Utc>,
}

/// Top-level store handle. Construct once at startup; [`ReceiptStore::for_user`]
/// yields a handle bound to one user for every subsequent call, per the
/// `.forUser(userId) -> Store` contract in §4.1.
#[derive(Clone)]
pub struct ReceiptStore {
    db: Db,
}

impl ReceiptStore {
    /// Wrap an already-connected [`Db`].
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Bind this store to `user_id`. The returned handle never accepts a
    /// user id parameter at any call site (§4.1).
    pub fn for_user(&self, user_id: UserId) -> UserReceiptStore {
        UserReceiptStore {
            db: self.db.clone(),
            user_id,
        }
    }
}

/// A [`ReceiptStore`] bound to one user.
#[derive(Clone)]
pub struct UserReceiptStore {
    db: Db,
    user_id: UserId,
}

#[derive(FromRow)]
struct ReceiptRow {
    id: String,
    user_id: String,
    source_type: String,
    source_meta: serde_json::Value,
    mapping: Option<String>,
    layer: String,
    changeset: serde_json::Value,
    inverse: serde_json::Value,
    unresolved: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
}

impl ReceiptRow {
    fn into_receipt(self) -> Result<ImportReceipt, ReceiptStoreError> {
        Ok(ImportReceipt {
            id: ReceiptId::from(self.id),
            user_id: UserId::from(self.user_id),
            source_type: self.source_type,
            source_meta: self.source_meta,
            mapping: self.mapping,
            layer: parse_layer(&self.layer)?,
            changeset: serde_json::from_value(self.changeset)?,
            inverse: serde_json::from_value(self.inverse)?,
            unresolved: self
                .unresolved
                .map(serde_json::from_value::<Vec<UnresolvedItem>>)
                .transpose()?
                .filter(|v| !v.is_empty()),
            created_at: self.created_at,
        })
    }
}

fn layer_str(layer: ImportLayer) -> &'static str {
    match layer {
        ImportLayer::Reference => "reference",
        ImportLayer::Ownership => "ownership",
        ImportLayer::Composition => "composition",
    }
}

fn parse_layer(s: &str) -> Result<ImportLayer, ReceiptStoreError> {
    match s {
        "reference" => Ok(ImportLayer::Reference),
        "ownership" => Ok(ImportLayer::Ownership),
        "composition" => Ok(ImportLayer::Composition),
        other => Err(ReceiptStoreError::Corrupt(format!(
            "unknown import layer {other}"
        ))),
    }
}

const SELECT_COLUMNS: &str = "id, user_id, source_type, source_meta, mapping, layer, \
                               changeset, inverse, unresolved, created_at";

impl UserReceiptStore {
    /// Persist `receipt` inside an already-open transaction, chaining its
    /// hash from the tail visible within that same transaction.
    ///
    /// This is the half of the atomicity invariant (§4.4: "proposal update,
    /// entity mutation, receipt insert commit atomically") this crate can
    /// own: the tool runtime joins this call, a
    /// [`fleet_proposal::UserProposalStore::apply_in_tx`] call, and its own
    /// entity-mutation query into one [`Db::with_user_scope`] closure so
    /// all three commit or none do.
    pub async fn insert_in_tx<'c>(
        tx: &mut Transaction<'c, Postgres>,
        user_id: &UserId,
        receipt: ImportReceipt,
    ) -> Result<ImportReceipt, ReceiptStoreError> {
        let receipt_hash = fleet_receipt::hash(&receipt)?;
        let prev_hash = sqlx::query_scalar::<_, String>(
            "SELECT receipt_hash FROM import_receipts ORDER BY created_at DESC LIMIT 1",
        )
        .fetch_optional(&mut **tx)
        .await
        .map_err(fleet_db::DbError::Connect)?;

        let changeset_json = serde_json::to_value(&receipt.changeset)?;
        let inverse_json = serde_json::to_value(&receipt.inverse)?;
        let unresolved_json = receipt
            .unresolved
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?;

        sqlx::query(
            r#"
            INSERT INTO import_receipts
                (id, user_id, source_type, source_meta, mapping, layer,
                 changeset, inverse, unresolved, receipt_hash, prev_hash, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(receipt.id.as_str())
        .bind(user_id.as_str())
        .bind(&receipt.source_type)
        .bind(&receipt.source_meta)
        .bind(&receipt.mapping)
        .bind(layer_str(receipt.layer))
        .bind(changeset_json)
        .bind(inverse_json)
        .bind(unresolved_json)
        .bind(receipt_hash)
        .bind(prev_hash)
        .bind(receipt.created_at)
        .execute(&mut **tx)
        .await
        .map_err(fleet_db::DbError::Connect)?;

        Ok(receipt)
    }

    /// Persist a fully-assembled receipt (its `id` already chosen by the
    /// caller, typically via [`fleet_receipt::ReceiptBuilder::build`]),
    /// computing and storing its hash-chain link in the same transaction.
    /// Convenience wrapper for callers with no other writes to join (tests,
    /// or import-apply call sites that do not also need a proposal
    /// transition in the same commit); production tool-runtime call sites
    /// should prefer [`Self::insert_in_tx`] joined to their own
    /// `with_user_scope` transaction (§4.4).
    pub async fn insert(&self, receipt: ImportReceipt) -> Result<ImportReceipt, ReceiptStoreError> {
        let receipt_hash = fleet_receipt::hash(&receipt)?;
        let prev_hash = self.tail_hash().await?;
        let changeset_json = serde_json::to_value(&receipt.changeset)?;
        let inverse_json = serde_json::to_value(&receipt.inverse)?;
        let unresolved_json = receipt
            .unresolved
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?;
        let id = receipt.id.as_str().to_string();
        let user_id = receipt.user_id.as_str().to_string();
        let source_type = receipt.source_type.clone();
        let source_meta = receipt.source_meta.clone();
        let mapping = receipt.mapping.clone();
        let layer = layer_str(receipt.layer);
        let created_at = receipt.created_at;

        self.db
            .with_user_scope(&self.user_id, move |tx| {
                Box::pin(async move {
                    sqlx::query(
                        r#"
                        INSERT INTO import_receipts
                            (id, user_id, source_type, source_meta, mapping, layer,
                             changeset, inverse, unresolved, receipt_hash, prev_hash, created_at)
                        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                        "#,
                    )
                    .bind(id)
                    .bind(user_id)
                    .bind(source_type)
                    .bind(source_meta)
                    .bind(mapping)
                    .bind(layer)
                    .bind(changeset_json)
                    .bind(inverse_json)
                    .bind(unresolved_json)
                    .bind(receipt_hash)
                    .bind(prev_hash)
                    .bind(created_at)
                    .execute(&mut **tx)
                    .await
                    .map_err(fleet_db::DbError::Connect)?;
                    Ok(())
                })
            })
            .await?;

        Ok(receipt)
    }

    /// Fetch one receipt by id, scoped to this user. Never returns a
    /// receipt owned by another user (§3 cross-entity invariant).
    pub async fn get(&self, id: &ReceiptId) -> Result<Option<ImportReceipt>, ReceiptStoreError> {
        let id = id.as_str().to_string();
        let query = format!("SELECT {SELECT_COLUMNS} FROM import_receipts WHERE id = $1");
        let row = self
            .db
            .with_user_read(&self.user_id, move |tx| {
                Box::pin(async move {
                    sqlx::query_as::<_, ReceiptRow>(&query)
                        .bind(id)
                        .fetch_optional(&mut **tx)
                        .await
                        .map_err(fleet_db::DbError::Connect)
                })
            })
            .await?;

        row.map(ReceiptRow::into_receipt).transpose()
    }

    /// List receipts for this user, newest first, optionally filtered by
    /// [`ImportLayer`] (§4.3 "layers... callers can list/undo by scope").
    pub async fn list(
        &self,
        layer: Option<ImportLayer>,
        limit: i64,
    ) -> Result<Vec<ImportReceipt>, ReceiptStoreError> {
        let layer_filter = layer.map(layer_str);
        let rows = self
            .db
            .with_user_read(&self.user_id, move |tx| {
                Box::pin(async move {
                    let rows = match layer_filter {
                        Some(l) => {
                            let query = format!(
                                "SELECT {SELECT_COLUMNS} FROM import_receipts WHERE layer = $1 \
                                 ORDER BY created_at DESC LIMIT $2"
                            );
                            sqlx::query_as::<_, ReceiptRow>(&query)
                                .bind(l)
                                .bind(limit)
                                .fetch_all(&mut **tx)
                                .await
                        }
                        None => {
                            let query = format!(
                                "SELECT {SELECT_COLUMNS} FROM import_receipts \
                                 ORDER BY created_at DESC LIMIT $1"
                            );
                            sqlx::query_as::<_, ReceiptRow>(&query)
                                .bind(limit)
                                .fetch_all(&mut **tx)
                                .await
                        }
                    };
                    rows.map_err(fleet_db::DbError::Connect)
                })
            })
            .await?;

        rows.into_iter().map(ReceiptRow::into_receipt).collect()
    }

    /// Attach later user decisions to `id`'s `unresolved` list, moving
    /// matched row indices into a separate resolved-items ledger. Never
    /// alters `inverse` (§9 open-question resolution).
    pub async fn resolve_items(
        &self,
        id: &ReceiptId,
        resolutions: Vec<(usize, String)>,
    ) -> Result<ImportReceipt, ReceiptStoreError> {
        let mut receipt = self
            .get(id)
            .await?
            .ok_or_else(|| ReceiptStoreError::NotFound(id.clone()))?;

        let now = Utc::now();
        let mut newly_resolved = Vec::new();
        if let Some(unresolved) = receipt.unresolved.as_mut() {
            for (row_index, ref_id) in &resolutions {
                unresolved.retain(|item| &item.row_index != row_index);
                newly_resolved.push(ResolvedItem {
                    row_index: *row_index,
                    ref_id: ref_id.clone(),
                    resolved_at: now,
                });
            }
            if unresolved.is_empty() {
                receipt.unresolved = None;
            }
        }

        let user_id = self.user_id.clone();
        let receipt_id = id.as_str().to_string();
        let unresolved_json = receipt
            .unresolved
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?;
        let resolved_json = serde_json::to_value(&newly_resolved)?;
        self.db
            .with_user_scope(&user_id, move |tx| {
                Box::pin(async move {
                    sqlx::query(
                        r#"UPDATE import_receipts
                           SET unresolved = $1,
                               resolved_items = resolved_items || $2::jsonb
                           WHERE id = $3"#,
                    )
                    .bind(unresolved_json)
                    .bind(resolved_json)
                    .bind(receipt_id)
                    .execute(&mut **tx)
                    .await
                    .map_err(fleet_db::DbError::Connect)?;
                    Ok(())
                })
            })
            .await?;

        Ok(receipt)
    }

    /// Verify this user's receipt chain end to end: no duplicate ids, every
    /// link references the prior link's hash, and every stored hash
    /// matches the hash recomputed from the receipt body (tamper
    /// detection, §4.4/§8).
    pub async fn verify_chain(&self) -> Result<(), ReceiptStoreError> {
        let mut ordered = self.list(None, i64::MAX).await?;
        // `list` orders newest-first; the chain was built oldest-first.
        ordered.reverse();

        let mut chain = ReceiptChain::new();
        let mut fresh_hashes = Vec::with_capacity(ordered.len());
        for receipt in &ordered {
            let fresh = fleet_receipt::hash(receipt)?;
            chain.append(receipt.id.clone(), fresh.clone());
            fresh_hashes.push(fresh);
        }

        chain
            .verify_against(&fresh_hashes)
            .map_err(ReceiptStoreError::Chain)
    }

    async fn tail_hash(&self) -> Result<Option<String>, ReceiptStoreError> {
        let hash: Option<String> = self
            .db
            .with_user_read(&self.user_id, move |tx| {
                Box::pin(async move {
                    sqlx::query_scalar::<_, String>(
                        "SELECT receipt_hash FROM import_receipts ORDER BY created_at DESC LIMIT 1",
                    )
                    .fetch_optional(&mut **tx)
                    .await
                    .map_err(fleet_db::DbError::Connect)
                })
            })
            .await?;
        Ok(hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layer_round_trips_through_str() {
        for layer in [
            ImportLayer::Reference,
            ImportLayer::Ownership,
            ImportLayer::Composition,
        ] {
            assert_eq!(parse_layer(layer_str(layer)).unwrap(), layer);
        }
    }

    #[test]
    fn unknown_layer_str_is_corrupt_error() {
        assert!(parse_layer("bogus").is_err());
    }

    #[test]
    fn changeset_json_round_trips() {
        let cs = Changeset {
            added: vec![serde_json::json!({"id": "x"})],
            updated: vec![],
            removed: vec![],
        };
        let v = serde_json::to_value(&cs).unwrap();
        let back: Changeset = serde_json::from_value(v).unwrap();
        assert_eq!(back.added, cs.added);
    }
}
