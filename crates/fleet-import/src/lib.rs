// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! Translator and import pipeline: parse, translate, resolve, apply (§4.3).
//!
//! The five stages live in their own modules ([`parse`], [`translator`],
//! [`resolve`]) with this module tying the last two — Apply and the
//! resolve-items follow-up — to [`fleet_catalog`] and [`fleet_receipt_store`]
//! under one user-scoped receipt per import.

pub mod error;
pub mod parse;
pub mod resolve;
pub mod translator;

use error::ImportError;
use fleet_catalog::{CatalogStore, UserCatalogStore};
use fleet_core::{
    ImportLayer, OfficerOverlayPatch, ReceiptId, RefId, ReferenceOfficer, ReferenceShip,
    ShipOverlayPatch, UnresolvedItem, UserId,
};
use fleet_receipt::ReceiptBuilder;
use resolve::Candidate;

/// One row ready for the Apply stage: a known `refId` and the overlay
/// patch fields to merge in, expressed as JSON so the same plumbing
/// serves both the officer and ship paths (§4.2's patch fields
/// deserialize from this shape).
#[derive(Debug, Clone)]
pub struct ResolvedRow {
    /// The row's index in the originating mapped/parsed import, carried
    /// through for receipt diagnostics.
    pub row_index: usize,
    /// The resolved reference id.
    pub ref_id: RefId,
    /// Overlay patch fields, keyed by overlay field name (e.g.
    /// `"ownership_state"`, `"user_level"`).
    pub fields: serde_json::Value,
}

/// A named row that still needs resolving before Apply can run (§4.3
/// stage 3): produced either by a translator row with no `refId` (name
/// only) or by a CSV/xlsx row keyed on a `name` column.
#[derive(Debug, Clone)]
pub struct NamedRow {
    /// The row's index in the originating mapped/parsed import.
    pub row_index: usize,
    /// The name to fuzzy-match against the catalog.
    pub raw_name: String,
    /// Overlay patch fields already mapped for this row.
    pub fields: serde_json::Value,
}

/// Resolve every [`NamedRow`] against `candidates`, splitting the result
/// into confidently-resolved rows and items that need a human pick
/// (§4.3 stage 3: "ambiguities are surfaced, not guessed").
pub fn resolve_named_rows(
    rows: Vec<NamedRow>,
    candidates: &[Candidate],
) -> (Vec<ResolvedRow>, Vec<UnresolvedItem>) {
    let mut resolved = Vec::new();
    let mut unresolved = Vec::new();

    for row in rows {
        match resolve::resolve_unambiguous(&row.raw_name, candidates) {
            Some(ref_id) => resolved.push(ResolvedRow { row_index: row.row_index, ref_id, fields: row.fields }),
            None => {
                let ranked = resolve::resolve_candidates(&row.raw_name, candidates);
                unresolved.push(UnresolvedItem {
                    row_index: row.row_index,
                    raw_name: row.raw_name,
                    candidates: ranked.into_iter().map(|c| c.ref_id.to_string()).collect(),
                });
            }
        }
    }

    (resolved, unresolved)
}

/// Build officer catalog [`Candidate`]s for the resolve stage.
pub fn officer_candidates(officers: &[ReferenceOfficer]) -> Vec<Candidate> {
    officers.iter().map(|o| Candidate { ref_id: o.ref_id.clone(), name: o.name.clone() }).collect()
}

/// Build ship catalog [`Candidate`]s for the resolve stage.
pub fn ship_candidates(ships: &[ReferenceShip]) -> Vec<Candidate> {
    ships.iter().map(|s| Candidate { ref_id: s.ref_id.clone(), name: s.name.clone() }).collect()
}

/// Top-level handle for the import pipeline's persistence, mirroring the
/// store/per-user split used throughout this workspace.
pub struct ImportStore {
    catalog: CatalogStore,
    receipts: fleet_receipt_store::ReceiptStore,
}

impl ImportStore {
    /// Wrap a [`CatalogStore`] to build a user-scoped import store.
    pub fn new(catalog: CatalogStore, db: fleet_db::Db) -> Self {
        Self { catalog, receipts: fleet_receipt_store::ReceiptStore::new(db) }
    }

    /// Bind this store to one user's scope for the Apply stage.
    pub fn for_user(&self, user_id: UserId) -> UserImportStore {
        UserImportStore {
            catalog: self.catalog.clone(),
            user_catalog: self.catalog.for_user(user_id.clone()),
            receipts: self.receipts.for_user(user_id.clone()),
            user_id,
        }
    }
}

/// A per-user handle that runs the Apply and resolve-items-follow-up
/// stages (§4.3 stages 4 and 5).
pub struct UserImportStore {
    catalog: CatalogStore,
    user_catalog: UserCatalogStore,
    receipts: fleet_receipt_store::UserReceiptStore,
    user_id: UserId,
}

impl UserImportStore {
    /// Apply resolved officer rows, recording one receipt whose inverse
    /// restores every overwritten overlay field (§4.3 stage 4).
    pub async fn apply_officers(
        &self,
        source_type: &str,
        rows: Vec<ResolvedRow>,
        unresolved: Vec<UnresolvedItem>,
    ) -> Result<fleet_core::ImportReceipt, ImportError> {
        let mut builder = ReceiptBuilder::new(self.user_id.clone(), source_type, ImportLayer::Ownership);

        for row in &rows {
            let patch: OfficerOverlayPatch = serde_json::from_value(row.fields.clone())?;
            let before = self.user_catalog.get_merged_officer(&self.catalog, &row.ref_id).await;
            let before_overlay = match before {
                Ok(merged) => serde_json::to_value(&merged.overlay)?,
                Err(_) => serde_json::Value::Null,
            };
            let after = self.user_catalog.set_officer_overlay(&row.ref_id, patch).await?;
            builder = builder.add_updated(before_overlay, serde_json::to_value(&after)?);
        }
        for item in unresolved {
            builder = builder.add_unresolved(item);
        }

        self.insert_receipt(builder).await
    }

    /// Apply resolved ship rows, analogous to
    /// [`UserImportStore::apply_officers`].
    pub async fn apply_ships(
        &self,
        source_type: &str,
        rows: Vec<ResolvedRow>,
        unresolved: Vec<UnresolvedItem>,
    ) -> Result<fleet_core::ImportReceipt, ImportError> {
        let mut builder = ReceiptBuilder::new(self.user_id.clone(), source_type, ImportLayer::Ownership);

        for row in &rows {
            let patch: ShipOverlayPatch = serde_json::from_value(row.fields.clone())?;
            let before = self.user_catalog.get_merged_ship(&self.catalog, &row.ref_id).await;
            let before_overlay = match before {
                Ok(merged) => serde_json::to_value(&merged.overlay)?,
                Err(_) => serde_json::Value::Null,
            };
            let after = self.user_catalog.set_ship_overlay(&row.ref_id, patch).await?;
            builder = builder.add_updated(before_overlay, serde_json::to_value(&after)?);
        }
        for item in unresolved {
            builder = builder.add_unresolved(item);
        }

        self.insert_receipt(builder).await
    }

    async fn insert_receipt(&self, builder: ReceiptBuilder) -> Result<fleet_core::ImportReceipt, ImportError> {
        let id = ReceiptId::from(uuid::Uuid::new_v4().to_string());
        let receipt = builder.build(id);
        self.receipts.insert(receipt).await.map_err(Into::into)
    }

    /// Attach later user decisions to a prior receipt (§4.3 stage 5).
    /// Delegates directly to the receipt store; never touches `inverse`.
    pub async fn resolve_items(
        &self,
        id: &ReceiptId,
        resolutions: Vec<(usize, String)>,
    ) -> Result<fleet_core::ImportReceipt, ImportError> {
        self.receipts.resolve_items(id, resolutions).await.map_err(Into::into)
    }

    /// Restore the per-user overlay state a receipt left behind, using only
    /// its `inverse` changeset (§8 round-trip law: `apply(undo(apply(R)))
    /// == apply(R)`). A later `resolveReceiptItems` follow-up on the same
    /// receipt is left untouched — undo never inspects `unresolved`.
    pub async fn undo(&self, id: &ReceiptId) -> Result<fleet_core::ImportReceipt, ImportError> {
        let receipt = self
            .receipts
            .get(id)
            .await?
            .ok_or_else(|| ImportError::ReceiptNotFound(id.clone()))?;

        for row in receipt
            .inverse
            .added
            .iter()
            .chain(receipt.inverse.updated.iter())
            .chain(receipt.inverse.removed.iter())
        {
            self.restore_overlay_row(row).await?;
        }

        Ok(receipt)
    }

    /// Restore a single overlay row from its serialized inverse value,
    /// distinguishing officer from ship overlays by their disjoint
    /// user-settable fields (`user_level`/`user_rank` vs. `user_tier`/
    /// `user_power`) since a receipt's changeset carries no separate tag.
    async fn restore_overlay_row(&self, row: &serde_json::Value) -> Result<(), ImportError> {
        if row.get("user_level").is_some() {
            let overlay: fleet_core::OfficerOverlay = serde_json::from_value(row.clone())?;
            self.user_catalog.restore_officer_overlay(&overlay).await?;
        } else {
            let overlay: fleet_core::ShipOverlay = serde_json::from_value(row.clone())?;
            self.user_catalog.restore_ship_overlay(&overlay).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::RefId;

    fn candidates() -> Vec<Candidate> {
        vec![
            Candidate { ref_id: RefId::from("cdn:officer:kirk"), name: "James T. Kirk".to_string() },
            Candidate { ref_id: RefId::from("cdn:officer:spock"), name: "Spock".to_string() },
        ]
    }

    #[test]
    fn resolve_named_rows_splits_resolved_and_unresolved() {
        let rows = vec![
            NamedRow { row_index: 0, raw_name: "Spock".to_string(), fields: serde_json::json!({}) },
            NamedRow { row_index: 1, raw_name: "Nobody Matching".to_string(), fields: serde_json::json!({}) },
        ];
        let (resolved, unresolved) = resolve_named_rows(rows, &candidates());
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].ref_id, RefId::from("cdn:officer:spock"));
        assert_eq!(unresolved.len(), 1);
        assert_eq!(unresolved[0].row_index, 1);
    }

    #[test]
    fn officer_candidates_projects_ref_id_and_name() {
        let officers = vec![ReferenceOfficer {
            ref_id: RefId::from("cdn:officer:kirk"),
            name: "Kirk".to_string(),
            rarity: "epic".to_string(),
            faction: "federation".to_string(),
            abilities: serde_json::json!({}),
            provenance: fleet_core::Provenance {
                source: "test".into(),
                url: None,
                revision_id: "r1".into(),
                revision_timestamp: chrono::Utc::now(),
            },
        }];
        let cands = officer_candidates(&officers);
        assert_eq!(cands[0].name, "Kirk");
    }
}
