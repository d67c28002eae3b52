// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! Global reference catalog and its per-user ownership overlay (§3, §4.2).
//!
//! [`CatalogStore`] owns the global, admin-pool `upsertOfficer`/`upsertShip`
//! operations (the vendor catalog is not per-user). [`UserCatalogStore`]
//! owns every per-user overlay read and write, merging reference fields
//! with the caller's overlay row (defaulting to unknown ownership / no
//! target when no overlay row has ever been created, per §4.2's merged-read
//! default) and recording a receipt for every bulk overlay write so it can
//! later be undone through the same `undo`/`resolveReceiptItems` path as an
//! import (§4.4).

mod error;

pub use error::CatalogError;

use chrono::Utc;
use fleet_core::{
    ImportLayer, MergedOfficer, MergedShip, OfficerOverlay, OfficerOverlayPatch, Provenance,
    ReceiptId, RefId, ReferenceOfficer, ReferenceShip, ShipOverlay, ShipOverlayPatch, UserId,
};
use fleet_db::Db;
use fleet_receipt::ReceiptBuilder;
use fleet_receipt_store::UserReceiptStore;
use sqlx::{FromRow, Postgres, Transaction};

/// Result of a bulk overlay write (§4.2: `{ updated, refIds, receiptId? }`).
#[derive(Debug, Clone, serde::Serialize, schemars::JsonSchema)]
pub struct BulkOverlayResult {
    /// Number of rows touched.
    pub updated: usize,
    /// The ids touched, in the order given.
    pub ref_ids: Vec<RefId>,
    /// The receipt recording the inverse of this write, if one was written.
    pub receipt_id: Option<ReceiptId>,
}

/// Top-level store handle, constructed once at startup.
#[derive(Clone)]
pub struct CatalogStore {
    db: Db,
}

#[derive(FromRow)]
struct ReferenceRow {
    ref_id: String,
    fields: serde_json::Value,
    provenance_source: String,
    provenance_url: Option<String>,
    provenance_revision_id: Option<String>,
    provenance_revision_timestamp: Option<chrono::DateTime<Utc>>,
}

/// The subset of [`ReferenceOfficer`]/[`ReferenceShip`] stored in the
/// `fields` JSONB column; `ref_id` and provenance live in their own columns.
#[derive(serde::Serialize, serde::Deserialize)]
struct OfficerFields {
    name: String,
    rarity: String,
    faction: String,
    abilities: serde_json::Value,
}

#[derive(serde::Serialize, serde::Deserialize)]
struct ShipFields {
    name: String,
    class: String,
    tier: String,
    faction: String,
    abilities: serde_json::Value,
}

impl ReferenceRow {
    fn provenance(&self) -> Provenance {
        Provenance {
            source: self.provenance_source.clone(),
            url: self.provenance_url.clone(),
            revision_id: self.provenance_revision_id.clone().unwrap_or_default(),
            revision_timestamp: self.provenance_revision_timestamp.unwrap_or_else(Utc::now),
        }
    }

    fn into_officer(self) -> Result<ReferenceOfficer, CatalogError> {
        let fields: OfficerFields = serde_json::from_value(self.fields.clone())?;
        let provenance = self.provenance();
        Ok(ReferenceOfficer {
            ref_id: RefId::from(self.ref_id),
            name: fields.name,
            rarity: fields.rarity,
            faction: fields.faction,
            abilities: fields.abilities,
            provenance,
        })
    }

    fn into_ship(self) -> Result<ReferenceShip, CatalogError> {
        let fields: ShipFields = serde_json::from_value(self.fields.clone())?;
        let provenance = self.provenance();
        Ok(ReferenceShip {
            ref_id: RefId::from(self.ref_id),
            name: fields.name,
            class: fields.class,
            tier: fields.tier,
            faction: fields.faction,
            abilities: fields.abilities,
            provenance,
        })
    }
}

const REFERENCE_COLUMNS: &str = "ref_id, fields, provenance_source, provenance_url, \
                                  provenance_revision_id, provenance_revision_timestamp";

impl CatalogStore {
    /// Wrap an already-connected [`Db`].
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Bind this store to `user_id` for overlay reads and writes.
    pub fn for_user(&self, user_id: UserId) -> UserCatalogStore {
        UserCatalogStore {
            db: self.db.clone(),
            user_id,
        }
    }

    /// Idempotent upsert of a global officer reference row, overwriting
    /// provenance every time (§4.2). Runs under the admin pool: the catalog
    /// is global, not per-user.
    pub async fn upsert_officer(
        &self,
        officer: ReferenceOfficer,
    ) -> Result<ReferenceOfficer, CatalogError> {
        let fields = serde_json::to_value(OfficerFields {
            name: officer.name.clone(),
            rarity: officer.rarity.clone(),
            faction: officer.faction.clone(),
            abilities: officer.abilities.clone(),
        })?;
        sqlx::query(
            r#"
            INSERT INTO reference_officers
                (ref_id, fields, provenance_source, provenance_url,
                 provenance_revision_id, provenance_revision_timestamp, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, now())
            ON CONFLICT (ref_id) DO UPDATE SET
                fields = excluded.fields,
                provenance_source = excluded.provenance_source,
                provenance_url = excluded.provenance_url,
                provenance_revision_id = excluded.provenance_revision_id,
                provenance_revision_timestamp = excluded.provenance_revision_timestamp,
                updated_at = now()
            "#,
        )
        .bind(officer.ref_id.as_str())
        .bind(fields)
        .bind(&officer.provenance.source)
        .bind(&officer.provenance.url)
        .bind(&officer.provenance.revision_id)
        .bind(officer.provenance.revision_timestamp)
        .execute(self.db.admin_pool())
        .await
        .map_err(fleet_db::DbError::Connect)?;

        Ok(officer)
    }

    /// Idempotent upsert of a global ship reference row, analogous to
    /// [`CatalogStore::upsert_officer`].
    pub async fn upsert_ship(&self, ship: ReferenceShip) -> Result<ReferenceShip, CatalogError> {
        let fields = serde_json::to_value(ShipFields {
            name: ship.name.clone(),
            class: ship.class.clone(),
            tier: ship.tier.clone(),
            faction: ship.faction.clone(),
            abilities: ship.abilities.clone(),
        })?;
        sqlx::query(
            r#"
            INSERT INTO reference_ships
                (ref_id, fields, provenance_source, provenance_url,
                 provenance_revision_id, provenance_revision_timestamp, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, now())
            ON CONFLICT (ref_id) DO UPDATE SET
                fields = excluded.fields,
                provenance_source = excluded.provenance_source,
                provenance_url = excluded.provenance_url,
                provenance_revision_id = excluded.provenance_revision_id,
                provenance_revision_timestamp = excluded.provenance_revision_timestamp,
                updated_at = now()
            "#,
        )
        .bind(ship.ref_id.as_str())
        .bind(fields)
        .bind(&ship.provenance.source)
        .bind(&ship.provenance.url)
        .bind(&ship.provenance.revision_id)
        .bind(ship.provenance.revision_timestamp)
        .execute(self.db.admin_pool())
        .await
        .map_err(fleet_db::DbError::Connect)?;

        Ok(ship)
    }

    /// Fetch one officer reference row, regardless of user.
    pub async fn get_officer(&self, ref_id: &RefId) -> Result<Option<ReferenceOfficer>, CatalogError> {
        let query = format!("SELECT {REFERENCE_COLUMNS} FROM reference_officers WHERE ref_id = $1");
        let row = sqlx::query_as::<_, ReferenceRow>(&query)
            .bind(ref_id.as_str())
            .fetch_optional(self.db.admin_pool())
            .await
            .map_err(fleet_db::DbError::Connect)?;
        row.map(ReferenceRow::into_officer).transpose()
    }

    /// Fetch one ship reference row, regardless of user.
    pub async fn get_ship(&self, ref_id: &RefId) -> Result<Option<ReferenceShip>, CatalogError> {
        let query = format!("SELECT {REFERENCE_COLUMNS} FROM reference_ships WHERE ref_id = $1");
        let row = sqlx::query_as::<_, ReferenceRow>(&query)
            .bind(ref_id.as_str())
            .fetch_optional(self.db.admin_pool())
            .await
            .map_err(fleet_db::DbError::Connect)?;
        row.map(ReferenceRow::into_ship).transpose()
    }

    /// List every officer reference row, used by `fleet-import`'s fuzzy
    /// name-resolution stage (§4.3 stage 3).
    pub async fn list_officers(&self) -> Result<Vec<ReferenceOfficer>, CatalogError> {
        let query = format!("SELECT {REFERENCE_COLUMNS} FROM reference_officers ORDER BY ref_id");
        let rows = sqlx::query_as::<_, ReferenceRow>(&query)
            .fetch_all(self.db.admin_pool())
            .await
            .map_err(fleet_db::DbError::Connect)?;
        rows.into_iter().map(ReferenceRow::into_officer).collect()
    }

    /// List every ship reference row, analogous to
    /// [`CatalogStore::list_officers`].
    pub async fn list_ships(&self) -> Result<Vec<ReferenceShip>, CatalogError> {
        let query = format!("SELECT {REFERENCE_COLUMNS} FROM reference_ships ORDER BY ref_id");
        let rows = sqlx::query_as::<_, ReferenceRow>(&query)
            .fetch_all(self.db.admin_pool())
            .await
            .map_err(fleet_db::DbError::Connect)?;
        rows.into_iter().map(ReferenceRow::into_ship).collect()
    }
}

/// A [`CatalogStore`] bound to one user, for overlay reads and writes.
#[derive(Clone)]
pub struct UserCatalogStore {
    db: Db,
    user_id: UserId,
}

impl UserCatalogStore {
    /// Read one officer's overlay row inside the caller's already-open
    /// transaction, defaulting to an unowned overlay when no row exists yet
    /// (§4.2). The caller is expected to have opened `tx` via
    /// [`Db::with_user_scope`]/[`Db::with_user_read`].
    async fn officer_overlay_row_in_tx<'c>(
        tx: &mut Transaction<'c, Postgres>,
        ref_id: &RefId,
    ) -> Result<OfficerOverlay, CatalogError> {
        let fields = sqlx::query_scalar::<_, serde_json::Value>(
            "SELECT fields FROM officer_overlays WHERE ref_id = $1",
        )
        .bind(ref_id.as_str())
        .fetch_optional(&mut **tx)
        .await
        .map_err(fleet_db::DbError::Connect)?;

        match fields {
            Some(fields) => Ok(serde_json::from_value(fields)?),
            None => Ok(OfficerOverlay::default_for(ref_id.clone())),
        }
    }

    /// Analogous to [`Self::officer_overlay_row_in_tx`] for ships.
    async fn ship_overlay_row_in_tx<'c>(
        tx: &mut Transaction<'c, Postgres>,
        ref_id: &RefId,
    ) -> Result<ShipOverlay, CatalogError> {
        let fields = sqlx::query_scalar::<_, serde_json::Value>(
            "SELECT fields FROM ship_overlays WHERE ref_id = $1",
        )
        .bind(ref_id.as_str())
        .fetch_optional(&mut **tx)
        .await
        .map_err(fleet_db::DbError::Connect)?;

        match fields {
            Some(fields) => Ok(serde_json::from_value(fields)?),
            None => Ok(ShipOverlay::default_for(ref_id.clone())),
        }
    }

    /// Write one officer's overlay row inside the caller's already-open
    /// transaction (§4.2). See [`Self::officer_overlay_row_in_tx`] for the
    /// transaction-ownership contract.
    async fn put_officer_overlay_in_tx<'c>(
        tx: &mut Transaction<'c, Postgres>,
        user_id: &UserId,
        overlay: &OfficerOverlay,
    ) -> Result<(), CatalogError> {
        let fields = serde_json::to_value(overlay)?;
        sqlx::query(
            r#"
            INSERT INTO officer_overlays (user_id, ref_id, fields)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, ref_id) DO UPDATE SET fields = excluded.fields
            "#,
        )
        .bind(user_id.as_str())
        .bind(overlay.ref_id.as_str())
        .bind(fields)
        .execute(&mut **tx)
        .await
        .map_err(fleet_db::DbError::Connect)?;
        Ok(())
    }

    /// Analogous to [`Self::put_officer_overlay_in_tx`] for ships.
    async fn put_ship_overlay_in_tx<'c>(
        tx: &mut Transaction<'c, Postgres>,
        user_id: &UserId,
        overlay: &ShipOverlay,
    ) -> Result<(), CatalogError> {
        let fields = serde_json::to_value(overlay)?;
        sqlx::query(
            r#"
            INSERT INTO ship_overlays (user_id, ref_id, fields)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, ref_id) DO UPDATE SET fields = excluded.fields
            "#,
        )
        .bind(user_id.as_str())
        .bind(overlay.ref_id.as_str())
        .bind(fields)
        .execute(&mut **tx)
        .await
        .map_err(fleet_db::DbError::Connect)?;
        Ok(())
    }

    async fn officer_overlay_row(
        &self,
        ref_id: &RefId,
    ) -> Result<OfficerOverlay, CatalogError> {
        let ref_id = ref_id.clone();
        self.db
            .with_user_read(&self.user_id, move |tx| {
                Box::pin(async move { Self::officer_overlay_row_in_tx(tx, &ref_id).await })
            })
            .await
    }

    async fn ship_overlay_row(&self, ref_id: &RefId) -> Result<ShipOverlay, CatalogError> {
        let ref_id = ref_id.clone();
        self.db
            .with_user_read(&self.user_id, move |tx| {
                Box::pin(async move { Self::ship_overlay_row_in_tx(tx, &ref_id).await })
            })
            .await
    }

    async fn put_officer_overlay(
        &self,
        overlay: &OfficerOverlay,
    ) -> Result<(), CatalogError> {
        let overlay = overlay.clone();
        let user_id = self.user_id.clone();
        self.db
            .with_user_scope(&self.user_id, move |tx| {
                Box::pin(async move { Self::put_officer_overlay_in_tx(tx, &user_id, &overlay).await })
            })
            .await
    }

    async fn put_ship_overlay(&self, overlay: &ShipOverlay) -> Result<(), CatalogError> {
        let overlay = overlay.clone();
        let user_id = self.user_id.clone();
        self.db
            .with_user_scope(&self.user_id, move |tx| {
                Box::pin(async move { Self::put_ship_overlay_in_tx(tx, &user_id, &overlay).await })
            })
            .await
    }

    /// Merged-read for one officer: reference fields + this user's overlay,
    /// defaulted when no overlay row exists yet (§4.2).
    pub async fn get_merged_officer(
        &self,
        catalog: &CatalogStore,
        ref_id: &RefId,
    ) -> Result<MergedOfficer, CatalogError> {
        let reference = catalog
            .get_officer(ref_id)
            .await?
            .ok_or_else(|| CatalogError::NotFound(ref_id.clone()))?;
        let overlay = self.officer_overlay_row(ref_id).await?;
        Ok(MergedOfficer { reference, overlay })
    }

    /// Merged-read for one ship, analogous to
    /// [`UserCatalogStore::get_merged_officer`].
    pub async fn get_merged_ship(
        &self,
        catalog: &CatalogStore,
        ref_id: &RefId,
    ) -> Result<MergedShip, CatalogError> {
        let reference = catalog
            .get_ship(ref_id)
            .await?
            .ok_or_else(|| CatalogError::NotFound(ref_id.clone()))?;
        let overlay = self.ship_overlay_row(ref_id).await?;
        Ok(MergedShip { reference, overlay })
    }

    /// Merged-read over every officer in the catalog.
    pub async fn list_merged_officers(
        &self,
        catalog: &CatalogStore,
    ) -> Result<Vec<MergedOfficer>, CatalogError> {
        let mut out = Vec::new();
        for reference in catalog.list_officers().await? {
            let overlay = self.officer_overlay_row(&reference.ref_id).await?;
            out.push(MergedOfficer { reference, overlay });
        }
        Ok(out)
    }

    /// Merged-read over every ship in the catalog.
    pub async fn list_merged_ships(
        &self,
        catalog: &CatalogStore,
    ) -> Result<Vec<MergedShip>, CatalogError> {
        let mut out = Vec::new();
        for reference in catalog.list_ships().await? {
            let overlay = self.ship_overlay_row(&reference.ref_id).await?;
            out.push(MergedShip { reference, overlay });
        }
        Ok(out)
    }

    /// Apply a patch to one officer's overlay, creating the row on first
    /// touch (§4.2). Patch fields are independently nullable via
    /// [`fleet_core::Patch`].
    pub async fn set_officer_overlay(
        &self,
        ref_id: &RefId,
        patch: OfficerOverlayPatch,
    ) -> Result<OfficerOverlay, CatalogError> {
        let before = self.officer_overlay_row(ref_id).await?;
        let after = patch.apply(before);
        self.put_officer_overlay(&after).await?;
        Ok(after)
    }

    /// Apply a patch to one ship's overlay, analogous to
    /// [`UserCatalogStore::set_officer_overlay`].
    pub async fn set_ship_overlay(
        &self,
        ref_id: &RefId,
        patch: ShipOverlayPatch,
    ) -> Result<ShipOverlay, CatalogError> {
        let before = self.ship_overlay_row(ref_id).await?;
        let after = patch.apply(before);
        self.put_ship_overlay(&after).await?;
        Ok(after)
    }

    /// Overwrite one officer's overlay row outright, bypassing the patch
    /// merge (§4.3/§4.4 `undo`: the inverse changeset already carries a
    /// complete prior overlay, not a partial patch).
    pub async fn restore_officer_overlay(&self, overlay: &OfficerOverlay) -> Result<(), CatalogError> {
        self.put_officer_overlay(overlay).await
    }

    /// Overwrite one ship's overlay row outright, analogous to
    /// [`UserCatalogStore::restore_officer_overlay`].
    pub async fn restore_ship_overlay(&self, overlay: &ShipOverlay) -> Result<(), CatalogError> {
        self.put_ship_overlay(overlay).await
    }

    /// Apply one patch to every officer overlay in `ref_ids`, recording a
    /// single receipt whose inverse restores each row's prior overlay
    /// values (§4.2 "bulk overlay"). The whole loop and the receipt insert
    /// run inside one [`Db::with_user_scope`] transaction, so a failure
    /// partway through rolls every row in this batch back rather than
    /// leaving a partially-applied bulk overlay with no receipt.
    pub async fn bulk_officer_overlay(
        &self,
        ref_ids: Vec<RefId>,
        patch: OfficerOverlayPatch,
    ) -> Result<BulkOverlayResult, CatalogError> {
        let user_id = self.user_id.clone();

        self.db
            .with_user_scope(&self.user_id, move |tx| {
                Box::pin(async move {
                    let mut builder =
                        ReceiptBuilder::new(user_id.clone(), "catalog:bulk-overlay", ImportLayer::Ownership);

                    for ref_id in &ref_ids {
                        let before = Self::officer_overlay_row_in_tx(tx, ref_id).await?;
                        let after = patch.clone().apply(before.clone());
                        Self::put_officer_overlay_in_tx(tx, &user_id, &after).await?;
                        builder =
                            builder.add_updated(serde_json::to_value(&before)?, serde_json::to_value(&after)?);
                    }

                    let receipt_id = ReceiptId::from(uuid::Uuid::new_v4().to_string());
                    let receipt = builder.build(receipt_id.clone());
                    UserReceiptStore::insert_in_tx(tx, &user_id, receipt).await?;

                    Ok(BulkOverlayResult {
                        updated: ref_ids.len(),
                        ref_ids,
                        receipt_id: Some(receipt_id),
                    })
                })
            })
            .await
    }

    /// Apply one patch to every ship overlay in `ref_ids`, analogous to
    /// [`UserCatalogStore::bulk_officer_overlay`].
    pub async fn bulk_ship_overlay(
        &self,
        ref_ids: Vec<RefId>,
        patch: ShipOverlayPatch,
    ) -> Result<BulkOverlayResult, CatalogError> {
        let user_id = self.user_id.clone();

        self.db
            .with_user_scope(&self.user_id, move |tx| {
                Box::pin(async move {
                    let mut builder =
                        ReceiptBuilder::new(user_id.clone(), "catalog:bulk-overlay", ImportLayer::Ownership);

                    for ref_id in &ref_ids {
                        let before = Self::ship_overlay_row_in_tx(tx, ref_id).await?;
                        let after = patch.clone().apply(before.clone());
                        Self::put_ship_overlay_in_tx(tx, &user_id, &after).await?;
                        builder =
                            builder.add_updated(serde_json::to_value(&before)?, serde_json::to_value(&after)?);
                    }

                    let receipt_id = ReceiptId::from(uuid::Uuid::new_v4().to_string());
                    let receipt = builder.build(receipt_id.clone());
                    UserReceiptStore::insert_in_tx(tx, &user_id, receipt).await?;

                    Ok(BulkOverlayResult {
                        updated: ref_ids.len(),
                        ref_ids,
                        receipt_id: Some(receipt_id),
                    })
                })
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::OwnershipState;

    #[test]
    fn officer_fields_round_trip_through_json() {
        let fields = OfficerFields {
            name: "Kirk".into(),
            rarity: "epic".into(),
            faction: "federation".into(),
            abilities: serde_json::json!({"boost": 1}),
        };
        let v = serde_json::to_value(&fields).unwrap();
        let back: OfficerFields = serde_json::from_value(v).unwrap();
        assert_eq!(back.name, "Kirk");
        assert_eq!(back.abilities, serde_json::json!({"boost": 1}));
    }

    #[test]
    fn default_overlay_merges_as_unknown() {
        let overlay = OfficerOverlay::default_for(RefId::from("cdn:officer:kirk"));
        assert_eq!(overlay.ownership_state, OwnershipState::Unknown);
        assert!(!overlay.target);
    }

    #[test]
    fn bulk_overlay_result_carries_all_ref_ids() {
        let result = BulkOverlayResult {
            updated: 2,
            ref_ids: vec![RefId::from("a"), RefId::from("b")],
            receipt_id: Some(ReceiptId::from("r1")),
        };
        assert_eq!(result.updated, 2);
        assert_eq!(result.ref_ids.len(), 2);
        assert!(result.receipt_id.is_some());
    }
}
