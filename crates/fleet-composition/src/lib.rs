// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! Per-user composition layer: loadouts, bridge cores, below-deck policies,
//! loadout variants, docks, plan items, and targets (§3).
//!
//! Every entity here is owned (RLS-scoped, §4.1) and mutated exclusively
//! through the proposal protocol (§4.4) — this crate supplies the store the
//! tool runtime in `fleet-session` calls from inside a proposal's apply
//! transaction. Nothing here writes a receipt itself; the caller snapshots
//! the prior state, applies the mutation, and writes the `ImportReceipt`
//! alongside the proposal transition in one `with_user_scope` call, the
//! same split `fleet-catalog` and `fleet-import` already use between pure
//! store writes and receipt bookkeeping.

mod error;
mod tx_ops;

pub use error::CompositionError;
pub use tx_ops::{
    create_loadout_in_tx, create_preset_plan_item_in_tx, create_target_in_tx, delete_loadout_in_tx,
    delete_target_in_tx, set_bridge_core_members_in_tx, update_loadout_in_tx, update_target_in_tx,
};

use fleet_core::{
    BelowDeckMode, BelowDeckPolicy, BelowDeckSpec, BridgeCore, BridgeCoreMember, Dock, DockNumber,
    Loadout, LoadoutId, LoadoutPatch, LoadoutVariant, PlanItem, PlanItemSource, Priority, Target,
    TargetId, TargetPatch, TargetStatus, TargetType, UserId,
};
use fleet_db::Db;
use sqlx::{FromRow, Postgres, Transaction};

/// Top-level store handle, constructed once at startup.
#[derive(Clone)]
pub struct CompositionStore {
    db: Db,
}

impl CompositionStore {
    /// Wrap an already-connected [`Db`].
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Bind this store to `user_id` for every subsequent call.
    pub fn for_user(&self, user_id: UserId) -> UserCompositionStore {
        UserCompositionStore {
            db: self.db.clone(),
            user_id,
        }
    }
}

/// A [`CompositionStore`] bound to one user.
#[derive(Clone)]
pub struct UserCompositionStore {
    db: Db,
    user_id: UserId,
}

// ---------------------------------------------------------------------------
// Bridge cores
// ---------------------------------------------------------------------------

#[derive(FromRow)]
struct BridgeCoreRow {
    id: String,
    user_id: String,
    name: String,
    members: serde_json::Value,
}

impl BridgeCoreRow {
    fn into_domain(self) -> Result<BridgeCore, CompositionError> {
        Ok(BridgeCore {
            id: LoadoutId::from(self.id),
            user_id: UserId::from(self.user_id),
            name: self.name,
            members: serde_json::from_value(self.members)?,
        })
    }
}

impl UserCompositionStore {
    /// Create a new, named bridge core.
    pub async fn create_bridge_core(
        &self,
        name: impl Into<String>,
        members: Vec<BridgeCoreMember>,
    ) -> Result<BridgeCore, CompositionError> {
        let core = BridgeCore {
            id: LoadoutId::from(uuid::Uuid::new_v4().to_string()),
            user_id: self.user_id.clone(),
            name: name.into(),
            members,
        };
        let id = core.id.as_str().to_string();
        let user_id = self.user_id.as_str().to_string();
        let name = core.name.clone();
        let members_json = serde_json::to_value(&core.members)?;
        self.db
            .with_user_scope(&self.user_id, move |tx| {
                Box::pin(async move {
                    sqlx::query(
                        "INSERT INTO bridge_cores (id, user_id, name, members) VALUES ($1, $2, $3, $4)",
                    )
                    .bind(id)
                    .bind(user_id)
                    .bind(name)
                    .bind(members_json)
                    .execute(&mut **tx)
                    .await
                    .map_err(fleet_db::DbError::Connect)
                })
            })
            .await?;
        Ok(core)
    }

    /// Assign a bridge core's members in place (§4.4 `assign_bridge_core`).
    pub async fn set_bridge_core_members(
        &self,
        id: &LoadoutId,
        members: Vec<BridgeCoreMember>,
    ) -> Result<BridgeCore, CompositionError> {
        let existing = self
            .get_bridge_core(id)
            .await?
            .ok_or_else(|| CompositionError::NotFound(id.clone()))?;
        let updated = BridgeCore { members, ..existing };
        let id_s = id.as_str().to_string();
        let members_json = serde_json::to_value(&updated.members)?;
        self.db
            .with_user_scope(&self.user_id, move |tx| {
                Box::pin(async move {
                    sqlx::query("UPDATE bridge_cores SET members = $1 WHERE id = $2")
                        .bind(members_json)
                        .bind(id_s)
                        .execute(&mut **tx)
                        .await
                        .map_err(fleet_db::DbError::Connect)
                })
            })
            .await?;
        Ok(updated)
    }

    /// Fetch one bridge core by id, scoped to this user.
    pub async fn get_bridge_core(&self, id: &LoadoutId) -> Result<Option<BridgeCore>, CompositionError> {
        let id = id.as_str().to_string();
        let row = self
            .db
            .with_user_read(&self.user_id, move |tx| {
                Box::pin(async move {
                    sqlx::query_as::<_, BridgeCoreRow>(
                        "SELECT id, user_id, name, members FROM bridge_cores WHERE id = $1",
                    )
                    .bind(id)
                    .fetch_optional(&mut **tx)
                    .await
                    .map_err(fleet_db::DbError::Connect)
                })
            })
            .await?;
        row.map(BridgeCoreRow::into_domain).transpose()
    }

    /// List this user's bridge cores.
    pub async fn list_bridge_cores(&self) -> Result<Vec<BridgeCore>, CompositionError> {
        let rows = self
            .db
            .with_user_read(&self.user_id, move |tx| {
                Box::pin(async move {
                    sqlx::query_as::<_, BridgeCoreRow>(
                        "SELECT id, user_id, name, members FROM bridge_cores ORDER BY name",
                    )
                    .fetch_all(&mut **tx)
                    .await
                    .map_err(fleet_db::DbError::Connect)
                })
            })
            .await?;
        rows.into_iter().map(BridgeCoreRow::into_domain).collect()
    }
}

// ---------------------------------------------------------------------------
// Below-deck policies
// ---------------------------------------------------------------------------

#[derive(FromRow)]
struct BelowDeckPolicyRow {
    id: String,
    user_id: String,
    name: String,
    mode: String,
    spec: serde_json::Value,
}

fn mode_str(mode: BelowDeckMode) -> &'static str {
    match mode {
        BelowDeckMode::StatsThenBda => "stats_then_bda",
        BelowDeckMode::PinnedOnly => "pinned_only",
        BelowDeckMode::StatFillOnly => "stat_fill_only",
    }
}

fn parse_mode(s: &str) -> Result<BelowDeckMode, CompositionError> {
    match s {
        "stats_then_bda" => Ok(BelowDeckMode::StatsThenBda),
        "pinned_only" => Ok(BelowDeckMode::PinnedOnly),
        "stat_fill_only" => Ok(BelowDeckMode::StatFillOnly),
        other => Err(CompositionError::Corrupt(format!("unknown below-deck mode {other}"))),
    }
}

impl BelowDeckPolicyRow {
    fn into_domain(self) -> Result<BelowDeckPolicy, CompositionError> {
        Ok(BelowDeckPolicy {
            id: LoadoutId::from(self.id),
            user_id: UserId::from(self.user_id),
            name: self.name,
            mode: parse_mode(&self.mode)?,
            spec: serde_json::from_value(self.spec)?,
        })
    }
}

impl UserCompositionStore {
    /// Create a new, named below-deck policy.
    pub async fn create_below_deck_policy(
        &self,
        name: impl Into<String>,
        mode: BelowDeckMode,
        spec: BelowDeckSpec,
    ) -> Result<BelowDeckPolicy, CompositionError> {
        let policy = BelowDeckPolicy {
            id: LoadoutId::from(uuid::Uuid::new_v4().to_string()),
            user_id: self.user_id.clone(),
            name: name.into(),
            mode,
            spec,
        };
        let id = policy.id.as_str().to_string();
        let user_id = self.user_id.as_str().to_string();
        let name = policy.name.clone();
        let mode_v = mode_str(policy.mode);
        let spec_json = serde_json::to_value(&policy.spec)?;
        self.db
            .with_user_scope(&self.user_id, move |tx| {
                Box::pin(async move {
                    sqlx::query(
                        "INSERT INTO below_deck_policies (id, user_id, name, mode, spec) \
                         VALUES ($1, $2, $3, $4, $5)",
                    )
                    .bind(id)
                    .bind(user_id)
                    .bind(name)
                    .bind(mode_v)
                    .bind(spec_json)
                    .execute(&mut **tx)
                    .await
                    .map_err(fleet_db::DbError::Connect)
                })
            })
            .await?;
        Ok(policy)
    }

    /// Fetch one below-deck policy by id, scoped to this user.
    pub async fn get_below_deck_policy(
        &self,
        id: &LoadoutId,
    ) -> Result<Option<BelowDeckPolicy>, CompositionError> {
        let id = id.as_str().to_string();
        let row = self
            .db
            .with_user_read(&self.user_id, move |tx| {
                Box::pin(async move {
                    sqlx::query_as::<_, BelowDeckPolicyRow>(
                        "SELECT id, user_id, name, mode, spec FROM below_deck_policies WHERE id = $1",
                    )
                    .bind(id)
                    .fetch_optional(&mut **tx)
                    .await
                    .map_err(fleet_db::DbError::Connect)
                })
            })
            .await?;
        row.map(BelowDeckPolicyRow::into_domain).transpose()
    }

    /// List this user's below-deck policies.
    pub async fn list_below_deck_policies(&self) -> Result<Vec<BelowDeckPolicy>, CompositionError> {
        let rows = self
            .db
            .with_user_read(&self.user_id, move |tx| {
                Box::pin(async move {
                    sqlx::query_as::<_, BelowDeckPolicyRow>(
                        "SELECT id, user_id, name, mode, spec FROM below_deck_policies ORDER BY name",
                    )
                    .fetch_all(&mut **tx)
                    .await
                    .map_err(fleet_db::DbError::Connect)
                })
            })
            .await?;
        rows.into_iter().map(BelowDeckPolicyRow::into_domain).collect()
    }
}

// ---------------------------------------------------------------------------
// Loadouts
// ---------------------------------------------------------------------------

#[derive(FromRow)]
struct LoadoutRow {
    id: String,
    user_id: String,
    ship_ref_id: String,
    name: String,
    priority: i32,
    is_active: bool,
    intent_keys: serde_json::Value,
    tags: serde_json::Value,
    bridge_core_id: Option<String>,
    below_deck_policy_id: Option<String>,
    notes: Option<String>,
}

impl LoadoutRow {
    fn into_domain(self) -> Result<Loadout, CompositionError> {
        Ok(Loadout {
            id: LoadoutId::from(self.id),
            user_id: UserId::from(self.user_id),
            ship_ref_id: fleet_core::RefId::from(self.ship_ref_id),
            name: self.name,
            priority: self.priority,
            is_active: self.is_active,
            intent_keys: serde_json::from_value(self.intent_keys)?,
            tags: serde_json::from_value(self.tags)?,
            bridge_core_id: self.bridge_core_id.map(LoadoutId::from),
            below_deck_policy_id: self.below_deck_policy_id.map(LoadoutId::from),
            notes: self.notes,
        })
    }
}

const LOADOUT_COLUMNS: &str = "id, user_id, ship_ref_id, name, priority, is_active, \
                                intent_keys, tags, bridge_core_id, below_deck_policy_id, notes";

impl UserCompositionStore {
    /// Create a new loadout for `ship_ref_id` (§4.4 worked scenario:
    /// `create_loadout(shipRefId, name)`).
    pub async fn create_loadout(
        &self,
        ship_ref_id: fleet_core::RefId,
        name: impl Into<String>,
    ) -> Result<Loadout, CompositionError> {
        let loadout = Loadout {
            id: LoadoutId::from(uuid::Uuid::new_v4().to_string()),
            user_id: self.user_id.clone(),
            ship_ref_id,
            name: name.into(),
            priority: 0,
            is_active: false,
            intent_keys: Vec::new(),
            tags: Vec::new(),
            bridge_core_id: None,
            below_deck_policy_id: None,
            notes: None,
        };
        self.insert_loadout(&loadout).await?;
        Ok(loadout)
    }

    async fn insert_loadout(&self, loadout: &Loadout) -> Result<(), CompositionError> {
        let id = loadout.id.as_str().to_string();
        let user_id = self.user_id.as_str().to_string();
        let ship_ref_id = loadout.ship_ref_id.as_str().to_string();
        let name = loadout.name.clone();
        let priority = loadout.priority;
        let is_active = loadout.is_active;
        let intent_keys = serde_json::to_value(&loadout.intent_keys)?;
        let tags = serde_json::to_value(&loadout.tags)?;
        let bridge_core_id = loadout.bridge_core_id.as_ref().map(|v| v.as_str().to_string());
        let below_deck_policy_id = loadout.below_deck_policy_id.as_ref().map(|v| v.as_str().to_string());
        let notes = loadout.notes.clone();
        self.db
            .with_user_scope(&self.user_id, move |tx| {
                Box::pin(async move {
                    sqlx::query(&format!(
                        "INSERT INTO loadouts ({LOADOUT_COLUMNS}) \
                         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"
                    ))
                    .bind(id)
                    .bind(user_id)
                    .bind(ship_ref_id)
                    .bind(name)
                    .bind(priority)
                    .bind(is_active)
                    .bind(intent_keys)
                    .bind(tags)
                    .bind(bridge_core_id)
                    .bind(below_deck_policy_id)
                    .bind(notes)
                    .execute(&mut **tx)
                    .await
                    .map_err(fleet_db::DbError::Connect)
                })
            })
            .await?;
        Ok(())
    }

    /// Fetch one loadout by id, scoped to this user. Never returns a
    /// loadout owned by another user (RLS, §4.1).
    pub async fn get_loadout(&self, id: &LoadoutId) -> Result<Option<Loadout>, CompositionError> {
        let id = id.as_str().to_string();
        let row = self
            .db
            .with_user_read(&self.user_id, move |tx| {
                Box::pin(async move {
                    sqlx::query_as::<_, LoadoutRow>(&format!(
                        "SELECT {LOADOUT_COLUMNS} FROM loadouts WHERE id = $1"
                    ))
                    .bind(id)
                    .fetch_optional(&mut **tx)
                    .await
                    .map_err(fleet_db::DbError::Connect)
                })
            })
            .await?;
        row.map(LoadoutRow::into_domain).transpose()
    }

    /// List this user's loadouts, newest-inserted-last (row order).
    pub async fn list_loadouts(&self) -> Result<Vec<Loadout>, CompositionError> {
        let rows = self
            .db
            .with_user_read(&self.user_id, move |tx| {
                Box::pin(async move {
                    sqlx::query_as::<_, LoadoutRow>(&format!(
                        "SELECT {LOADOUT_COLUMNS} FROM loadouts ORDER BY name"
                    ))
                    .fetch_all(&mut **tx)
                    .await
                    .map_err(fleet_db::DbError::Connect)
                })
            })
            .await?;
        rows.into_iter().map(LoadoutRow::into_domain).collect()
    }

    /// Apply a [`LoadoutPatch`], returning the updated loadout. The caller
    /// (the tool runtime) is responsible for snapshotting the pre-patch
    /// state as the inverse before calling this, per §4.4's atomicity
    /// invariant.
    pub async fn update_loadout(
        &self,
        id: &LoadoutId,
        patch: LoadoutPatch,
    ) -> Result<Loadout, CompositionError> {
        let existing = self
            .get_loadout(id)
            .await?
            .ok_or_else(|| CompositionError::NotFound(id.clone()))?;
        let updated = patch.apply(existing);
        self.replace_loadout(&updated).await?;
        Ok(updated)
    }

    async fn replace_loadout(&self, loadout: &Loadout) -> Result<(), CompositionError> {
        let id = loadout.id.as_str().to_string();
        let name = loadout.name.clone();
        let priority = loadout.priority;
        let is_active = loadout.is_active;
        let intent_keys = serde_json::to_value(&loadout.intent_keys)?;
        let tags = serde_json::to_value(&loadout.tags)?;
        let bridge_core_id = loadout.bridge_core_id.as_ref().map(|v| v.as_str().to_string());
        let below_deck_policy_id = loadout.below_deck_policy_id.as_ref().map(|v| v.as_str().to_string());
        let notes = loadout.notes.clone();
        self.db
            .with_user_scope(&self.user_id, move |tx| {
                Box::pin(async move {
                    sqlx::query(
                        "UPDATE loadouts SET name = $1, priority = $2, is_active = $3, \
                         intent_keys = $4, tags = $5, bridge_core_id = $6, \
                         below_deck_policy_id = $7, notes = $8 WHERE id = $9",
                    )
                    .bind(name)
                    .bind(priority)
                    .bind(is_active)
                    .bind(intent_keys)
                    .bind(tags)
                    .bind(bridge_core_id)
                    .bind(below_deck_policy_id)
                    .bind(notes)
                    .bind(id)
                    .execute(&mut **tx)
                    .await
                    .map_err(fleet_db::DbError::Connect)
                })
            })
            .await?;
        Ok(())
    }

    /// Delete a loadout (§4.6 `delete_loadout`, system default `block`, so
    /// only ever reached via an explicit per-user trust override).
    pub async fn delete_loadout(&self, id: &LoadoutId) -> Result<(), CompositionError> {
        let existing = self
            .get_loadout(id)
            .await?
            .ok_or_else(|| CompositionError::NotFound(id.clone()))?;
        let id_s = existing.id.as_str().to_string();
        self.db
            .with_user_scope(&self.user_id, move |tx| {
                Box::pin(async move {
                    sqlx::query("DELETE FROM loadouts WHERE id = $1")
                        .bind(id_s)
                        .execute(&mut **tx)
                        .await
                        .map_err(fleet_db::DbError::Connect)
                })
            })
            .await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Loadout variants
// ---------------------------------------------------------------------------

#[derive(FromRow)]
struct LoadoutVariantRow {
    id: String,
    user_id: String,
    base_loadout_id: String,
    bridge: Option<serde_json::Value>,
    below_deck_mode: Option<String>,
    below_deck_spec: Option<serde_json::Value>,
    intent_keys: Option<serde_json::Value>,
}

impl LoadoutVariantRow {
    fn into_domain(self) -> Result<LoadoutVariant, CompositionError> {
        Ok(LoadoutVariant {
            id: LoadoutId::from(self.id),
            user_id: UserId::from(self.user_id),
            base_loadout_id: LoadoutId::from(self.base_loadout_id),
            bridge: self.bridge.map(serde_json::from_value).transpose()?,
            below_deck_mode: self.below_deck_mode.map(|s| parse_mode(&s)).transpose()?,
            below_deck_spec: self.below_deck_spec.map(serde_json::from_value).transpose()?,
            intent_keys: self.intent_keys.map(serde_json::from_value).transpose()?,
        })
    }
}

impl UserCompositionStore {
    /// Create a variant overlaying `base_loadout_id`. Errors if the base
    /// loadout does not exist for this user (§3 cross-entity invariant).
    pub async fn create_loadout_variant(
        &self,
        base_loadout_id: LoadoutId,
        bridge: Option<Vec<BridgeCoreMember>>,
        below_deck_mode: Option<BelowDeckMode>,
        below_deck_spec: Option<BelowDeckSpec>,
        intent_keys: Option<Vec<String>>,
    ) -> Result<LoadoutVariant, CompositionError> {
        if self.get_loadout(&base_loadout_id).await?.is_none() {
            return Err(CompositionError::BaseLoadoutNotFound(base_loadout_id));
        }
        let variant = LoadoutVariant {
            id: LoadoutId::from(uuid::Uuid::new_v4().to_string()),
            user_id: self.user_id.clone(),
            base_loadout_id,
            bridge,
            below_deck_mode,
            below_deck_spec,
            intent_keys,
        };
        let id = variant.id.as_str().to_string();
        let user_id = self.user_id.as_str().to_string();
        let base_loadout_id = variant.base_loadout_id.as_str().to_string();
        let bridge_json = variant.bridge.as_ref().map(serde_json::to_value).transpose()?;
        let mode_v = variant.below_deck_mode.map(mode_str);
        let spec_json = variant.below_deck_spec.as_ref().map(serde_json::to_value).transpose()?;
        let intent_keys_json = variant.intent_keys.as_ref().map(serde_json::to_value).transpose()?;
        self.db
            .with_user_scope(&self.user_id, move |tx| {
                Box::pin(async move {
                    sqlx::query(
                        "INSERT INTO loadout_variants \
                         (id, user_id, base_loadout_id, bridge, below_deck_mode, below_deck_spec, intent_keys) \
                         VALUES ($1, $2, $3, $4, $5, $6, $7)",
                    )
                    .bind(id)
                    .bind(user_id)
                    .bind(base_loadout_id)
                    .bind(bridge_json)
                    .bind(mode_v)
                    .bind(spec_json)
                    .bind(intent_keys_json)
                    .execute(&mut **tx)
                    .await
                    .map_err(fleet_db::DbError::Connect)
                })
            })
            .await?;
        Ok(variant)
    }

    /// Fetch one loadout variant by id, scoped to this user.
    pub async fn get_loadout_variant(
        &self,
        id: &LoadoutId,
    ) -> Result<Option<LoadoutVariant>, CompositionError> {
        let id = id.as_str().to_string();
        let row = self
            .db
            .with_user_read(&self.user_id, move |tx| {
                Box::pin(async move {
                    sqlx::query_as::<_, LoadoutVariantRow>(
                        "SELECT id, user_id, base_loadout_id, bridge, below_deck_mode, \
                         below_deck_spec, intent_keys FROM loadout_variants WHERE id = $1",
                    )
                    .bind(id)
                    .fetch_optional(&mut **tx)
                    .await
                    .map_err(fleet_db::DbError::Connect)
                })
            })
            .await?;
        row.map(LoadoutVariantRow::into_domain).transpose()
    }

    /// List variants overlaying `base_loadout_id` for this user.
    pub async fn list_loadout_variants(
        &self,
        base_loadout_id: &LoadoutId,
    ) -> Result<Vec<LoadoutVariant>, CompositionError> {
        let base = base_loadout_id.as_str().to_string();
        let rows = self
            .db
            .with_user_read(&self.user_id, move |tx| {
                Box::pin(async move {
                    sqlx::query_as::<_, LoadoutVariantRow>(
                        "SELECT id, user_id, base_loadout_id, bridge, below_deck_mode, \
                         below_deck_spec, intent_keys FROM loadout_variants \
                         WHERE base_loadout_id = $1",
                    )
                    .bind(base)
                    .fetch_all(&mut **tx)
                    .await
                    .map_err(fleet_db::DbError::Connect)
                })
            })
            .await?;
        rows.into_iter().map(LoadoutVariantRow::into_domain).collect()
    }
}

// ---------------------------------------------------------------------------
// Docks
// ---------------------------------------------------------------------------

#[derive(FromRow)]
struct DockRow {
    user_id: String,
    dock_number: i16,
    label: Option<String>,
    notes: Option<String>,
}

impl DockRow {
    fn into_domain(self) -> Result<Dock, CompositionError> {
        Ok(Dock {
            user_id: UserId::from(self.user_id),
            dock_number: DockNumber::new(self.dock_number as u8)?,
            label: self.label,
            notes: self.notes,
        })
    }
}

impl UserCompositionStore {
    /// Create or replace a sparse dock assignment (`dockNumber` is the
    /// primary key, §3).
    pub async fn set_dock(
        &self,
        dock_number: DockNumber,
        label: Option<String>,
        notes: Option<String>,
    ) -> Result<Dock, CompositionError> {
        let dock = Dock {
            user_id: self.user_id.clone(),
            dock_number,
            label,
            notes,
        };
        let user_id = self.user_id.as_str().to_string();
        let number = dock.dock_number.get() as i16;
        let label_v = dock.label.clone();
        let notes_v = dock.notes.clone();
        self.db
            .with_user_scope(&self.user_id, move |tx| {
                Box::pin(async move {
                    sqlx::query(
                        "INSERT INTO docks (user_id, dock_number, label, notes) \
                         VALUES ($1, $2, $3, $4) \
                         ON CONFLICT (user_id, dock_number) \
                         DO UPDATE SET label = EXCLUDED.label, notes = EXCLUDED.notes",
                    )
                    .bind(user_id)
                    .bind(number)
                    .bind(label_v)
                    .bind(notes_v)
                    .execute(&mut **tx)
                    .await
                    .map_err(fleet_db::DbError::Connect)
                })
            })
            .await?;
        Ok(dock)
    }

    /// List every dock this user has annotated.
    pub async fn list_docks(&self) -> Result<Vec<Dock>, CompositionError> {
        let rows = self
            .db
            .with_user_read(&self.user_id, move |tx| {
                Box::pin(async move {
                    sqlx::query_as::<_, DockRow>(
                        "SELECT user_id, dock_number, label, notes FROM docks ORDER BY dock_number",
                    )
                    .fetch_all(&mut **tx)
                    .await
                    .map_err(fleet_db::DbError::Connect)
                })
            })
            .await?;
        rows.into_iter().map(DockRow::into_domain).collect()
    }
}

// ---------------------------------------------------------------------------
// Plan items
// ---------------------------------------------------------------------------

#[derive(FromRow)]
struct PlanItemRow {
    id: String,
    user_id: String,
    intent_key: Option<String>,
    loadout_id: Option<String>,
    variant_id: Option<String>,
    dock_number: Option<i16>,
    away_officers: Option<serde_json::Value>,
    priority: i32,
    is_active: bool,
    source: String,
}

fn source_str(source: PlanItemSource) -> &'static str {
    match source {
        PlanItemSource::Manual => "manual",
        PlanItemSource::Preset => "preset",
    }
}

fn parse_source(s: &str) -> Result<PlanItemSource, CompositionError> {
    match s {
        "manual" => Ok(PlanItemSource::Manual),
        "preset" => Ok(PlanItemSource::Preset),
        other => Err(CompositionError::Corrupt(format!("unknown plan item source {other}"))),
    }
}

impl PlanItemRow {
    fn into_domain(self) -> Result<PlanItem, CompositionError> {
        Ok(PlanItem {
            id: LoadoutId::from(self.id),
            user_id: UserId::from(self.user_id),
            intent_key: self.intent_key,
            loadout_id: self.loadout_id.map(LoadoutId::from),
            variant_id: self.variant_id.map(LoadoutId::from),
            dock_number: self.dock_number.map(|n| DockNumber::new(n as u8)).transpose()?,
            away_officers: self.away_officers.map(serde_json::from_value).transpose()?,
            priority: self.priority,
            is_active: self.is_active,
            source: parse_source(&self.source)?,
        })
    }
}

impl UserCompositionStore {
    /// Create a scheduling entry layering a loadout/variant onto a dock
    /// (or an away-team assignment with no dock), per §3.
    #[allow(clippy::too_many_arguments)]
    pub async fn create_plan_item(
        &self,
        intent_key: Option<String>,
        loadout_id: Option<LoadoutId>,
        variant_id: Option<LoadoutId>,
        dock_number: Option<DockNumber>,
        away_officers: Option<Vec<fleet_core::RefId>>,
        priority: i32,
        is_active: bool,
        source: PlanItemSource,
    ) -> Result<PlanItem, CompositionError> {
        let item = PlanItem {
            id: LoadoutId::from(uuid::Uuid::new_v4().to_string()),
            user_id: self.user_id.clone(),
            intent_key,
            loadout_id,
            variant_id,
            dock_number,
            away_officers,
            priority,
            is_active,
            source,
        };
        let id = item.id.as_str().to_string();
        let user_id = self.user_id.as_str().to_string();
        let intent_key = item.intent_key.clone();
        let loadout_id = item.loadout_id.as_ref().map(|v| v.as_str().to_string());
        let variant_id = item.variant_id.as_ref().map(|v| v.as_str().to_string());
        let dock_number = item.dock_number.map(|d| d.get() as i16);
        let away_officers = item.away_officers.as_ref().map(serde_json::to_value).transpose()?;
        let priority = item.priority;
        let is_active = item.is_active;
        let source_v = source_str(item.source);
        self.db
            .with_user_scope(&self.user_id, move |tx| {
                Box::pin(async move {
                    sqlx::query(
                        "INSERT INTO plan_items \
                         (id, user_id, intent_key, loadout_id, variant_id, dock_number, \
                          away_officers, priority, is_active, source) \
                         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
                    )
                    .bind(id)
                    .bind(user_id)
                    .bind(intent_key)
                    .bind(loadout_id)
                    .bind(variant_id)
                    .bind(dock_number)
                    .bind(away_officers)
                    .bind(priority)
                    .bind(is_active)
                    .bind(source_v)
                    .execute(&mut **tx)
                    .await
                    .map_err(fleet_db::DbError::Connect)
                })
            })
            .await?;
        Ok(item)
    }

    /// List this user's plan items.
    pub async fn list_plan_items(&self) -> Result<Vec<PlanItem>, CompositionError> {
        let rows = self
            .db
            .with_user_read(&self.user_id, move |tx| {
                Box::pin(async move {
                    sqlx::query_as::<_, PlanItemRow>(
                        "SELECT id, user_id, intent_key, loadout_id, variant_id, dock_number, \
                         away_officers, priority, is_active, source FROM plan_items \
                         ORDER BY priority DESC",
                    )
                    .fetch_all(&mut **tx)
                    .await
                    .map_err(fleet_db::DbError::Connect)
                })
            })
            .await?;
        rows.into_iter().map(PlanItemRow::into_domain).collect()
    }
}

// ---------------------------------------------------------------------------
// Targets
// ---------------------------------------------------------------------------

#[derive(FromRow)]
struct TargetRow {
    id: String,
    user_id: String,
    target_type: String,
    ref_id: Option<String>,
    loadout_id: Option<String>,
    target_tier: Option<i32>,
    target_rank: Option<i32>,
    target_level: Option<i32>,
    priority: i16,
    status: String,
}

fn target_type_str(t: TargetType) -> &'static str {
    match t {
        TargetType::Officer => "officer",
        TargetType::Ship => "ship",
        TargetType::Crew => "crew",
        TargetType::Ops => "ops",
    }
}

fn parse_target_type(s: &str) -> Result<TargetType, CompositionError> {
    match s {
        "officer" => Ok(TargetType::Officer),
        "ship" => Ok(TargetType::Ship),
        "crew" => Ok(TargetType::Crew),
        "ops" => Ok(TargetType::Ops),
        other => Err(CompositionError::Corrupt(format!("unknown target type {other}"))),
    }
}

fn target_status_str(s: TargetStatus) -> &'static str {
    match s {
        TargetStatus::Active => "active",
        TargetStatus::Achieved => "achieved",
        TargetStatus::Abandoned => "abandoned",
    }
}

fn parse_target_status(s: &str) -> Result<TargetStatus, CompositionError> {
    match s {
        "active" => Ok(TargetStatus::Active),
        "achieved" => Ok(TargetStatus::Achieved),
        "abandoned" => Ok(TargetStatus::Abandoned),
        other => Err(CompositionError::Corrupt(format!("unknown target status {other}"))),
    }
}

impl TargetRow {
    fn into_domain(self) -> Result<Target, CompositionError> {
        Ok(Target {
            id: TargetId::from(self.id),
            user_id: UserId::from(self.user_id),
            target_type: parse_target_type(&self.target_type)?,
            ref_id: self.ref_id.map(fleet_core::RefId::from),
            loadout_id: self.loadout_id.map(LoadoutId::from),
            target_tier: self.target_tier,
            target_rank: self.target_rank,
            target_level: self.target_level,
            priority: Priority::new(self.priority as u8)?,
            status: parse_target_status(&self.status)?,
        })
    }
}

const TARGET_COLUMNS: &str = "id, user_id, target_type, ref_id, loadout_id, target_tier, \
                               target_rank, target_level, priority, status";

impl UserCompositionStore {
    /// Create a new goal-tracking target (§4.4 worked scenario:
    /// `create_target(targetType, refId, priority)`).
    #[allow(clippy::too_many_arguments)]
    pub async fn create_target(
        &self,
        target_type: TargetType,
        ref_id: Option<fleet_core::RefId>,
        loadout_id: Option<LoadoutId>,
        target_tier: Option<i32>,
        target_rank: Option<i32>,
        target_level: Option<i32>,
        priority: Priority,
    ) -> Result<Target, CompositionError> {
        let target = Target {
            id: TargetId::from(uuid::Uuid::new_v4().to_string()),
            user_id: self.user_id.clone(),
            target_type,
            ref_id,
            loadout_id,
            target_tier,
            target_rank,
            target_level,
            priority,
            status: TargetStatus::Active,
        };
        self.insert_target(&target).await?;
        Ok(target)
    }

    async fn insert_target(&self, target: &Target) -> Result<(), CompositionError> {
        let id = target.id.as_str().to_string();
        let user_id = self.user_id.as_str().to_string();
        let target_type = target_type_str(target.target_type);
        let ref_id = target.ref_id.as_ref().map(|v| v.as_str().to_string());
        let loadout_id = target.loadout_id.as_ref().map(|v| v.as_str().to_string());
        let target_tier = target.target_tier;
        let target_rank = target.target_rank;
        let target_level = target.target_level;
        let priority = target.priority.get() as i16;
        let status = target_status_str(target.status);
        self.db
            .with_user_scope(&self.user_id, move |tx| {
                Box::pin(async move {
                    sqlx::query(&format!(
                        "INSERT INTO targets ({TARGET_COLUMNS}) \
                         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
                    ))
                    .bind(id)
                    .bind(user_id)
                    .bind(target_type)
                    .bind(ref_id)
                    .bind(loadout_id)
                    .bind(target_tier)
                    .bind(target_rank)
                    .bind(target_level)
                    .bind(priority)
                    .bind(status)
                    .execute(&mut **tx)
                    .await
                    .map_err(fleet_db::DbError::Connect)
                })
            })
            .await?;
        Ok(())
    }

    /// Fetch one target by id, scoped to this user.
    pub async fn get_target(&self, id: &TargetId) -> Result<Option<Target>, CompositionError> {
        let id = id.as_str().to_string();
        let row = self
            .db
            .with_user_read(&self.user_id, move |tx| {
                Box::pin(async move {
                    sqlx::query_as::<_, TargetRow>(&format!(
                        "SELECT {TARGET_COLUMNS} FROM targets WHERE id = $1"
                    ))
                    .bind(id)
                    .fetch_optional(&mut **tx)
                    .await
                    .map_err(fleet_db::DbError::Connect)
                })
            })
            .await?;
        row.map(TargetRow::into_domain).transpose()
    }

    /// List this user's targets, optionally filtered by status.
    pub async fn list_targets(
        &self,
        status: Option<TargetStatus>,
    ) -> Result<Vec<Target>, CompositionError> {
        let status_filter = status.map(target_status_str);
        let rows = self
            .db
            .with_user_read(&self.user_id, move |tx| {
                Box::pin(async move {
                    match status_filter {
                        Some(s) => {
                            sqlx::query_as::<_, TargetRow>(&format!(
                                "SELECT {TARGET_COLUMNS} FROM targets WHERE status = $1 \
                                 ORDER BY priority ASC"
                            ))
                            .bind(s)
                            .fetch_all(&mut **tx)
                            .await
                        }
                        None => {
                            sqlx::query_as::<_, TargetRow>(&format!(
                                "SELECT {TARGET_COLUMNS} FROM targets ORDER BY priority ASC"
                            ))
                            .fetch_all(&mut **tx)
                            .await
                        }
                    }
                    .map_err(fleet_db::DbError::Connect)
                })
            })
            .await?;
        rows.into_iter().map(TargetRow::into_domain).collect()
    }

    /// Apply a [`TargetPatch`] (§4.4 `update_target`). The caller snapshots
    /// the pre-patch state as the receipt's inverse.
    pub async fn update_target(
        &self,
        id: &TargetId,
        patch: TargetPatch,
    ) -> Result<Target, CompositionError> {
        let existing = self
            .get_target(id)
            .await?
            .ok_or_else(|| CompositionError::NotFound(LoadoutId::from(id.as_str().to_string())))?;
        let updated = patch.apply(existing);
        self.replace_target(&updated).await?;
        Ok(updated)
    }

    async fn replace_target(&self, target: &Target) -> Result<(), CompositionError> {
        let id = target.id.as_str().to_string();
        let target_tier = target.target_tier;
        let target_rank = target.target_rank;
        let target_level = target.target_level;
        let priority = target.priority.get() as i16;
        let status = target_status_str(target.status);
        self.db
            .with_user_scope(&self.user_id, move |tx| {
                Box::pin(async move {
                    sqlx::query(
                        "UPDATE targets SET target_tier = $1, target_rank = $2, \
                         target_level = $3, priority = $4, status = $5 WHERE id = $6",
                    )
                    .bind(target_tier)
                    .bind(target_rank)
                    .bind(target_level)
                    .bind(priority)
                    .bind(status)
                    .bind(id)
                    .execute(&mut **tx)
                    .await
                    .map_err(fleet_db::DbError::Connect)
                })
            })
            .await?;
        Ok(())
    }

    /// Mark a target `achieved` (§4.4 worked tool `complete_target`).
    pub async fn complete_target(&self, id: &TargetId) -> Result<Target, CompositionError> {
        self.update_target(
            id,
            TargetPatch {
                status: fleet_core::Patch::Value(TargetStatus::Achieved),
                ..Default::default()
            },
        )
        .await
    }

    /// Delete a target (§4.6 `delete_target`, system default `block`).
    pub async fn delete_target(&self, id: &TargetId) -> Result<(), CompositionError> {
        let id_s = id.as_str().to_string();
        self.db
            .with_user_scope(&self.user_id, move |tx| {
                Box::pin(async move {
                    sqlx::query("DELETE FROM targets WHERE id = $1")
                        .bind(id_s)
                        .execute(&mut **tx)
                        .await
                        .map_err(fleet_db::DbError::Connect)
                })
            })
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_str_roundtrips() {
        for m in [
            BelowDeckMode::StatsThenBda,
            BelowDeckMode::PinnedOnly,
            BelowDeckMode::StatFillOnly,
        ] {
            assert_eq!(parse_mode(mode_str(m)).unwrap(), m);
        }
    }

    #[test]
    fn target_type_str_roundtrips() {
        for t in [TargetType::Officer, TargetType::Ship, TargetType::Crew, TargetType::Ops] {
            assert_eq!(parse_target_type(target_type_str(t)).unwrap(), t);
        }
    }

    #[test]
    fn target_status_str_roundtrips() {
        for s in [TargetStatus::Active, TargetStatus::Achieved, TargetStatus::Abandoned] {
            assert_eq!(parse_target_status(target_status_str(s)).unwrap(), s);
        }
    }

    #[test]
    fn source_str_roundtrips() {
        for s in [PlanItemSource::Manual, PlanItemSource::Preset] {
            assert_eq!(parse_source(source_str(s)).unwrap(), s);
        }
    }
}
