//! Transaction-joining variants of the composition-layer writes the tool
//! runtime in `fleet-session` needs for the `auto` trust tier (§4.5,
//! §4.4's atomicity invariant: "the proposal's apply, the entity mutation,
//! and the receipt write commit together or not at all").
//!
//! Every other method on [`crate::UserCompositionStore`] opens its own
//! [`fleet_db::Db::with_user_scope`] call, which is right for a plain CRUD
//! read/write but cannot join a caller's own transaction. These functions
//! mirror [`fleet_proposal::UserProposalStore::apply_in_tx`] and
//! [`fleet_receipt_store::UserReceiptStore::insert_in_tx`]: free functions
//! (not methods — there is no `self` holding a pool to borrow from) that
//! take an already-open `&mut Transaction` and assume the caller has
//! already run `SET LOCAL app.current_user_id` on it.
//!
//! Each "update"/"delete" variant returns the pre-mutation row alongside
//! the result, since that is exactly the inverse a receipt needs and the
//! caller has no other way to snapshot it inside the same transaction.

use crate::{
    BridgeCoreRow, LoadoutRow, TargetRow, LOADOUT_COLUMNS, TARGET_COLUMNS, target_status_str,
    target_type_str,
};
use crate::error::CompositionError;
use fleet_core::{
    BridgeCore, BridgeCoreMember, Loadout, LoadoutId, LoadoutPatch, PlanItem, PlanItemSource,
    Priority, RefId, Target, TargetId, TargetPatch, TargetType, UserId,
};
use sqlx::{Postgres, Transaction};

/// Insert a new loadout inside the caller's transaction.
#[allow(clippy::too_many_arguments)]
pub async fn create_loadout_in_tx<'c>(
    tx: &mut Transaction<'c, Postgres>,
    user_id: &UserId,
    ship_ref_id: RefId,
    name: String,
) -> Result<Loadout, CompositionError> {
    let loadout = Loadout {
        id: LoadoutId::from(uuid::Uuid::new_v4().to_string()),
        user_id: user_id.clone(),
        ship_ref_id,
        name,
        priority: 0,
        is_active: false,
        intent_keys: Vec::new(),
        tags: Vec::new(),
        bridge_core_id: None,
        below_deck_policy_id: None,
        notes: None,
    };
    insert_loadout_row(tx, &loadout).await?;
    Ok(loadout)
}

async fn insert_loadout_row<'c>(
    tx: &mut Transaction<'c, Postgres>,
    loadout: &Loadout,
) -> Result<(), CompositionError> {
    let intent_keys = serde_json::to_value(&loadout.intent_keys)?;
    let tags = serde_json::to_value(&loadout.tags)?;
    sqlx::query(&format!(
        "INSERT INTO loadouts ({LOADOUT_COLUMNS}) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"
    ))
    .bind(loadout.id.as_str())
    .bind(loadout.user_id.as_str())
    .bind(loadout.ship_ref_id.as_str())
    .bind(&loadout.name)
    .bind(loadout.priority)
    .bind(loadout.is_active)
    .bind(intent_keys)
    .bind(tags)
    .bind(loadout.bridge_core_id.as_ref().map(|v| v.as_str()))
    .bind(loadout.below_deck_policy_id.as_ref().map(|v| v.as_str()))
    .bind(&loadout.notes)
    .execute(&mut **tx)
    .await
    .map_err(fleet_db::DbError::Connect)?;
    Ok(())
}

async fn fetch_loadout_for_update<'c>(
    tx: &mut Transaction<'c, Postgres>,
    id: &LoadoutId,
) -> Result<Loadout, CompositionError> {
    let row = sqlx::query_as::<_, LoadoutRow>(&format!(
        "SELECT {LOADOUT_COLUMNS} FROM loadouts WHERE id = $1 FOR UPDATE"
    ))
    .bind(id.as_str())
    .fetch_optional(&mut **tx)
    .await
    .map_err(fleet_db::DbError::Connect)?
    .ok_or_else(|| CompositionError::NotFound(id.clone()))?;
    row.into_domain()
}

/// Apply a [`LoadoutPatch`] inside the caller's transaction, returning
/// `(before, after)`.
pub async fn update_loadout_in_tx<'c>(
    tx: &mut Transaction<'c, Postgres>,
    id: &LoadoutId,
    patch: LoadoutPatch,
) -> Result<(Loadout, Loadout), CompositionError> {
    let before = fetch_loadout_for_update(tx, id).await?;
    let after = patch.apply(before.clone());
    let intent_keys = serde_json::to_value(&after.intent_keys)?;
    let tags = serde_json::to_value(&after.tags)?;
    sqlx::query(
        "UPDATE loadouts SET name = $1, priority = $2, is_active = $3, \
         intent_keys = $4, tags = $5, bridge_core_id = $6, \
         below_deck_policy_id = $7, notes = $8 WHERE id = $9",
    )
    .bind(&after.name)
    .bind(after.priority)
    .bind(after.is_active)
    .bind(intent_keys)
    .bind(tags)
    .bind(after.bridge_core_id.as_ref().map(|v| v.as_str()))
    .bind(after.below_deck_policy_id.as_ref().map(|v| v.as_str()))
    .bind(&after.notes)
    .bind(id.as_str())
    .execute(&mut **tx)
    .await
    .map_err(fleet_db::DbError::Connect)?;
    Ok((before, after))
}

/// Delete a loadout inside the caller's transaction, returning the deleted
/// row so the caller can record it as the receipt's inverse.
pub async fn delete_loadout_in_tx<'c>(
    tx: &mut Transaction<'c, Postgres>,
    id: &LoadoutId,
) -> Result<Loadout, CompositionError> {
    let before = fetch_loadout_for_update(tx, id).await?;
    sqlx::query("DELETE FROM loadouts WHERE id = $1")
        .bind(id.as_str())
        .execute(&mut **tx)
        .await
        .map_err(fleet_db::DbError::Connect)?;
    Ok(before)
}

async fn fetch_bridge_core_for_update<'c>(
    tx: &mut Transaction<'c, Postgres>,
    id: &LoadoutId,
) -> Result<BridgeCore, CompositionError> {
    let row = sqlx::query_as::<_, BridgeCoreRow>(
        "SELECT id, user_id, name, members FROM bridge_cores WHERE id = $1 FOR UPDATE",
    )
    .bind(id.as_str())
    .fetch_optional(&mut **tx)
    .await
    .map_err(fleet_db::DbError::Connect)?
    .ok_or_else(|| CompositionError::NotFound(id.clone()))?;
    row.into_domain()
}

/// Reassign a bridge core's members inside the caller's transaction (§4.5
/// `assign_bridge_core`), returning `(before, after)`.
pub async fn set_bridge_core_members_in_tx<'c>(
    tx: &mut Transaction<'c, Postgres>,
    id: &LoadoutId,
    members: Vec<BridgeCoreMember>,
) -> Result<(BridgeCore, BridgeCore), CompositionError> {
    let before = fetch_bridge_core_for_update(tx, id).await?;
    let after = BridgeCore {
        members,
        ..before.clone()
    };
    let members_json = serde_json::to_value(&after.members)?;
    sqlx::query("UPDATE bridge_cores SET members = $1 WHERE id = $2")
        .bind(members_json)
        .bind(id.as_str())
        .execute(&mut **tx)
        .await
        .map_err(fleet_db::DbError::Connect)?;
    Ok((before, after))
}

/// Insert a new target inside the caller's transaction (§4.4 worked
/// scenario: `create_target(targetType, refId, priority)`, classified
/// `auto`).
#[allow(clippy::too_many_arguments)]
pub async fn create_target_in_tx<'c>(
    tx: &mut Transaction<'c, Postgres>,
    user_id: &UserId,
    target_type: TargetType,
    ref_id: Option<RefId>,
    loadout_id: Option<LoadoutId>,
    target_tier: Option<i32>,
    target_rank: Option<i32>,
    target_level: Option<i32>,
    priority: Priority,
) -> Result<Target, CompositionError> {
    let target = Target {
        id: TargetId::from(uuid::Uuid::new_v4().to_string()),
        user_id: user_id.clone(),
        target_type,
        ref_id,
        loadout_id,
        target_tier,
        target_rank,
        target_level,
        priority,
        status: fleet_core::TargetStatus::Active,
    };
    sqlx::query(&format!(
        "INSERT INTO targets ({TARGET_COLUMNS}) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
    ))
    .bind(target.id.as_str())
    .bind(target.user_id.as_str())
    .bind(target_type_str(target.target_type))
    .bind(target.ref_id.as_ref().map(|v| v.as_str()))
    .bind(target.loadout_id.as_ref().map(|v| v.as_str()))
    .bind(target.target_tier)
    .bind(target.target_rank)
    .bind(target.target_level)
    .bind(target.priority.get() as i16)
    .bind(target_status_str(target.status))
    .execute(&mut **tx)
    .await
    .map_err(fleet_db::DbError::Connect)?;
    Ok(target)
}

async fn fetch_target_for_update<'c>(
    tx: &mut Transaction<'c, Postgres>,
    id: &TargetId,
) -> Result<Target, CompositionError> {
    let row = sqlx::query_as::<_, TargetRow>(&format!(
        "SELECT {TARGET_COLUMNS} FROM targets WHERE id = $1 FOR UPDATE"
    ))
    .bind(id.as_str())
    .fetch_optional(&mut **tx)
    .await
    .map_err(fleet_db::DbError::Connect)?
    .ok_or_else(|| CompositionError::NotFound(LoadoutId::from(id.as_str().to_string())))?;
    row.into_domain()
}

/// Apply a [`TargetPatch`] inside the caller's transaction (§4.4
/// `update_target`/`complete_target`, both `auto`), returning `(before,
/// after)`.
pub async fn update_target_in_tx<'c>(
    tx: &mut Transaction<'c, Postgres>,
    id: &TargetId,
    patch: TargetPatch,
) -> Result<(Target, Target), CompositionError> {
    let before = fetch_target_for_update(tx, id).await?;
    let after = patch.apply(before.clone());
    sqlx::query(
        "UPDATE targets SET target_tier = $1, target_rank = $2, \
         target_level = $3, priority = $4, status = $5 WHERE id = $6",
    )
    .bind(after.target_tier)
    .bind(after.target_rank)
    .bind(after.target_level)
    .bind(after.priority.get() as i16)
    .bind(target_status_str(after.status))
    .bind(id.as_str())
    .execute(&mut **tx)
    .await
    .map_err(fleet_db::DbError::Connect)?;
    Ok((before, after))
}

/// Delete a target inside the caller's transaction (§4.6 `delete_target`,
/// system default `block`), returning the deleted row.
pub async fn delete_target_in_tx<'c>(
    tx: &mut Transaction<'c, Postgres>,
    id: &TargetId,
) -> Result<Target, CompositionError> {
    let before = fetch_target_for_update(tx, id).await?;
    sqlx::query("DELETE FROM targets WHERE id = $1")
        .bind(id.as_str())
        .execute(&mut **tx)
        .await
        .map_err(fleet_db::DbError::Connect)?;
    Ok(before)
}

/// Insert a preset-sourced plan item inside the caller's transaction (§8
/// worked scenario 6: `activate_preset`, system default `block`, reachable
/// only via a per-user trust override).
#[allow(clippy::too_many_arguments)]
pub async fn create_preset_plan_item_in_tx<'c>(
    tx: &mut Transaction<'c, Postgres>,
    user_id: &UserId,
    intent_key: Option<String>,
    loadout_id: Option<LoadoutId>,
    priority: i32,
) -> Result<PlanItem, CompositionError> {
    let item = PlanItem {
        id: LoadoutId::from(uuid::Uuid::new_v4().to_string()),
        user_id: user_id.clone(),
        intent_key,
        loadout_id,
        variant_id: None,
        dock_number: None,
        away_officers: None,
        priority,
        is_active: true,
        source: PlanItemSource::Preset,
    };
    sqlx::query(
        "INSERT INTO plan_items \
         (id, user_id, intent_key, loadout_id, variant_id, dock_number, \
          away_officers, priority, is_active, source) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
    )
    .bind(item.id.as_str())
    .bind(item.user_id.as_str())
    .bind(&item.intent_key)
    .bind(item.loadout_id.as_ref().map(|v| v.as_str()))
    .bind(item.variant_id.as_ref().map(|v| v.as_str()))
    .bind(item.dock_number.map(|d| d.get() as i16))
    .bind(item.away_officers.as_ref().map(serde_json::to_value).transpose()?)
    .bind(item.priority)
    .bind(item.is_active)
    .bind("preset")
    .execute(&mut **tx)
    .await
    .map_err(fleet_db::DbError::Connect)?;
    Ok(item)
}

#[cfg(test)]
mod tests {
    // The functions in this module require a live Postgres connection to
    // exercise (they operate on a caller-supplied open transaction); they
    // are covered by the workspace-root integration tests gated
    // `#[ignore]`, not by crate-local unit tests.
}
