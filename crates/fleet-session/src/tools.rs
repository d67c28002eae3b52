//! Tool runtime: the mutation-gating protocol every mutating tool call
//! passes through before it is allowed to touch a user's data (§4.5, §4.6).
//!
//! A tool call never mutates directly. [`ToolRuntime::call`] resolves a
//! trust tier for `(tool, user)` via `fleet-policy`, then either refuses it
//! outright (`block`), stages it as a [`fleet_core::MutationProposal`] for
//! the user to confirm later (`approve`), or executes the entity mutation,
//! the receipt write, and the proposal's own `proposed -> applied`
//! transition together in one transaction (`auto`), per §4.4's atomicity
//! invariant.

use crate::error::SessionError;
use chrono::{DateTime, Utc};
use fleet_catalog::CatalogStore;
use fleet_composition::{tx_ops, CompositionStore};
use fleet_config::FleetConfig;
use fleet_core::{
    BridgeCoreMember, ImportLayer, ImportReceipt, LoadoutId, LoadoutPatch, MutationProposal,
    OfficerOverlayPatch, Priority, ProposalId, RefId, ShipOverlayPatch, TargetId, TargetPatch,
    TargetStatus, TargetType, UserId,
};
use fleet_db::Db;
use fleet_policy::{PolicyStore, TrustPolicy, TrustTier};
use fleet_proposal::ProposalStore;
use fleet_receipt::ReceiptBuilder;
use fleet_receipt_store::ReceiptStore;
use serde::Deserialize;
use std::sync::Arc;

/// Result of routing a mutating tool call through the trust-tier gate.
#[derive(Debug, Clone)]
pub enum ToolOutcome {
    /// `auto` tier: the mutation, its receipt, and the proposal's own
    /// `applied` transition all committed in one transaction.
    Applied {
        /// The proposal, already in `applied` status.
        proposal: MutationProposal,
        /// The receipt recording the mutation and its inverse.
        receipt: ImportReceipt,
    },
    /// `approve` tier: nothing was mutated; a proposal now awaits
    /// confirmation.
    Proposed {
        /// The newly created proposal's id.
        proposal_id: ProposalId,
        /// When the proposal expires if never confirmed.
        expires_at: DateTime<Utc>,
        /// Human-legible preview of what confirming would do.
        preview: serde_json::Value,
    },
}

/// A tool name this runtime does not know how to dispatch, even though it
/// passed mutation classification — the policy/proposal machinery still
/// ran, but there is no handler to actually perform the write.
const KNOWN_MUTATING_TOOLS: &[&str] = &[
    "activate_preset",
    "delete_loadout",
    "delete_target",
    "create_loadout",
    "update_loadout",
    "assign_bridge_core",
    "create_target",
    "update_target",
    "complete_target",
    "sync_overlay",
];

const MUTATING_PREFIXES: &[&str] = &[
    "create_", "update_", "delete_", "set_", "sync_", "assign_", "remove_", "complete_",
];

const READ_ONLY_PREFIXES: &[&str] = &["get_", "list_", "search_", "read_"];

/// True if `tool` is one of the read-only prefixes that bypass the
/// proposal path entirely, regardless of whether it also happens to match
/// a mutating prefix (§4.5: read-only tools are checked first).
pub fn is_read_only_tool(tool: &str) -> bool {
    READ_ONLY_PREFIXES.iter().any(|prefix| tool.starts_with(prefix))
}

/// True if `tool` must be routed through the trust-tier gate: either it is
/// named in the known mutation list, or its name begins with one of the
/// mutating prefixes and it is not read-only (§4.5).
pub fn is_mutating_tool(tool: &str) -> bool {
    if is_read_only_tool(tool) {
        return false;
    }
    KNOWN_MUTATING_TOOLS.contains(&tool)
        || MUTATING_PREFIXES.iter().any(|prefix| tool.starts_with(prefix))
}

/// Stores and shared configuration a [`ToolRuntime`] dispatches mutating
/// tool calls through. Constructed once at startup and cloned per request
/// (every field is itself cheap to clone — pool handles or an `Arc`).
#[derive(Clone)]
pub struct ToolRuntime {
    db: Db,
    composition: CompositionStore,
    catalog: CatalogStore,
    proposals: ProposalStore,
    policy: PolicyStore,
    receipts: ReceiptStore,
    defaults: Arc<TrustPolicy>,
    config: Arc<FleetConfig>,
}

impl ToolRuntime {
    /// Wrap the stores and configuration every mutating tool call needs.
    /// `defaults` is the system trust map (§4.6 step 2), shared read-only
    /// process-wide.
    pub fn new(db: Db, config: FleetConfig, defaults: TrustPolicy) -> Self {
        Self {
            composition: CompositionStore::new(db.clone()),
            catalog: CatalogStore::new(db.clone()),
            proposals: ProposalStore::new(db.clone()),
            policy: PolicyStore::new(db.clone()),
            receipts: ReceiptStore::new(db.clone()),
            db,
            defaults: Arc::new(defaults),
            config: Arc::new(config),
        }
    }

    /// Route one mutating tool call through the trust-tier gate (§4.5's
    /// "Tool runtime contract"). `args` is the tool's raw JSON input.
    ///
    /// Callers are expected to have already checked [`is_mutating_tool`];
    /// calling this for a read-only tool is not itself an error, but it
    /// pays the policy-lookup cost for no reason since every unclassified
    /// tool defaults to `approve` (§4.6 step 3).
    pub async fn call(
        &self,
        user_id: &UserId,
        tool: &str,
        args: serde_json::Value,
    ) -> Result<ToolOutcome, SessionError> {
        if !KNOWN_MUTATING_TOOLS.contains(&tool) {
            return Err(SessionError::UnknownTool(tool.to_string()));
        }

        let trust = self
            .policy
            .for_user(user_id.clone())
            .resolve(tool, &self.defaults)
            .await;

        match trust {
            TrustTier::Block => Err(SessionError::ToolBlocked(tool.to_string())),
            TrustTier::Approve => self.propose(user_id, tool, args).await,
            TrustTier::Auto => self.apply(user_id, tool, args).await,
        }
    }

    /// `approve` tier: dry-run the tool to build a preview, persist a
    /// proposal, and stop — nothing is mutated (§4.5).
    async fn propose(
        &self,
        user_id: &UserId,
        tool: &str,
        args: serde_json::Value,
    ) -> Result<ToolOutcome, SessionError> {
        let preview = self.dry_run(user_id, tool, &args).await?;
        let proposal = self
            .proposals
            .for_user(user_id.clone())
            .create(tool, args, preview.clone(), None, None, &self.config)
            .await?;
        Ok(ToolOutcome::Proposed {
            proposal_id: proposal.id,
            expires_at: proposal.expires_at,
            preview,
        })
    }

    /// `auto` tier: create the proposal, then apply it, the entity
    /// mutation, and the receipt write all inside one transaction (§4.4's
    /// atomicity invariant). Creating the proposal row happens first, in
    /// its own transaction — if the process dies between the two, the row
    /// is left `proposed` and harmlessly swept by `expireStale` later;
    /// nothing downstream of that point is allowed to half-commit.
    async fn apply(
        &self,
        user_id: &UserId,
        tool: &str,
        args: serde_json::Value,
    ) -> Result<ToolOutcome, SessionError> {
        let preview = self.dry_run(user_id, tool, &args).await?;
        let created = self
            .proposals
            .for_user(user_id.clone())
            .create(tool, args.clone(), preview, None, None, &self.config)
            .await?;

        // `sync_overlay` has no `_in_tx` writer in `fleet-catalog` (only
        // `fleet-composition` exposes one); it goes through its own
        // back-to-back-transaction path rather than the shared closure
        // below (see DESIGN.md's note on this store's weaker atomicity).
        if tool == "sync_overlay" {
            return self.apply_sync_overlay(user_id, &created.id, args).await;
        }

        self.apply_existing(user_id, tool, &created.id, args).await
    }

    /// Transition an already-`proposed` proposal to `applied`, running the
    /// tool's entity mutation and receipt write in the same transaction as
    /// the proposal's own state change (§4.4's atomicity invariant). Used
    /// by `auto`-tier [`Self::apply`] right after creating the proposal,
    /// and by [`Self::confirm`] for a proposal an `approve`-tier caller
    /// created earlier and is now confirming.
    async fn apply_existing(
        &self,
        user_id: &UserId,
        tool: &str,
        proposal_id: &ProposalId,
        args: serde_json::Value,
    ) -> Result<ToolOutcome, SessionError> {
        let tool = tool.to_string();
        let user_id_owned = user_id.clone();
        let proposal_id = proposal_id.clone();

        let (proposal, receipt) = self
            .db
            .with_user_scope(user_id, move |tx| {
                Box::pin(async move {
                    let receipt_builder = build_mutation(tx, &user_id_owned, &tool, args).await?;
                    let receipt_id = fleet_core::ReceiptId::from(uuid::Uuid::new_v4().to_string());
                    let receipt = receipt_builder.build(receipt_id);
                    let receipt =
                        fleet_receipt_store::UserReceiptStore::insert_in_tx(tx, &user_id_owned, receipt)
                            .await?;
                    let proposal =
                        fleet_proposal::UserProposalStore::apply_in_tx(tx, &proposal_id, &receipt.id)
                            .await?;
                    Ok::<_, SessionError>((proposal, receipt))
                })
            })
            .await?;

        Ok(ToolOutcome::Applied { proposal, receipt })
    }

    /// Confirm an `approve`-tier proposal a user created earlier: re-run
    /// its tool's mutation from the stored `args_json` and transition the
    /// proposal to `applied` (§4.4 `apply`). The caller is responsible for
    /// loading and rank-checking the proposal; this only re-dispatches the
    /// tool and commits the three writes together.
    pub async fn confirm(
        &self,
        user_id: &UserId,
        proposal: &MutationProposal,
    ) -> Result<ToolOutcome, SessionError> {
        if proposal.tool == "sync_overlay" {
            return self
                .apply_sync_overlay(user_id, &proposal.id, proposal.args_json.clone())
                .await;
        }
        self.apply_existing(user_id, &proposal.tool, &proposal.id, proposal.args_json.clone())
            .await
    }

    /// `auto` tier for `sync_overlay`: the overlay write (via
    /// `fleet-catalog`) and the receipt write are two sequential
    /// transactions rather than one joint transaction, then the proposal's
    /// own `applied` transition is a third, narrow write. A crash between
    /// any of the three leaves the overlay applied but not yet receipted/
    /// confirmed rather than rolled back together; see DESIGN.md.
    async fn apply_sync_overlay(
        &self,
        user_id: &UserId,
        proposal_id: &ProposalId,
        args: serde_json::Value,
    ) -> Result<ToolOutcome, SessionError> {
        let args: SyncOverlayArgs = parse_args("sync_overlay", &args)?;
        let catalog = self.catalog.for_user(user_id.clone());
        let mut builder =
            ReceiptBuilder::new(user_id.clone(), "sync_overlay".to_string(), ImportLayer::Ownership);

        match args {
            SyncOverlayArgs::Officer { ref_id, patch } => {
                let ref_id = RefId::from(ref_id);
                let before = catalog.get_merged_officer(&self.catalog, &ref_id).await?;
                let after = catalog.set_officer_overlay(&ref_id, patch).await?;
                builder = builder.add_updated(
                    serde_json::to_value(&before.overlay)?,
                    serde_json::to_value(&after)?,
                );
            }
            SyncOverlayArgs::Ship { ref_id, patch } => {
                let ref_id = RefId::from(ref_id);
                let before = catalog.get_merged_ship(&self.catalog, &ref_id).await?;
                let after = catalog.set_ship_overlay(&ref_id, patch).await?;
                builder = builder.add_updated(
                    serde_json::to_value(&before.overlay)?,
                    serde_json::to_value(&after)?,
                );
            }
        }

        let receipt_id = fleet_core::ReceiptId::from(uuid::Uuid::new_v4().to_string());
        let receipt = builder.build(receipt_id);
        let receipt = self.receipts.for_user(user_id.clone()).insert(receipt).await?;
        let proposal = self
            .proposals
            .for_user(user_id.clone())
            .apply(proposal_id, &receipt.id)
            .await?;
        Ok(ToolOutcome::Applied { proposal, receipt })
    }

    /// Produce the preview a confirming user (or `auto`-tier caller) would
    /// see, without writing anything. Shares argument parsing with
    /// [`build_mutation`] but reads current rows through each store's
    /// plain (non-`_in_tx`) accessors rather than a transaction, since a
    /// dry run never needs row-level locking.
    async fn dry_run(
        &self,
        user_id: &UserId,
        tool: &str,
        args: &serde_json::Value,
    ) -> Result<serde_json::Value, SessionError> {
        let composition = self.composition.for_user(user_id.clone());
        let catalog = self.catalog.for_user(user_id.clone());

        let preview = match tool {
            "create_loadout" => {
                let args: CreateLoadoutArgs = parse_args(tool, args)?;
                serde_json::json!({
                    "action": "create_loadout",
                    "ship_ref_id": args.ship_ref_id,
                    "name": args.name,
                })
            }
            "update_loadout" => {
                let args: IdPatchArgs<LoadoutPatch> = parse_args(tool, args)?;
                let id = LoadoutId::from(args.id.clone());
                let before = composition
                    .get_loadout(&id)
                    .await?
                    .ok_or_else(|| SessionError::InvalidArgs {
                        tool: tool.to_string(),
                        detail: format!("loadout {} not found", args.id),
                    })?;
                let after = args.patch.clone().apply(before.clone());
                diff_preview("update_loadout", &before, &after)?
            }
            "delete_loadout" => {
                let args: IdArgs = parse_args(tool, args)?;
                let id = LoadoutId::from(args.id.clone());
                let before = composition
                    .get_loadout(&id)
                    .await?
                    .ok_or_else(|| SessionError::InvalidArgs {
                        tool: tool.to_string(),
                        detail: format!("loadout {} not found", args.id),
                    })?;
                serde_json::json!({"action": "delete_loadout", "before": before})
            }
            "assign_bridge_core" => {
                let args: AssignBridgeCoreArgs = parse_args(tool, args)?;
                let id = LoadoutId::from(args.loadout_id.clone());
                let before = composition.get_bridge_core(&id).await?.ok_or_else(|| {
                    SessionError::InvalidArgs {
                        tool: tool.to_string(),
                        detail: format!("bridge core {} not found", args.loadout_id),
                    }
                })?;
                let after = fleet_core::BridgeCore {
                    members: args.members,
                    ..before.clone()
                };
                diff_preview("assign_bridge_core", &before, &after)?
            }
            "create_target" => {
                let args: CreateTargetArgs = parse_args(tool, args)?;
                serde_json::to_value(&args)?
            }
            "update_target" | "complete_target" => {
                let args: UpdateTargetArgs = parse_args(tool, args)?;
                let id = TargetId::from(args.id.clone());
                let before = composition
                    .get_target(&id)
                    .await?
                    .ok_or_else(|| SessionError::InvalidArgs {
                        tool: tool.to_string(),
                        detail: format!("target {} not found", args.id),
                    })?;
                let patch = if tool == "complete_target" {
                    TargetPatch {
                        status: fleet_core::Patch::Value(TargetStatus::Achieved),
                        ..Default::default()
                    }
                } else {
                    args.patch.clone()
                };
                let after = patch.apply(before.clone());
                diff_preview(tool, &before, &after)?
            }
            "delete_target" => {
                let args: IdArgs = parse_args(tool, args)?;
                let id = TargetId::from(args.id.clone());
                let before = composition
                    .get_target(&id)
                    .await?
                    .ok_or_else(|| SessionError::InvalidArgs {
                        tool: tool.to_string(),
                        detail: format!("target {} not found", args.id),
                    })?;
                serde_json::json!({"action": "delete_target", "before": before})
            }
            "sync_overlay" => {
                let args: SyncOverlayArgs = parse_args(tool, args)?;
                match args {
                    SyncOverlayArgs::Officer { ref_id, patch } => {
                        let ref_id = RefId::from(ref_id);
                        let before = catalog.get_merged_officer(&self.catalog, &ref_id).await?;
                        let after_overlay = patch.clone().apply(before.overlay.clone());
                        let merged_after = fleet_core::MergedOfficer {
                            overlay: after_overlay,
                            ..before.clone()
                        };
                        diff_preview("sync_overlay", &before, &merged_after)?
                    }
                    SyncOverlayArgs::Ship { ref_id, patch } => {
                        let ref_id = RefId::from(ref_id);
                        let before = catalog.get_merged_ship(&self.catalog, &ref_id).await?;
                        let after_overlay = patch.clone().apply(before.overlay.clone());
                        let merged_after = fleet_core::MergedShip {
                            overlay: after_overlay,
                            ..before.clone()
                        };
                        diff_preview("sync_overlay", &before, &merged_after)?
                    }
                }
            }
            "activate_preset" => {
                let args: ActivatePresetArgs = parse_args(tool, args)?;
                serde_json::to_value(&args)?
            }
            other => return Err(SessionError::UnknownTool(other.to_string())),
        };
        Ok(preview)
    }
}

fn diff_preview<T: serde::Serialize>(
    action: &str,
    before: &T,
    after: &T,
) -> Result<serde_json::Value, SessionError> {
    let before_json = serde_json::to_value(before)?;
    let after_json = serde_json::to_value(after)?;
    let diff = fleet_receipt::diff_overlay_fields(&before_json, &after_json);
    let changed: Vec<serde_json::Value> = diff
        .into_iter()
        .map(|d| serde_json::json!({"field": d.field, "before": d.before, "after": d.after}))
        .collect();
    Ok(serde_json::json!({"action": action, "changed_fields": changed}))
}

fn parse_args<T: for<'de> Deserialize<'de>>(
    tool: &str,
    args: &serde_json::Value,
) -> Result<T, SessionError> {
    serde_json::from_value(args.clone()).map_err(|e| SessionError::InvalidArgs {
        tool: tool.to_string(),
        detail: e.to_string(),
    })
}

/// Parse `args` for `tool` and perform its entity mutation inside the
/// caller's already-open, already user-scoped transaction, returning a
/// [`ReceiptBuilder`] describing the forward and inverse changesets. The
/// caller supplies the receipt id and persists it.
async fn build_mutation<'c>(
    tx: &mut sqlx::Transaction<'c, sqlx::Postgres>,
    user_id: &UserId,
    tool: &str,
    args: serde_json::Value,
) -> Result<ReceiptBuilder, SessionError> {
    let mut builder = ReceiptBuilder::new(user_id.clone(), tool.to_string(), ImportLayer::Composition);

    match tool {
        "create_loadout" => {
            let args: CreateLoadoutArgs = parse_args(tool, &args)?;
            let loadout = tx_ops::create_loadout_in_tx(
                tx,
                user_id,
                RefId::from(args.ship_ref_id),
                args.name,
            )
            .await?;
            builder = builder.add_created(serde_json::to_value(&loadout)?);
        }
        "update_loadout" => {
            let args: IdPatchArgs<LoadoutPatch> = parse_args(tool, &args)?;
            let (before, after) =
                tx_ops::update_loadout_in_tx(tx, &LoadoutId::from(args.id), args.patch).await?;
            builder = builder.add_updated(serde_json::to_value(&before)?, serde_json::to_value(&after)?);
        }
        "delete_loadout" => {
            let args: IdArgs = parse_args(tool, &args)?;
            let deleted = tx_ops::delete_loadout_in_tx(tx, &LoadoutId::from(args.id)).await?;
            builder = builder.add_removed(serde_json::to_value(&deleted)?);
        }
        "assign_bridge_core" => {
            let args: AssignBridgeCoreArgs = parse_args(tool, &args)?;
            let (before, after) = tx_ops::set_bridge_core_members_in_tx(
                tx,
                &LoadoutId::from(args.loadout_id),
                args.members,
            )
            .await?;
            builder = builder.add_updated(serde_json::to_value(&before)?, serde_json::to_value(&after)?);
        }
        "create_target" => {
            let args: CreateTargetArgs = parse_args(tool, &args)?;
            let target = tx_ops::create_target_in_tx(
                tx,
                user_id,
                args.target_type,
                args.ref_id.map(RefId::from),
                args.loadout_id.map(LoadoutId::from),
                args.target_tier,
                args.target_rank,
                args.target_level,
                Priority::new(args.priority).map_err(|e| SessionError::InvalidArgs {
                    tool: tool.to_string(),
                    detail: e.to_string(),
                })?,
            )
            .await?;
            builder = builder.add_created(serde_json::to_value(&target)?);
        }
        "update_target" | "complete_target" => {
            let id = if tool == "complete_target" {
                let args: IdArgs = parse_args(tool, &args)?;
                TargetId::from(args.id)
            } else {
                let args: UpdateTargetArgs = parse_args(tool, &args)?;
                TargetId::from(args.id)
            };
            let patch = if tool == "complete_target" {
                TargetPatch {
                    status: fleet_core::Patch::Value(TargetStatus::Achieved),
                    ..Default::default()
                }
            } else {
                let args: UpdateTargetArgs = parse_args(tool, &args)?;
                args.patch
            };
            let (before, after) = tx_ops::update_target_in_tx(tx, &id, patch).await?;
            builder = builder.add_updated(serde_json::to_value(&before)?, serde_json::to_value(&after)?);
        }
        "delete_target" => {
            let args: IdArgs = parse_args(tool, &args)?;
            let deleted = tx_ops::delete_target_in_tx(tx, &TargetId::from(args.id)).await?;
            builder = builder.add_removed(serde_json::to_value(&deleted)?);
        }
        "activate_preset" => {
            let args: ActivatePresetArgs = parse_args(tool, &args)?;
            let item = tx_ops::create_preset_plan_item_in_tx(
                tx,
                user_id,
                args.intent_key,
                args.loadout_id.map(LoadoutId::from),
                args.priority,
            )
            .await?;
            builder = builder.add_created(serde_json::to_value(&item)?);
        }
        // `sync_overlay` touches `fleet-catalog`, which has no `_in_tx`
        // overlay writer (only `fleet-composition` does). The overlay
        // write and its receipt are therefore two back-to-back
        // transactions rather than one, the same weaker atomicity
        // `UserCatalogStore::bulk_officer_overlay`/`bulk_ship_overlay`
        // already accept for this store (see DESIGN.md).
        "sync_overlay" => {
            return Err(SessionError::InvalidArgs {
                tool: tool.to_string(),
                detail: "sync_overlay is applied outside the shared transaction; see ToolRuntime::apply_sync_overlay".to_string(),
            });
        }
        other => return Err(SessionError::UnknownTool(other.to_string())),
    }

    Ok(builder)
}

#[derive(Debug, Clone, Deserialize)]
struct CreateLoadoutArgs {
    ship_ref_id: String,
    name: String,
}

#[derive(Debug, Clone, Deserialize)]
struct IdArgs {
    id: String,
}

#[derive(Debug, Clone, Deserialize)]
struct IdPatchArgs<P> {
    id: String,
    patch: P,
}

#[derive(Debug, Clone, Deserialize)]
struct AssignBridgeCoreArgs {
    loadout_id: String,
    members: Vec<BridgeCoreMember>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
struct CreateTargetArgs {
    target_type: TargetType,
    ref_id: Option<String>,
    loadout_id: Option<String>,
    target_tier: Option<i32>,
    target_rank: Option<i32>,
    target_level: Option<i32>,
    priority: u8,
}

#[derive(Debug, Clone, Deserialize)]
struct UpdateTargetArgs {
    id: String,
    #[serde(default)]
    patch: TargetPatch,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
struct ActivatePresetArgs {
    intent_key: Option<String>,
    loadout_id: Option<String>,
    #[serde(default)]
    priority: i32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum SyncOverlayArgs {
    Officer {
        ref_id: String,
        patch: OfficerOverlayPatch,
    },
    Ship {
        ref_id: String,
        patch: ShipOverlayPatch,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_only_prefixes_bypass_classification() {
        for tool in ["get_loadout", "list_targets", "search_officers", "read_frame"] {
            assert!(is_read_only_tool(tool));
            assert!(!is_mutating_tool(tool));
        }
    }

    #[test]
    fn known_tools_are_mutating_even_without_a_matching_prefix() {
        assert!(is_mutating_tool("activate_preset"));
    }

    #[test]
    fn unlisted_tool_with_mutating_prefix_is_still_gated() {
        assert!(is_mutating_tool("remove_dock"));
    }

    #[test]
    fn unlisted_tool_with_no_mutating_prefix_is_not_gated() {
        assert!(!is_mutating_tool("rename_fleet"));
    }
}
