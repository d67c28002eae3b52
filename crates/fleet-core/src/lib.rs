// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! Domain entity types for the fleet intelligence backend.
//!
//! This crate holds the stable, serialisable shape of every entity named in
//! the data model: users and sessions, the global reference catalog and its
//! per-user overlay, the composition layer (loadouts, bridge cores, docks,
//! plan items, targets), mutation proposals, import receipts, and behavior
//! rules. It has no storage or transport logic — stores live in
//! `fleet-db`/`fleet-catalog`/`fleet-proposal`/`fleet-receipt-store`, wire
//! envelopes live in `fleet-protocol`. If you only need to know the *shape*
//! of something, this is the crate to depend on.

/// Reference catalog (global) and per-user overlay types.
pub mod catalog;
/// Loadouts, bridge cores, below-deck policies, docks, plan items, targets.
pub mod composition;
/// Opaque string-backed identifier newtypes.
pub mod ids;
/// The tri-state `Patch<T>` presence wrapper used by every overlay patch.
pub mod patch;
/// Mutation proposal entity and its state machine.
pub mod proposal;
/// Import receipt entity.
pub mod receipt;
/// Behavior rule entity (Beta-Binomial confidence tracking).
pub mod rule;
/// Chat session / frame entities for the conversational orchestrator.
pub mod session;
/// User, role, and authentication artifact entities.
pub mod user;

pub use catalog::{
    MergedOfficer, MergedShip, OfficerOverlay, OfficerOverlayPatch, OwnershipState, Provenance,
    ReferenceOfficer, ReferenceShip, ShipOverlay, ShipOverlayPatch,
};
pub use composition::{
    BelowDeckMode, BelowDeckPolicy, BelowDeckSpec, BridgeCore, BridgeCoreMember, Dock, Loadout,
    LoadoutPatch, LoadoutVariant, PlanItem, PlanItemSource, Priority, Slot, Target, TargetPatch,
    TargetStatus, TargetType,
};
pub use composition::PriorityOutOfRange;
pub use ids::{
    DockNumber, DockNumberOutOfRange, FrameId, LoadoutId, ProposalId, ReceiptId, RefId, RuleId,
    SessionId, TargetId, TokenId, UserId,
};
pub use patch::Patch;
pub use proposal::{MutationProposal, ProposalStatus};
pub use receipt::{Changeset, ImportLayer, ImportReceipt, UnresolvedItem};
pub use rule::{BehaviorRule, RuleScope, RuleSeverity};
pub use session::{ChatSession, Frame, ResetToken, Turn, VerifyToken, VerifyTokenType};
pub use user::{Role, User, UserSession};

/// Current schema/contract revision embedded in receipts and diagnostic context.
///
/// # Examples
///
/// ```
/// assert_eq!(fleet_core::CONTRACT_VERSION, "fleet/v1");
/// ```
pub const CONTRACT_VERSION: &str = "fleet/v1";
