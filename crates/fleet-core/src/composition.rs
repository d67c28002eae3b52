//! Composition layer: loadouts, bridge cores, below-deck policies, docks,
//! plan items, and targets (§3).

use crate::ids::{DockNumber, LoadoutId, RefId, TargetId, UserId};
use crate::patch::Patch;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A bounded 1 (highest) to 3 (lowest) priority used by overlay target
/// flags and plan items alike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, JsonSchema)]
#[serde(transparent)]
pub struct Priority(u8);

/// Error returned when a priority value falls outside `1..=3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("priority must be in 1..=3, got {0}")]
pub struct PriorityOutOfRange(pub u8);

impl Priority {
    /// Construct a priority, validating the `1..=3` bound.
    pub fn new(n: u8) -> Result<Self, PriorityOutOfRange> {
        if (1..=3).contains(&n) {
            Ok(Self(n))
        } else {
            Err(PriorityOutOfRange(n))
        }
    }

    /// The raw priority value.
    pub fn get(&self) -> u8 {
        self.0
    }
}

impl<'de> Deserialize<'de> for Priority {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let n = u8::deserialize(deserializer)?;
        Priority::new(n).map_err(serde::de::Error::custom)
    }
}

/// Which bridge slot a [`BridgeCoreMember`] fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    /// The captain's seat.
    Captain,
    /// First bridge officer seat.
    Bridge1,
    /// Second bridge officer seat.
    Bridge2,
}

/// One officer assignment within a [`BridgeCore`].
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BridgeCoreMember {
    /// The assigned officer. Must resolve to a reference officer or a
    /// prior-seeded id (§3 cross-entity invariant).
    pub officer_ref_id: RefId,
    /// Which seat this officer fills.
    pub slot: Slot,
}

/// A named, reusable bridge officer grouping (§3).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BridgeCore {
    /// Opaque id.
    pub id: LoadoutId,
    /// Owning user.
    pub user_id: UserId,
    /// Display name.
    pub name: String,
    /// Seat assignments.
    pub members: Vec<BridgeCoreMember>,
}

/// Selection strategy for a [`BelowDeckPolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum BelowDeckMode {
    /// Fill by stat priority, falling back to battle-damage-assessment weighting.
    StatsThenBda,
    /// Only ever use the explicitly pinned officer list.
    PinnedOnly,
    /// Only fill slots by stat priority; never use pins.
    StatFillOnly,
}

/// Selection parameters for a [`BelowDeckPolicy`].
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BelowDeckSpec {
    /// Officers pinned to specific below-deck slots regardless of stats.
    pub pinned: Vec<RefId>,
    /// Stat/ability modifiers to prefer when filling non-pinned slots.
    pub prefer_modifiers: Vec<String>,
    /// Whether officers reserved elsewhere (e.g. on another ship's bridge)
    /// are excluded from automatic fill.
    pub avoid_reserved: bool,
    /// Maximum number of below-deck slots to fill.
    pub max_slots: u32,
}

/// A named, reusable below-deck selection policy (§3).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BelowDeckPolicy {
    /// Opaque id.
    pub id: LoadoutId,
    /// Owning user.
    pub user_id: UserId,
    /// Display name.
    pub name: String,
    /// Selection mode.
    pub mode: BelowDeckMode,
    /// Selection parameters.
    pub spec: BelowDeckSpec,
}

/// A ship loadout: bridge + below-deck policy + scheduling metadata (§3).
/// Created and edited exclusively through the proposal protocol (§4.4).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Loadout {
    /// Opaque id.
    pub id: LoadoutId,
    /// Owning user.
    pub user_id: UserId,
    /// The ship this loadout equips.
    pub ship_ref_id: RefId,
    /// Display name.
    pub name: String,
    /// Relative ordering among the user's loadouts for the same ship.
    pub priority: i32,
    /// Whether this loadout is the one currently assigned to the ship.
    pub is_active: bool,
    /// Intent tags this loadout is optimised for (e.g. `"pvp"`, `"mining"`).
    pub intent_keys: Vec<String>,
    /// Free-form organisational tags.
    pub tags: Vec<String>,
    /// Bridge core in use, if any.
    pub bridge_core_id: Option<LoadoutId>,
    /// Below-deck policy in use, if any.
    pub below_deck_policy_id: Option<LoadoutId>,
    /// Free-text notes.
    pub notes: Option<String>,
}

/// Independently nullable patch for [`Loadout`]'s mutable fields, applied
/// exclusively through the proposal protocol (§4.4). Mirrors the tri-state
/// shape `fleet-catalog`'s overlay patches use: a field absent from the
/// incoming JSON leaves the stored value untouched.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct LoadoutPatch {
    /// See [`Loadout::name`].
    #[serde(default)]
    pub name: Patch<String>,
    /// See [`Loadout::priority`].
    #[serde(default)]
    pub priority: Patch<i32>,
    /// See [`Loadout::is_active`].
    #[serde(default)]
    pub is_active: Patch<bool>,
    /// See [`Loadout::intent_keys`].
    #[serde(default)]
    pub intent_keys: Patch<Vec<String>>,
    /// See [`Loadout::tags`].
    #[serde(default)]
    pub tags: Patch<Vec<String>>,
    /// See [`Loadout::bridge_core_id`].
    #[serde(default)]
    pub bridge_core_id: Patch<LoadoutId>,
    /// See [`Loadout::below_deck_policy_id`].
    #[serde(default)]
    pub below_deck_policy_id: Patch<LoadoutId>,
    /// See [`Loadout::notes`].
    #[serde(default)]
    pub notes: Patch<String>,
}

impl LoadoutPatch {
    /// Apply this patch to an existing loadout, producing the new state.
    pub fn apply(self, mut base: Loadout) -> Loadout {
        if let Patch::Value(v) = self.name {
            base.name = v;
        }
        if let Patch::Value(v) = self.priority {
            base.priority = v;
        }
        if let Patch::Value(v) = self.is_active {
            base.is_active = v;
        }
        if let Patch::Value(v) = self.intent_keys {
            base.intent_keys = v;
        }
        if let Patch::Value(v) = self.tags {
            base.tags = v;
        }
        base.bridge_core_id = self.bridge_core_id.apply_to(base.bridge_core_id);
        base.below_deck_policy_id = self.below_deck_policy_id.apply_to(base.below_deck_policy_id);
        base.notes = self.notes.apply_to(base.notes);
        base
    }
}

/// A patch overlay on a [`Loadout`] that never promotes to a standalone
/// loadout (§3: "same"). `patch` fields are independently optional; absence
/// means "inherit from the base loadout".
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LoadoutVariant {
    /// Opaque id.
    pub id: LoadoutId,
    /// Owning user.
    pub user_id: UserId,
    /// The loadout this variant overlays. Must be owned by the same user
    /// (§3 cross-entity invariant).
    pub base_loadout_id: LoadoutId,
    /// Bridge override, if any.
    pub bridge: Option<Vec<BridgeCoreMember>>,
    /// Below-deck mode override, if any.
    pub below_deck_mode: Option<BelowDeckMode>,
    /// Below-deck spec override, if any.
    pub below_deck_spec: Option<BelowDeckSpec>,
    /// Intent key override, if any.
    pub intent_keys: Option<Vec<String>>,
}

/// A sparse dock assignment; `dock_number` (1..=8) is the primary key (§3).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Dock {
    /// Owning user.
    pub user_id: UserId,
    /// Dock slot number, 1 through 8.
    pub dock_number: DockNumber,
    /// Operator-facing label.
    pub label: Option<String>,
    /// Free-text notes.
    pub notes: Option<String>,
}

/// How a [`PlanItem`] was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PlanItemSource {
    /// Created directly by a user action.
    Manual,
    /// Created by applying a saved preset.
    Preset,
}

/// A scheduling entry layered over loadouts: "this crew/loadout in this dock
/// with this priority" (§3).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PlanItem {
    /// Opaque id.
    pub id: LoadoutId,
    /// Owning user.
    pub user_id: UserId,
    /// Intent this item serves, if tagged.
    pub intent_key: Option<String>,
    /// The loadout this item schedules, if any.
    pub loadout_id: Option<LoadoutId>,
    /// The variant this item schedules, if any (mutually exclusive in
    /// practice with `loadout_id`, but not enforced structurally here).
    pub variant_id: Option<LoadoutId>,
    /// The dock this item is assigned to, if any.
    pub dock_number: Option<DockNumber>,
    /// Officers assigned away from any ship (e.g. base defense), if any.
    pub away_officers: Option<Vec<RefId>>,
    /// Relative ordering.
    pub priority: i32,
    /// Whether this item is currently active.
    pub is_active: bool,
    /// Provenance of this item.
    pub source: PlanItemSource,
}

/// What kind of entity a [`Target`] tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    /// Tracking an officer's level/rank goal.
    Officer,
    /// Tracking a ship's tier/level goal.
    Ship,
    /// Tracking a crew composition goal.
    Crew,
    /// Tracking a general operations goal not tied to one ref.
    Ops,
}

/// Lifecycle state of a [`Target`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TargetStatus {
    /// Currently being worked toward.
    Active,
    /// The goal has been reached.
    Achieved,
    /// The user gave up on this goal.
    Abandoned,
}

/// Tracks what the user is working toward (§3).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Target {
    /// Opaque id.
    pub id: TargetId,
    /// Owning user.
    pub user_id: UserId,
    /// What kind of goal this is.
    pub target_type: TargetType,
    /// The reference entity this target tracks, if type is officer/ship.
    pub ref_id: Option<RefId>,
    /// The loadout this target tracks, if type is crew.
    pub loadout_id: Option<LoadoutId>,
    /// Tier goal, if applicable.
    pub target_tier: Option<i32>,
    /// Rank goal, if applicable.
    pub target_rank: Option<i32>,
    /// Level goal, if applicable.
    pub target_level: Option<i32>,
    /// Priority, 1 (highest) to 3 (lowest).
    pub priority: Priority,
    /// Lifecycle status.
    pub status: TargetStatus,
}

/// Independently nullable patch for [`Target`]'s mutable fields.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct TargetPatch {
    /// See [`Target::target_tier`].
    #[serde(default)]
    pub target_tier: Patch<i32>,
    /// See [`Target::target_rank`].
    #[serde(default)]
    pub target_rank: Patch<i32>,
    /// See [`Target::target_level`].
    #[serde(default)]
    pub target_level: Patch<i32>,
    /// See [`Target::priority`].
    #[serde(default)]
    pub priority: Patch<Priority>,
    /// See [`Target::status`].
    #[serde(default)]
    pub status: Patch<TargetStatus>,
}

impl TargetPatch {
    /// Apply this patch to an existing target, producing the new state.
    pub fn apply(self, mut base: Target) -> Target {
        base.target_tier = self.target_tier.apply_to(base.target_tier);
        base.target_rank = self.target_rank.apply_to(base.target_rank);
        base.target_level = self.target_level.apply_to(base.target_level);
        if let Patch::Value(v) = self.priority {
            base.priority = v;
        }
        if let Patch::Value(v) = self.status {
            base.status = v;
        }
        base
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_accepts_bounds() {
        assert!(Priority::new(1).is_ok());
        assert!(Priority::new(3).is_ok());
    }

    #[test]
    fn priority_rejects_out_of_range() {
        assert!(Priority::new(0).is_err());
        assert!(Priority::new(4).is_err());
    }

    #[test]
    fn priority_deserialize_rejects_out_of_range() {
        let err = serde_json::from_str::<Priority>("5").unwrap_err();
        assert!(err.to_string().contains("1..=3"));
    }

    #[test]
    fn priority_deserialize_accepts_in_range() {
        let p: Priority = serde_json::from_str("2").unwrap();
        assert_eq!(p.get(), 2);
    }

    #[test]
    fn bridge_core_member_roundtrips() {
        let m = BridgeCoreMember {
            officer_ref_id: RefId::from("cdn:officer:kirk"),
            slot: Slot::Captain,
        };
        let json = serde_json::to_string(&m).unwrap();
        let back: BridgeCoreMember = serde_json::from_str(&json).unwrap();
        assert_eq!(back.slot, Slot::Captain);
    }
}
