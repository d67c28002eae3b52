//! Global reference catalog and its per-user overlay (§3, §4.2).

use crate::ids::RefId;
use crate::patch::Patch;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Where a reference row came from and when it was last refreshed.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Provenance {
    /// Vendor source identifier, e.g. `"stfc-community-db"`.
    pub source: String,
    /// Source URL the row was ingested from, if any.
    pub url: Option<String>,
    /// Source-side revision identifier.
    pub revision_id: String,
    /// Source-side revision timestamp.
    pub revision_timestamp: DateTime<Utc>,
}

/// Global, read-only reference row for an officer (§3).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ReferenceOfficer {
    /// Stable, source-prefixed id, e.g. `"cdn:officer:kirk"`.
    pub ref_id: RefId,
    /// Display name.
    pub name: String,
    /// Rarity tier (vendor vocabulary, e.g. `"epic"`).
    pub rarity: String,
    /// Faction affiliation.
    pub faction: String,
    /// Opaque ability payload; treated as opaque bytes (§9) and never
    /// parsed by this crate.
    pub abilities: serde_json::Value,
    /// Ingestion provenance.
    pub provenance: Provenance,
}

/// Global, read-only reference row for a ship (§3).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ReferenceShip {
    /// Stable, source-prefixed id, e.g. `"cdn:ship:enterprise"`.
    pub ref_id: RefId,
    /// Display name.
    pub name: String,
    /// Hull class (vendor vocabulary).
    pub class: String,
    /// Tier.
    pub tier: String,
    /// Faction affiliation.
    pub faction: String,
    /// Opaque ability/trait payload; treated as opaque bytes.
    pub abilities: serde_json::Value,
    /// Ingestion provenance.
    pub provenance: Provenance,
}

/// Whether the calling user has annotated a reference row as owned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum OwnershipState {
    /// No overlay row exists yet, or the user has not indicated ownership.
    #[default]
    Unknown,
    /// The user has marked this as owned.
    Owned,
    /// The user has explicitly marked this as not owned.
    Unowned,
}

/// Per-user annotation layered over a [`ReferenceOfficer`] (§3, §4.2).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct OfficerOverlay {
    /// The reference row this overlay annotates. Must exist (FK under RLS).
    pub ref_id: RefId,
    /// Ownership annotation.
    pub ownership_state: OwnershipState,
    /// Whether this officer is flagged as a current target.
    pub target: bool,
    /// User-entered level, if tracked.
    pub user_level: Option<i32>,
    /// User-entered rank, if tracked.
    pub user_rank: Option<i32>,
    /// Free-text note about why this is (or isn't) a target.
    pub target_note: Option<String>,
    /// Target priority, 1 (highest) to 3 (lowest).
    pub target_priority: Option<crate::composition::Priority>,
}

impl OfficerOverlay {
    /// The overlay that applies when no row has ever been created: unknown
    /// ownership, not a target, no user fields set (§4.2 merged-read default).
    pub fn default_for(ref_id: RefId) -> Self {
        Self {
            ref_id,
            ownership_state: OwnershipState::Unknown,
            target: false,
            user_level: None,
            user_rank: None,
            target_note: None,
            target_priority: None,
        }
    }
}

/// Per-user annotation layered over a [`ReferenceShip`] (§3, §4.2).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ShipOverlay {
    /// The reference row this overlay annotates. Must exist (FK under RLS).
    pub ref_id: RefId,
    /// Ownership annotation.
    pub ownership_state: OwnershipState,
    /// Whether this ship is flagged as a current target.
    pub target: bool,
    /// User-entered tier, if tracked.
    pub user_tier: Option<i32>,
    /// User-entered power rating, if tracked.
    pub user_power: Option<i64>,
    /// Free-text note about why this is (or isn't) a target.
    pub target_note: Option<String>,
    /// Target priority, 1 (highest) to 3 (lowest).
    pub target_priority: Option<crate::composition::Priority>,
}

impl ShipOverlay {
    /// The overlay that applies when no row has ever been created.
    pub fn default_for(ref_id: RefId) -> Self {
        Self {
            ref_id,
            ownership_state: OwnershipState::Unknown,
            target: false,
            user_tier: None,
            user_power: None,
            target_note: None,
            target_priority: None,
        }
    }
}

/// Independently nullable patch for [`OfficerOverlay`]'s user-settable
/// fields (§4.2: "patch fields are independently nullable").
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct OfficerOverlayPatch {
    /// See [`OfficerOverlay::ownership_state`].
    #[serde(default)]
    pub ownership_state: Patch<OwnershipState>,
    /// See [`OfficerOverlay::target`].
    #[serde(default)]
    pub target: Patch<bool>,
    /// See [`OfficerOverlay::user_level`].
    #[serde(default)]
    pub user_level: Patch<i32>,
    /// See [`OfficerOverlay::user_rank`].
    #[serde(default)]
    pub user_rank: Patch<i32>,
    /// See [`OfficerOverlay::target_note`].
    #[serde(default)]
    pub target_note: Patch<String>,
    /// See [`OfficerOverlay::target_priority`].
    #[serde(default)]
    pub target_priority: Patch<crate::composition::Priority>,
}

impl OfficerOverlayPatch {
    /// Apply this patch to an existing overlay, producing the new state.
    pub fn apply(self, mut base: OfficerOverlay) -> OfficerOverlay {
        if let Patch::Value(v) = self.ownership_state {
            base.ownership_state = v;
        }
        if let Patch::Value(v) = self.target {
            base.target = v;
        }
        base.user_level = self.user_level.apply_to(base.user_level);
        base.user_rank = self.user_rank.apply_to(base.user_rank);
        base.target_note = self.target_note.apply_to(base.target_note);
        base.target_priority = self.target_priority.apply_to(base.target_priority);
        base
    }
}

/// Independently nullable patch for [`ShipOverlay`]'s user-settable fields.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct ShipOverlayPatch {
    /// See [`ShipOverlay::ownership_state`].
    #[serde(default)]
    pub ownership_state: Patch<OwnershipState>,
    /// See [`ShipOverlay::target`].
    #[serde(default)]
    pub target: Patch<bool>,
    /// See [`ShipOverlay::user_tier`].
    #[serde(default)]
    pub user_tier: Patch<i32>,
    /// See [`ShipOverlay::user_power`].
    #[serde(default)]
    pub user_power: Patch<i64>,
    /// See [`ShipOverlay::target_note`].
    #[serde(default)]
    pub target_note: Patch<String>,
    /// See [`ShipOverlay::target_priority`].
    #[serde(default)]
    pub target_priority: Patch<crate::composition::Priority>,
}

impl ShipOverlayPatch {
    /// Apply this patch to an existing overlay, producing the new state.
    pub fn apply(self, mut base: ShipOverlay) -> ShipOverlay {
        if let Patch::Value(v) = self.ownership_state {
            base.ownership_state = v;
        }
        if let Patch::Value(v) = self.target {
            base.target = v;
        }
        base.user_tier = self.user_tier.apply_to(base.user_tier);
        base.user_power = self.user_power.apply_to(base.user_power);
        base.target_note = self.target_note.apply_to(base.target_note);
        base.target_priority = self.target_priority.apply_to(base.target_priority);
        base
    }
}

/// Merged-read row: reference fields + overlay fields flattened into one
/// record (§4.2). Produced by `fleet-catalog`'s read endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MergedOfficer {
    /// Reference catalog fields.
    #[serde(flatten)]
    pub reference: ReferenceOfficer,
    /// Overlay annotation, defaulted when no row exists yet.
    #[serde(flatten)]
    pub overlay: OfficerOverlay,
}

/// Merged-read row for ships, analogous to [`MergedOfficer`].
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MergedShip {
    /// Reference catalog fields.
    #[serde(flatten)]
    pub reference: ReferenceShip,
    /// Overlay annotation, defaulted when no row exists yet.
    #[serde(flatten)]
    pub overlay: ShipOverlay,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composition::Priority;

    fn provenance() -> Provenance {
        Provenance {
            source: "test".into(),
            url: None,
            revision_id: "r1".into(),
            revision_timestamp: Utc::now(),
        }
    }

    #[test]
    fn default_overlay_is_unknown_not_target() {
        let overlay = OfficerOverlay::default_for(RefId::from("cdn:officer:kirk"));
        assert_eq!(overlay.ownership_state, OwnershipState::Unknown);
        assert!(!overlay.target);
        assert!(overlay.user_level.is_none());
    }

    #[test]
    fn patch_absent_fields_leave_overlay_unchanged() {
        let base = OfficerOverlay {
            ref_id: RefId::from("r"),
            ownership_state: OwnershipState::Owned,
            target: true,
            user_level: Some(5),
            user_rank: None,
            target_note: Some("keep".into()),
            target_priority: Some(Priority::new(1).unwrap()),
        };
        let patch = OfficerOverlayPatch::default();
        let after = patch.apply(base.clone());
        assert_eq!(after.user_level, base.user_level);
        assert_eq!(after.target_note, base.target_note);
    }

    #[test]
    fn patch_null_clears_field() {
        let base = OfficerOverlay {
            ref_id: RefId::from("r"),
            ownership_state: OwnershipState::Owned,
            target: true,
            user_level: Some(5),
            user_rank: None,
            target_note: Some("keep".into()),
            target_priority: None,
        };
        let mut patch = OfficerOverlayPatch::default();
        patch.target_note = Patch::Null;
        let after = patch.apply(base);
        assert!(after.target_note.is_none());
    }

    #[test]
    fn patch_value_sets_field() {
        let base = OfficerOverlay::default_for(RefId::from("r"));
        let mut patch = OfficerOverlayPatch::default();
        patch.ownership_state = Patch::Value(OwnershipState::Owned);
        patch.user_level = Patch::Value(42);
        let after = patch.apply(base);
        assert_eq!(after.ownership_state, OwnershipState::Owned);
        assert_eq!(after.user_level, Some(42));
    }

    #[test]
    fn merged_officer_flattens_both_sides() {
        let reference = ReferenceOfficer {
            ref_id: RefId::from("cdn:officer:kirk"),
            name: "Kirk".into(),
            rarity: "epic".into(),
            faction: "federation".into(),
            abilities: serde_json::json!({}),
            provenance: provenance(),
        };
        let overlay = OfficerOverlay::default_for(RefId::from("cdn:officer:kirk"));
        let merged = MergedOfficer { reference, overlay };
        let json = serde_json::to_value(&merged).unwrap();
        assert_eq!(json["name"], "Kirk");
        assert_eq!(json["ownership_state"], "unknown");
    }
}
