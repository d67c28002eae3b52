//! Opaque string-backed identifier newtypes.
//!
//! Per §3 of the specification, identifiers are opaque strings unless noted.
//! Each entity gets its own newtype so a `UserId` can never be passed where a
//! `LoadoutId` is expected, even though both are `String` underneath.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! opaque_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(
            Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
        )]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Borrow the underlying string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

opaque_id!(UserId, "Opaque identifier for a [`crate::User`].");
opaque_id!(SessionId, "Opaque identifier for a [`crate::UserSession`] auth token or chat session key.");
opaque_id!(TokenId, "Opaque identifier for a verify/reset token.");
opaque_id!(RefId, "Stable, source-prefixed reference catalog identifier (e.g. `cdn:officer:kirk`).");
opaque_id!(LoadoutId, "Opaque identifier for a [`crate::Loadout`] or [`crate::LoadoutVariant`].");
opaque_id!(TargetId, "Opaque identifier for a [`crate::Target`].");
opaque_id!(ProposalId, "Opaque identifier for a [`crate::MutationProposal`].");
opaque_id!(ReceiptId, "Opaque identifier for an [`crate::ImportReceipt`].");
opaque_id!(RuleId, "Opaque identifier for a [`crate::BehaviorRule`].");
opaque_id!(FrameId, "Opaque identifier for a persisted [`crate::Frame`].");

/// A dock slot number, constrained to `1..=8` (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct DockNumber(u8);

/// Error returned when a dock number falls outside `1..=8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("dock number must be in 1..=8, got {0}")]
pub struct DockNumberOutOfRange(pub u8);

impl DockNumber {
    /// Construct a dock number, validating the `1..=8` bound.
    pub fn new(n: u8) -> Result<Self, DockNumberOutOfRange> {
        if (1..=8).contains(&n) {
            Ok(Self(n))
        } else {
            Err(DockNumberOutOfRange(n))
        }
    }

    /// The raw number.
    pub fn get(&self) -> u8 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opaque_id_display_roundtrip() {
        let id = UserId::from("u-1");
        assert_eq!(id.to_string(), "u-1");
        assert_eq!(id.as_str(), "u-1");
    }

    #[test]
    fn dock_number_accepts_bounds() {
        assert!(DockNumber::new(1).is_ok());
        assert!(DockNumber::new(8).is_ok());
    }

    #[test]
    fn dock_number_rejects_out_of_range() {
        assert!(DockNumber::new(0).is_err());
        assert!(DockNumber::new(9).is_err());
    }

    #[test]
    fn ids_are_distinct_types_but_equal_by_string() {
        let a = UserId::from("x");
        let b = UserId::from("x");
        assert_eq!(a, b);
    }

    #[test]
    fn serde_roundtrip_is_transparent_string() {
        let id = RefId::from("cdn:officer:kirk");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"cdn:officer:kirk\"");
    }
}
