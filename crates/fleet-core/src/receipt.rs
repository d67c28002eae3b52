//! Import receipt entity (§3, §4.3, §4.4).

use crate::ids::{ReceiptId, UserId};
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Which layer of the data model a receipt's changes belong to, so callers
/// can list/undo by scope (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ImportLayer {
    /// Global reference catalog rows (officers/ships).
    Reference,
    /// Per-user ownership overlay fields.
    Ownership,
    /// Composition entities (loadouts, bridge cores, docks, plan items...).
    Composition,
}

/// The set of entity-shaped records a changeset touched, keyed by the
/// direction of the edit. Forward and inverse changesets share this shape;
/// only the values differ.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct Changeset {
    /// Rows that did not exist before and were created.
    pub added: Vec<serde_json::Value>,
    /// Rows that existed and had fields overwritten; each entry carries
    /// enough identity (at minimum its id) to be addressed again.
    pub updated: Vec<serde_json::Value>,
    /// Rows that were removed entirely.
    pub removed: Vec<serde_json::Value>,
}

impl Changeset {
    /// True if this changeset recorded no effect at all.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}

/// A row the translator could not confidently resolve to a reference id; a
/// human must pick from `candidates` via `resolveReceiptItems` (§4.3).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct UnresolvedItem {
    /// Index of the offending row in the mapped import.
    pub row_index: usize,
    /// The raw name that failed to resolve.
    pub raw_name: String,
    /// Candidate reference ids, ranked best-first.
    pub candidates: Vec<String>,
}

/// The persistent, reversible record of what an applied proposal actually
/// changed (§3, GLOSSARY). `inverse`, applied, must restore the prior state
/// exactly (round-trip law, §8).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ImportReceipt {
    /// Opaque id.
    pub id: ReceiptId,
    /// Owning user.
    pub user_id: UserId,
    /// What produced this receipt, e.g. `"csv"`, `"translator:pixelstarships"`.
    pub source_type: String,
    /// Opaque source metadata (file name, translator name/version, etc.).
    pub source_meta: serde_json::Value,
    /// The translator mapping used, if any.
    pub mapping: Option<String>,
    /// Which layer this receipt's changes belong to.
    pub layer: ImportLayer,
    /// Forward changes actually applied.
    pub changeset: Changeset,
    /// Inverse changes that, applied, restore the pre-receipt state.
    pub inverse: Changeset,
    /// Rows a human still needs to resolve, if any remain.
    pub unresolved: Option<Vec<UnresolvedItem>>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl ImportReceipt {
    /// True if every row mapped cleanly and nothing needs a follow-up pick.
    pub fn is_fully_resolved(&self) -> bool {
        self.unresolved.as_ref().is_none_or(Vec::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn receipt(changeset: Changeset, inverse: Changeset) -> ImportReceipt {
        ImportReceipt {
            id: ReceiptId::from("r1"),
            user_id: UserId::from("u1"),
            source_type: "csv".into(),
            source_meta: serde_json::json!({"fileName": "export.csv"}),
            mapping: None,
            layer: ImportLayer::Ownership,
            changeset,
            inverse,
            unresolved: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn empty_changeset_is_empty() {
        assert!(Changeset::default().is_empty());
    }

    #[test]
    fn nonempty_changeset_is_not_empty() {
        let mut c = Changeset::default();
        c.added.push(serde_json::json!({"refId": "cdn:officer:kirk"}));
        assert!(!c.is_empty());
    }

    #[test]
    fn fully_resolved_when_unresolved_is_none() {
        let r = receipt(Changeset::default(), Changeset::default());
        assert!(r.is_fully_resolved());
    }

    #[test]
    fn fully_resolved_when_unresolved_is_empty_vec() {
        let mut r = receipt(Changeset::default(), Changeset::default());
        r.unresolved = Some(vec![]);
        assert!(r.is_fully_resolved());
    }

    #[test]
    fn not_fully_resolved_with_pending_items() {
        let mut r = receipt(Changeset::default(), Changeset::default());
        r.unresolved = Some(vec![UnresolvedItem {
            row_index: 2,
            raw_name: "kirk".into(),
            candidates: vec!["cdn:officer:kirk".into()],
        }]);
        assert!(!r.is_fully_resolved());
    }
}
