//! Fluent construction of [`ImportReceipt`] values, forward and inverse in
//! lockstep so the two changesets can never drift apart (§4.3, §4.4, §8).

use chrono::Utc;
use fleet_core::{Changeset, ImportLayer, ImportReceipt, ReceiptId, UnresolvedItem, UserId};

/// Accumulates a forward changeset and its inverse together, then produces
/// an [`ImportReceipt`]. Every `add_*` call takes both the forward row and
/// the row needed to undo it, so the round-trip law (§8: apply then undo
/// restores the prior state exactly) holds by construction rather than by
/// a separate reconciliation step.
#[derive(Debug, Clone)]
pub struct ReceiptBuilder {
    user_id: UserId,
    source_type: String,
    source_meta: serde_json::Value,
    mapping: Option<String>,
    layer: ImportLayer,
    forward: Changeset,
    inverse: Changeset,
    unresolved: Vec<UnresolvedItem>,
}

impl ReceiptBuilder {
    /// Start a new builder for a receipt owned by `user_id`, produced by
    /// `source_type` (e.g. `"csv"`, `"translator:pixelstarships"`).
    pub fn new(user_id: UserId, source_type: impl Into<String>, layer: ImportLayer) -> Self {
        Self {
            user_id,
            source_type: source_type.into(),
            source_meta: serde_json::Value::Null,
            mapping: None,
            layer,
            forward: Changeset::default(),
            inverse: Changeset::default(),
            unresolved: Vec::new(),
        }
    }

    /// Attach opaque source metadata (file name, row count, etc.).
    pub fn source_meta(mut self, meta: serde_json::Value) -> Self {
        self.source_meta = meta;
        self
    }

    /// Record the translator mapping name used, if any.
    pub fn mapping(mut self, mapping: impl Into<String>) -> Self {
        self.mapping = Some(mapping.into());
        self
    }

    /// Record a row that was newly created. Its inverse is its own removal.
    pub fn add_created(mut self, row: serde_json::Value) -> Self {
        self.inverse.removed.push(row.clone());
        self.forward.added.push(row);
        self
    }

    /// Record a row that was updated. `before` and `after` must carry
    /// enough identity (at minimum an id field) to be addressed again; the
    /// inverse restores `before`.
    pub fn add_updated(mut self, before: serde_json::Value, after: serde_json::Value) -> Self {
        self.inverse.updated.push(before);
        self.forward.updated.push(after);
        self
    }

    /// Record a row that was removed. Its inverse is its own re-creation.
    pub fn add_removed(mut self, row: serde_json::Value) -> Self {
        self.inverse.added.push(row.clone());
        self.forward.removed.push(row);
        self
    }

    /// Record a row the translator could not confidently resolve.
    pub fn add_unresolved(mut self, item: UnresolvedItem) -> Self {
        self.unresolved.push(item);
        self
    }

    /// Finalize the receipt. `id` is assigned by the caller (typically the
    /// receipt store, which owns id generation) rather than by the builder.
    pub fn build(self, id: ReceiptId) -> ImportReceipt {
        ImportReceipt {
            id,
            user_id: self.user_id,
            source_type: self.source_type,
            source_meta: self.source_meta,
            mapping: self.mapping,
            layer: self.layer,
            changeset: self.forward,
            inverse: self.inverse,
            unresolved: if self.unresolved.is_empty() {
                None
            } else {
                Some(self.unresolved)
            },
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn update_inverse_always_restores_before(
            id in "[a-z]{1,8}",
            before_rank in 0i64..100,
            after_rank in 0i64..100,
        ) {
            let before = serde_json::json!({"id": id, "rank": before_rank});
            let after = serde_json::json!({"id": id, "rank": after_rank});
            let receipt = ReceiptBuilder::new(UserId::from("u1"), "csv", ImportLayer::Ownership)
                .add_updated(before.clone(), after)
                .build(ReceiptId::from("r1"));

            prop_assert_eq!(receipt.inverse.updated, vec![before]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn created_row_inverse_is_removal() {
        let row = serde_json::json!({"refId": "cdn:officer:kirk"});
        let receipt = ReceiptBuilder::new(UserId::from("u1"), "csv", ImportLayer::Ownership)
            .add_created(row.clone())
            .build(ReceiptId::from("r1"));

        assert_eq!(receipt.changeset.added, vec![row.clone()]);
        assert_eq!(receipt.inverse.removed, vec![row]);
    }

    #[test]
    fn updated_row_inverse_restores_before() {
        let before = serde_json::json!({"id": "x", "rank": 2});
        let after = serde_json::json!({"id": "x", "rank": 5});
        let receipt = ReceiptBuilder::new(UserId::from("u1"), "csv", ImportLayer::Ownership)
            .add_updated(before.clone(), after.clone())
            .build(ReceiptId::from("r1"));

        assert_eq!(receipt.changeset.updated, vec![after]);
        assert_eq!(receipt.inverse.updated, vec![before]);
    }

    #[test]
    fn removed_row_inverse_is_recreation() {
        let row = serde_json::json!({"id": "x"});
        let receipt = ReceiptBuilder::new(UserId::from("u1"), "csv", ImportLayer::Ownership)
            .add_removed(row.clone())
            .build(ReceiptId::from("r1"));

        assert_eq!(receipt.changeset.removed, vec![row.clone()]);
        assert_eq!(receipt.inverse.added, vec![row]);
    }

    #[test]
    fn unresolved_items_collected_only_when_present() {
        let clean = ReceiptBuilder::new(UserId::from("u1"), "csv", ImportLayer::Ownership)
            .build(ReceiptId::from("r1"));
        assert!(clean.unresolved.is_none());

        let dirty = ReceiptBuilder::new(UserId::from("u1"), "csv", ImportLayer::Ownership)
            .add_unresolved(UnresolvedItem {
                row_index: 0,
                raw_name: "kirk".into(),
                candidates: vec!["cdn:officer:kirk".into()],
            })
            .build(ReceiptId::from("r2"));
        assert_eq!(dirty.unresolved.unwrap().len(), 1);
    }
}
