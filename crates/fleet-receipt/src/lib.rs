// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! Receipt canonicalization, hashing, chain verification, and diffing
//! (§3, §4.3, §4.4, §8).
//!
//! This crate has no storage logic of its own (that's `fleet-receipt-store`)
//! — it provides the pure functions every receipt-producing path needs:
//! a deterministic canonical JSON form and its SHA-256 hash (used for audit
//! log integrity, not for the receipt's own identity — `ImportReceipt::id`
//! is assigned by the store), a builder for assembling forward/inverse
//! changesets fluently, field-level diffing to compute an inverse patch from
//! a before/after snapshot, and an append-only hash chain for verifying that
//! no receipt in a user's history has been tampered with out of band.

mod builder;
mod chain;
mod diff;

pub use builder::ReceiptBuilder;
pub use chain::{ChainError, ReceiptChain};
pub use diff::{diff_overlay_fields, FieldDiff};

pub use fleet_core::{Changeset, ImportLayer, ImportReceipt, UnresolvedItem};

use sha2::{Digest, Sha256};

/// Produce the canonical JSON representation of a receipt.
///
/// `serde_json`'s default (non-`preserve_order`) `Map` is backed by a
/// `BTreeMap`, so keys are already emitted in sorted order — this is the
/// sorted-key convention `spec.md` §9's ETag open question resolves on,
/// reused here for receipt hashing so both call sites agree on one notion
/// of "canonical JSON".
///
/// # Errors
///
/// Returns a `serde_json::Error` if the receipt cannot be serialized.
pub fn canonicalize(receipt: &ImportReceipt) -> Result<String, serde_json::Error> {
    let v = serde_json::to_value(receipt)?;
    serde_json::to_string(&v)
}

/// Compute the hex-encoded SHA-256 hash of the canonical receipt form.
///
/// # Errors
///
/// Returns a `serde_json::Error` if the receipt cannot be serialized.
pub fn hash(receipt: &ImportReceipt) -> Result<String, serde_json::Error> {
    let canonical = canonicalize(receipt)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::{Changeset, ImportLayer};

    fn sample() -> ImportReceipt {
        ImportReceipt {
            id: fleet_core::ReceiptId::from("r1"),
            user_id: fleet_core::UserId::from("u1"),
            source_type: "csv".to_string(),
            source_meta: serde_json::json!({"fileName": "export.csv"}),
            mapping: None,
            layer: ImportLayer::Ownership,
            changeset: Changeset::default(),
            inverse: Changeset::default(),
            unresolved: None,
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn canonicalize_is_deterministic() {
        let r = sample();
        assert_eq!(canonicalize(&r).unwrap(), canonicalize(&r).unwrap());
    }

    #[test]
    fn hash_is_deterministic_and_hex() {
        let r = sample();
        let h1 = hash(&r).unwrap();
        let h2 = hash(&r).unwrap();
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
        assert!(h1.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn different_receipts_hash_differently() {
        let mut r2 = sample();
        r2.id = fleet_core::ReceiptId::from("r2");
        assert_ne!(hash(&sample()).unwrap(), hash(&r2).unwrap());
    }
}
