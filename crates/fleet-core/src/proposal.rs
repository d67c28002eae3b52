//! Mutation proposal entity and its state machine (§3, §4.4).

use crate::ids::{ProposalId, ReceiptId, UserId};
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Lifecycle state of a [`MutationProposal`]. Advances monotonically
/// `Proposed -> {Applied | Declined | Expired}`; no other transition is
/// valid (§3, §8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    /// Awaiting apply or decline.
    Proposed,
    /// Applied; `applied_receipt_id`/`applied_at` are set.
    Applied,
    /// Declined by the user; `decline_reason` may be set.
    Declined,
    /// Swept by `expireStale` or discovered expired at apply time.
    Expired,
}

impl ProposalStatus {
    /// The set of states `self` may transition into. Matches this
    /// workspace's existing "valid_transitions / can_transition_to" pattern
    /// for lifecycle enums rather than scattering match arms at call sites.
    pub fn valid_transitions(&self) -> &'static [ProposalStatus] {
        match self {
            ProposalStatus::Proposed => &[
                ProposalStatus::Applied,
                ProposalStatus::Declined,
                ProposalStatus::Expired,
            ],
            ProposalStatus::Applied | ProposalStatus::Declined | ProposalStatus::Expired => &[],
        }
    }

    /// True if `self -> next` is a valid transition.
    pub fn can_transition_to(&self, next: ProposalStatus) -> bool {
        self.valid_transitions().contains(&next)
    }
}

/// A single-tool preview entry within a batched proposal (§3, §4.4).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BatchItem {
    /// Tool this item would invoke.
    pub tool: String,
    /// Human-legible preview of this item's effect.
    pub preview: serde_json::Value,
}

/// A pending mutation description with a TTL; never applied implicitly
/// (§3, §4.4, GLOSSARY).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MutationProposal {
    /// Opaque, cryptographically random id.
    pub id: ProposalId,
    /// Owning user.
    pub user_id: UserId,
    /// The tool this proposal would invoke.
    pub tool: String,
    /// The tool's raw input arguments, canonicalised.
    pub args_json: serde_json::Value,
    /// Hex-encoded SHA-256 of `{tool, canonicalised args_json}`, used for
    /// idempotency and de-duplication (§4.4).
    pub args_hash: String,
    /// Human-legible preview of what applying this proposal would do.
    pub proposal_json: serde_json::Value,
    /// Ordered per-tool previews, for multi-step (batched) proposals.
    pub batch_items: Option<Vec<BatchItem>>,
    /// Lifecycle status.
    pub status: ProposalStatus,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Absolute expiry; default 15 minutes from `created_at` (§6).
    pub expires_at: DateTime<Utc>,
    /// Set once applied.
    pub applied_receipt_id: Option<ReceiptId>,
    /// Set once applied.
    pub applied_at: Option<DateTime<Utc>>,
    /// Set once declined.
    pub declined_at: Option<DateTime<Utc>>,
    /// Operator-supplied reason for a decline, if given.
    pub decline_reason: Option<String>,
}

impl MutationProposal {
    /// True if `now` is at or past `expires_at` (§8: strict `<` for expiry
    /// means exactly-at-expiry is still eligible to apply, not expired; see
    /// [`Self::is_expired`] doc for the precise boundary semantics used by
    /// `apply`).
    ///
    /// Per §8 "Proposal applied at `expiresAt` exactly: eligible (strict `<`
    /// for expiry)", a proposal is only considered expired when
    /// `expires_at < now`, i.e. `now == expires_at` is still within the TTL.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proposed_can_transition_to_all_terminal_states() {
        assert!(ProposalStatus::Proposed.can_transition_to(ProposalStatus::Applied));
        assert!(ProposalStatus::Proposed.can_transition_to(ProposalStatus::Declined));
        assert!(ProposalStatus::Proposed.can_transition_to(ProposalStatus::Expired));
    }

    #[test]
    fn terminal_states_have_no_outgoing_transitions() {
        assert!(ProposalStatus::Applied.valid_transitions().is_empty());
        assert!(ProposalStatus::Declined.valid_transitions().is_empty());
        assert!(ProposalStatus::Expired.valid_transitions().is_empty());
    }

    #[test]
    fn applied_cannot_transition_to_declined() {
        assert!(!ProposalStatus::Applied.can_transition_to(ProposalStatus::Declined));
    }

    #[test]
    fn expiry_boundary_is_exclusive_of_exact_match() {
        let now = Utc::now();
        let proposal = MutationProposal {
            id: ProposalId::from("p1"),
            user_id: UserId::from("u1"),
            tool: "create_loadout".into(),
            args_json: serde_json::json!({}),
            args_hash: "abc".into(),
            proposal_json: serde_json::json!({}),
            batch_items: None,
            status: ProposalStatus::Proposed,
            created_at: now,
            expires_at: now,
            applied_receipt_id: None,
            applied_at: None,
            declined_at: None,
            decline_reason: None,
        };
        assert!(
            !proposal.is_expired(now),
            "exactly-at-expiry must still be eligible to apply (§8)"
        );
        assert!(proposal.is_expired(now + chrono::Duration::milliseconds(1)));
    }
}
