//! Error type for proposal store operations.

use fleet_core::{ProposalId, ProposalStatus};
use fleet_error::{ErrorCode, FleetError, Store};

/// Errors that can occur while creating, reading, or transitioning a
/// [`fleet_core::MutationProposal`].
#[derive(Debug, thiserror::Error)]
pub enum ProposalError {
    /// The underlying database operation failed.
    #[error(transparent)]
    Db(#[from] fleet_db::DbError),
    /// A stored JSON column could not be decoded back into its domain type.
    #[error("corrupt proposal row: {0}")]
    Corrupt(String),
    /// A value could not be (de)serialized.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// No proposal with that id exists for this user.
    #[error("proposal {0} not found")]
    NotFound(ProposalId),
    /// `apply`/`decline` attempted on a proposal not in `proposed` status
    /// (§4.4 "Reject if status ≠ proposed").
    #[error("proposal {0} has status {1:?}, not proposed")]
    NotProposed(ProposalId, ProposalStatus),
    /// `apply` attempted on a proposal whose `expires_at` has passed; the
    /// proposal has been swept to `expired` as a side effect.
    #[error("proposal {id} expired at {expires_at}")]
    Expired {
        /// The expired proposal's id.
        id: ProposalId,
        /// The timestamp it expired at, for the caller's user-visible
        /// message (§4.4: "a user-visible reason that includes the expiry
        /// timestamp").
        expires_at: chrono::DateTime<chrono::Utc>,
    },
}

impl From<ProposalError> for FleetError {
    fn from(err: ProposalError) -> Self {
        match &err {
            ProposalError::NotFound(id) => {
                FleetError::new(ErrorCode::NotFound, format!("proposal {id} not found"))
            }
            ProposalError::NotProposed(id, status) => FleetError::new(
                ErrorCode::Conflict,
                format!("proposal {id} has status {status:?}, not proposed"),
            ),
            ProposalError::Expired { id, expires_at } => FleetError::new(
                ErrorCode::Conflict,
                format!("proposal {id} expired at {expires_at}"),
            )
            .with_context("expiresAt", expires_at.to_rfc3339()),
            ProposalError::Db(_) => {
                FleetError::new(ErrorCode::StoreNotAvailable(Store::Proposal), "proposal store unavailable")
                    .with_source(err)
            }
            ProposalError::Corrupt(_) | ProposalError::Json(_) => {
                FleetError::new(ErrorCode::Internal, "proposal store internal error").with_source(err)
            }
        }
    }
}
