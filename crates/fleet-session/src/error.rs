//! Error type for the session orchestrator and tool runtime.

use fleet_error::{ErrorCode, FleetError, Store};

/// Errors that can occur while running a chat turn or dispatching a tool
/// call through the mutation-gating protocol (§4.5).
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The underlying database operation failed (session/frame/rule rows).
    #[error(transparent)]
    Db(#[from] fleet_db::DbError),
    /// A stored JSON column could not be decoded back into its domain type.
    #[error("corrupt session row: {0}")]
    Corrupt(String),
    /// A value could not be (de)serialized.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// The composition store rejected a tool's entity mutation.
    #[error(transparent)]
    Composition(#[from] fleet_composition::CompositionError),
    /// The catalog store rejected a tool's overlay mutation.
    #[error(transparent)]
    Catalog(#[from] fleet_catalog::CatalogError),
    /// The proposal store rejected a create/apply/decline call.
    #[error(transparent)]
    Proposal(#[from] fleet_proposal::ProposalError),
    /// The policy store failed while resolving or editing an override.
    #[error(transparent)]
    Policy(#[from] fleet_policy::PolicyError),
    /// The receipt store rejected an insert or chain read.
    #[error(transparent)]
    Receipt(#[from] fleet_receipt_store::ReceiptStoreError),
    /// No chat session exists for this `(user, session)` pair.
    #[error("chat session {0} not found")]
    SessionNotFound(String),
    /// The tool call named a tool this runtime does not recognize.
    #[error("unknown tool {0}")]
    UnknownTool(String),
    /// The trust policy resolved to `block` for this tool.
    #[error("tool {0} is blocked by trust policy")]
    ToolBlocked(String),
    /// A tool's arguments failed validation and could not be repaired.
    #[error("invalid arguments for tool {tool}: {detail}")]
    InvalidArgs {
        /// The tool whose arguments failed validation.
        tool: String,
        /// Human-readable validation failure detail.
        detail: String,
    },
    /// The single-shot model-response repair pass still failed validation
    /// (§4.5: one repair attempt only, then a fixed disclaimer fallback).
    #[error("response validation failed after repair attempt")]
    RepairExhausted,
    /// The turn was cancelled via its [`crate::cancel::CancellationToken`].
    #[error("turn cancelled: {0:?}")]
    Cancelled(crate::cancel::CancellationReason),
}

impl From<SessionError> for FleetError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::SessionNotFound(id) => {
                FleetError::new(ErrorCode::NotFound, format!("chat session {id} not found"))
            }
            SessionError::UnknownTool(tool) => {
                FleetError::new(ErrorCode::InvalidParam, format!("unknown tool {tool}"))
            }
            SessionError::ToolBlocked(tool) => FleetError::new(
                ErrorCode::Forbidden,
                format!("tool {tool} is blocked by trust policy"),
            ),
            SessionError::InvalidArgs { tool, detail } => FleetError::new(
                ErrorCode::InvalidParam,
                format!("invalid arguments for tool {tool}: {detail}"),
            )
            .with_context("tool", tool),
            SessionError::RepairExhausted => {
                FleetError::new(ErrorCode::Internal, "response validation failed after repair attempt")
            }
            SessionError::Cancelled(reason) => FleetError::new(
                ErrorCode::RequestTimeout,
                format!("turn cancelled: {reason:?}"),
            ),
            // Delegate to each substore's own error mapping rather than
            // flattening it into a generic session error; the caller still
            // sees e.g. `CONFLICT` for a `NotProposed` proposal instead of a
            // blanket `INTERNAL_ERROR`.
            SessionError::Composition(inner) => inner.into(),
            SessionError::Catalog(inner) => inner.into(),
            SessionError::Proposal(inner) => inner.into(),
            SessionError::Policy(inner) => inner.into(),
            SessionError::Receipt(inner) => inner.into(),
            SessionError::Db(inner) => {
                FleetError::new(ErrorCode::StoreNotAvailable(Store::Session), "session store unavailable")
                    .with_source(inner)
            }
            SessionError::Corrupt(detail) => FleetError::new(ErrorCode::Internal, "session store internal error")
                .with_context("detail", detail),
            SessionError::Json(inner) => {
                FleetError::new(ErrorCode::Internal, "session store internal error").with_source(inner)
            }
        }
    }
}
