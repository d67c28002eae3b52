//! Error type for receipt storage operations.

use fleet_core::ReceiptId;
use fleet_error::{ErrorCode, FleetError, Store};
use fleet_receipt::ChainError;

/// Errors that can occur while storing, fetching, or verifying receipts.
#[derive(Debug, thiserror::Error)]
pub enum ReceiptStoreError {
    /// The underlying database operation failed.
    #[error(transparent)]
    Db(#[from] fleet_db::DbError),
    /// A stored JSON column could not be decoded back into its domain type.
    #[error("corrupt receipt row: {0}")]
    Corrupt(String),
    /// A receipt could not be (de)serialized.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// No receipt with that id exists for this user.
    #[error("receipt {0} not found")]
    NotFound(ReceiptId),
    /// The user's receipt chain failed verification.
    #[error(transparent)]
    Chain(#[from] ChainError),
}

impl From<ReceiptStoreError> for FleetError {
    fn from(err: ReceiptStoreError) -> Self {
        match &err {
            ReceiptStoreError::NotFound(id) => {
                FleetError::new(ErrorCode::NotFound, format!("receipt {id} not found"))
            }
            ReceiptStoreError::Chain(_) => {
                FleetError::new(ErrorCode::Conflict, "receipt chain verification failed")
                    .with_source(err)
            }
            ReceiptStoreError::Db(_) => {
                FleetError::new(ErrorCode::StoreNotAvailable(Store::Receipt), "receipt store unavailable")
                    .with_source(err)
            }
            ReceiptStoreError::Corrupt(_) | ReceiptStoreError::Json(_) => {
                FleetError::new(ErrorCode::Internal, "receipt store internal error").with_source(err)
            }
        }
    }
}
