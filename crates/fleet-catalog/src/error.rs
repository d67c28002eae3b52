//! Error type for catalog and overlay operations.

use fleet_core::RefId;
use fleet_error::{ErrorCode, FleetError, Store};

/// Errors that can occur while reading or writing the reference catalog or
/// a user's overlay on it.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// The underlying database operation failed.
    #[error(transparent)]
    Db(#[from] fleet_db::DbError),
    /// A stored JSON column could not be decoded back into its domain type.
    #[error("corrupt catalog row: {0}")]
    Corrupt(String),
    /// A value could not be (de)serialized.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// No reference row exists for this id.
    #[error("reference row {0} not found")]
    NotFound(RefId),
    /// Writing the bulk-overlay receipt failed.
    #[error(transparent)]
    Receipt(#[from] fleet_receipt_store::ReceiptStoreError),
}

impl From<CatalogError> for FleetError {
    fn from(err: CatalogError) -> Self {
        match &err {
            CatalogError::NotFound(id) => {
                FleetError::new(ErrorCode::NotFound, format!("reference row {id} not found"))
            }
            CatalogError::Db(_) => {
                FleetError::new(ErrorCode::StoreNotAvailable(Store::Catalog), "catalog store unavailable")
                    .with_source(err)
            }
            CatalogError::Receipt(_) => {
                FleetError::new(ErrorCode::Internal, "failed to record overlay receipt").with_source(err)
            }
            CatalogError::Corrupt(_) | CatalogError::Json(_) => {
                FleetError::new(ErrorCode::Internal, "catalog store internal error").with_source(err)
            }
        }
    }
}
