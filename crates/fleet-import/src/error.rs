//! Error type for every stage of the import pipeline (§4.3).

use fleet_core::ReceiptId;
use fleet_error::{ErrorCode, FleetError, Store};

/// Errors that can occur while parsing, translating, resolving, or
/// applying an import.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    /// The underlying database operation failed.
    #[error(transparent)]
    Db(#[from] fleet_db::DbError),
    /// A catalog read or overlay write failed.
    #[error(transparent)]
    Catalog(#[from] fleet_catalog::CatalogError),
    /// Writing or resolving a receipt failed.
    #[error(transparent)]
    Receipt(#[from] fleet_receipt_store::ReceiptStoreError),
    /// A value could not be (de)serialized.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// `contentBase64` was not valid base64.
    #[error("payload is not valid base64: {0}")]
    InvalidBase64(String),
    /// The decoded bytes could not be parsed as the declared `format`.
    #[error("failed to parse {format} payload: {reason}")]
    ParseFailed {
        /// `csv` or `xlsx`.
        format: String,
        /// Human-readable parse failure.
        reason: String,
    },
    /// `translator` named a config this engine does not recognise.
    #[error("unknown translator {0}")]
    UnknownTranslator(String),
    /// The payload exceeded the configured size/shape bound (§6
    /// data-hygiene rules).
    #[error("payload too large: {0} bytes exceeds the configured limit")]
    PayloadTooLarge(usize),
    /// Translation produced zero translated rows across every configured
    /// entity (§4.3: "zero translated rows surface structured errors").
    #[error("translator produced no translated rows")]
    NoRowsTranslated,
    /// `resolveReceiptItems` named a receipt that does not belong to this
    /// user or does not exist.
    #[error("receipt {0} not found")]
    ReceiptNotFound(ReceiptId),
    /// A stored JSON/row value could not be decoded into its domain type.
    #[error("corrupt import row: {0}")]
    Corrupt(String),
}

impl From<ImportError> for FleetError {
    fn from(err: ImportError) -> Self {
        match &err {
            ImportError::InvalidBase64(_)
            | ImportError::ParseFailed { .. }
            | ImportError::UnknownTranslator(_)
            | ImportError::NoRowsTranslated => {
                FleetError::new(ErrorCode::InvalidParam, err.to_string())
            }
            ImportError::PayloadTooLarge(_) => {
                FleetError::new(ErrorCode::PayloadTooLarge, err.to_string())
                    .with_hint("split the export into smaller files and retry")
            }
            ImportError::ReceiptNotFound(_) => {
                FleetError::new(ErrorCode::NotFound, "receipt not found")
            }
            ImportError::Db(_) => {
                FleetError::new(ErrorCode::StoreNotAvailable(Store::Receipt), "import store unavailable")
                    .with_source(err)
            }
            ImportError::Catalog(_) => {
                FleetError::new(ErrorCode::StoreNotAvailable(Store::Catalog), "catalog store unavailable")
                    .with_source(err)
            }
            ImportError::Receipt(_) => {
                FleetError::new(ErrorCode::StoreNotAvailable(Store::Receipt), "receipt store unavailable")
                    .with_source(err)
            }
            ImportError::Json(_) | ImportError::Corrupt(_) => {
                FleetError::new(ErrorCode::Internal, "import store internal error").with_source(err)
            }
        }
    }
}
