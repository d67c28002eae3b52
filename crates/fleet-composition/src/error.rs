//! Error type for composition-layer operations.

use fleet_core::LoadoutId;
use fleet_error::{ErrorCode, FleetError, Store};

/// Errors that can occur while reading or writing a user's composition
/// layer (loadouts, bridge cores, below-deck policies, docks, plan items,
/// targets).
#[derive(Debug, thiserror::Error)]
pub enum CompositionError {
    /// The underlying database operation failed.
    #[error(transparent)]
    Db(#[from] fleet_db::DbError),
    /// A stored JSON column could not be decoded back into its domain type.
    #[error("corrupt composition row: {0}")]
    Corrupt(String),
    /// A value could not be (de)serialized.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// No row exists for this id.
    #[error("composition row {0} not found")]
    NotFound(LoadoutId),
    /// `LoadoutVariant.base_loadout_id` does not name a loadout owned by the
    /// same user (§3 cross-entity invariant).
    #[error("base loadout {0} not found for this user")]
    BaseLoadoutNotFound(LoadoutId),
    /// A priority value fell outside `1..=3`.
    #[error(transparent)]
    PriorityOutOfRange(#[from] fleet_core::PriorityOutOfRange),
    /// A dock number fell outside `1..=8`.
    #[error(transparent)]
    DockNumberOutOfRange(#[from] fleet_core::DockNumberOutOfRange),
}

impl From<CompositionError> for FleetError {
    fn from(err: CompositionError) -> Self {
        match &err {
            CompositionError::NotFound(id) => {
                FleetError::new(ErrorCode::NotFound, format!("composition row {id} not found"))
            }
            CompositionError::BaseLoadoutNotFound(id) => FleetError::new(
                ErrorCode::InvalidParam,
                format!("base loadout {id} not found for this user"),
            ),
            CompositionError::Db(_) => FleetError::new(
                ErrorCode::StoreNotAvailable(Store::Composition),
                "composition store unavailable",
            )
            .with_source(err),
            CompositionError::PriorityOutOfRange(_) | CompositionError::DockNumberOutOfRange(_) => {
                FleetError::new(ErrorCode::InvalidParam, err.to_string())
            }
            CompositionError::Corrupt(_) | CompositionError::Json(_) => {
                FleetError::new(ErrorCode::Internal, "composition store internal error")
                    .with_source(err)
            }
        }
    }
}
