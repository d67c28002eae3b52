//! Error type for trust-tier resolution and override management.

use fleet_error::{ErrorCode, FleetError, Store};

/// Errors that can occur while reading or writing trust-tier overrides.
///
/// Per §4.6 ("If any step throws, fall through to the next; never treat a
/// policy-system failure as `auto`"), callers resolving a tier should catch
/// this and fall through to [`crate::TrustPolicy::default_for`] rather than
/// propagate it as a hard failure — `resolve` does this internally, so this
/// type is surfaced mainly for explicit override management (`set`/`clear`).
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    /// The underlying database operation failed.
    #[error(transparent)]
    Db(#[from] fleet_db::DbError),
    /// A stored trust-tier string was not one of `auto`/`approve`/`block`.
    #[error("corrupt trust tier value: {0}")]
    Corrupt(String),
}

impl From<PolicyError> for FleetError {
    fn from(err: PolicyError) -> Self {
        match &err {
            PolicyError::Db(_) => {
                FleetError::new(ErrorCode::StoreNotAvailable(Store::Policy), "policy store unavailable")
                    .with_source(err)
            }
            PolicyError::Corrupt(_) => {
                FleetError::new(ErrorCode::Internal, "policy store internal error").with_source(err)
            }
        }
    }
}
