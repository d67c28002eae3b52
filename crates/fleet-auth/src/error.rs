//! Error type for identity resolution, session lifecycle, and password
//! operations (§4.7, §7).

use fleet_core::UserId;
use fleet_error::{ErrorCode, FleetError, Store};

/// Errors that can occur while authenticating a caller or mutating account
/// state.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The underlying database operation failed.
    #[error(transparent)]
    Db(#[from] fleet_db::DbError),
    /// A value could not be (de)serialized.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// No identity could be resolved from the envelope (§4.7 resolution order
    /// exhausted with no match).
    #[error("no identity could be resolved from this request")]
    Unauthorized,
    /// The email address is already registered.
    #[error("email already registered")]
    EmailTaken,
    /// Email/password did not match a known, verifiable account.
    #[error("invalid email or password")]
    InvalidCredentials,
    /// The account's email has not been verified.
    #[error("email not verified for user {0}")]
    EmailNotVerified(UserId),
    /// The account is locked.
    #[error("account locked for user {0}")]
    AccountLocked(UserId),
    /// The caller's role does not meet the minimum rank required.
    #[error("role {have:?} does not meet minimum rank {need:?}")]
    InsufficientRank {
        /// The caller's actual role.
        have: fleet_core::Role,
        /// The minimum role required.
        need: fleet_core::Role,
    },
    /// A one-shot token (verify/reset) was not found, already consumed, or
    /// expired.
    #[error("token is invalid, already used, or expired")]
    InvalidToken,
    /// Password hashing or verification failed for a reason other than a
    /// mismatch (malformed stored hash, allocation failure inside argon2).
    #[error("password hashing failed: {0}")]
    PasswordHash(String),
    /// A stored JSON/row value could not be decoded into its domain type.
    #[error("corrupt auth row: {0}")]
    Corrupt(String),
}

impl From<AuthError> for FleetError {
    fn from(err: AuthError) -> Self {
        match &err {
            AuthError::Unauthorized | AuthError::InvalidCredentials => {
                FleetError::new(ErrorCode::Unauthorized, "authentication required")
                    .with_hint("sign in and retry with a valid session")
            }
            AuthError::EmailNotVerified(_) => {
                FleetError::new(ErrorCode::EmailNotVerified, "email address is not verified")
                    .with_hint("check your inbox for the verification email")
            }
            AuthError::AccountLocked(_) => {
                FleetError::new(ErrorCode::AccountLocked, "account is locked")
                    .with_hint("contact an administrator to unlock this account")
            }
            AuthError::InsufficientRank { need, .. } => FleetError::new(
                ErrorCode::InsufficientRank,
                format!("requires at least {need:?} rank"),
            ),
            AuthError::EmailTaken => {
                FleetError::new(ErrorCode::Conflict, "email already registered")
            }
            AuthError::InvalidToken => {
                FleetError::new(ErrorCode::InvalidParam, "token is invalid, already used, or expired")
            }
            AuthError::Db(_) => {
                FleetError::new(ErrorCode::StoreNotAvailable(Store::Auth), "auth store unavailable")
                    .with_source(err)
            }
            AuthError::PasswordHash(_) | AuthError::Corrupt(_) | AuthError::Json(_) => {
                FleetError::new(ErrorCode::Internal, "auth store internal error").with_source(err)
            }
        }
    }
}
