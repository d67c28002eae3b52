//! Errors this crate's pool/scope machinery can raise (§4.1 failure
//! semantics).

/// Failure modes for [`crate::Db`] connection, migration, and scope
/// handling.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// `DATABASE_URL` could not be parsed as Postgres connection options.
    #[error("invalid database url: {0}")]
    InvalidDatabaseUrl(#[source] sqlx::Error),

    /// Connection acquisition, query execution, or commit/rollback failed.
    /// Covers both transient conditions (pool exhaustion, timeout) and the
    /// database's own RLS policy rejecting a write with a foreign
    /// `user_id` — §4.1 calls the latter an "internal consistency error",
    /// which this crate represents the same way since both surface as a
    /// failed `sqlx` call and only the caller's context can tell them
    /// apart.
    #[error("database operation failed: {0}")]
    Connect(#[source] sqlx::Error),

    /// `Db::migrate` failed to apply the bundled migrations.
    #[error("migration failed: {0}")]
    Migrate(#[source] sqlx::migrate::MigrateError),

    /// A caller attempted to scope a transaction to a `user_id` that is
    /// not a bare identifier (empty, or containing characters outside
    /// `[A-Za-z0-9_-]`). Rejected before it reaches `SET LOCAL`, since that
    /// statement cannot take a bind parameter.
    #[error("invalid user id for scoping: {0:?}")]
    InvalidUserScope(String),

    /// `config.app_role` is not a bare Postgres identifier, so it cannot be
    /// safely interpolated into the post-migration `GRANT` statement.
    #[error("invalid app role for grant: {0:?}")]
    InvalidAppRole(String),
}

impl DbError {
    /// True for failure modes a caller may reasonably retry (pool
    /// exhaustion, acquire timeout) as opposed to ones that indicate a bug
    /// or a genuine constraint violation.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DbError::Connect(sqlx::Error::PoolTimedOut) | DbError::Connect(sqlx::Error::Io(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_timeout_is_retryable() {
        let err = DbError::Connect(sqlx::Error::PoolTimedOut);
        assert!(err.is_retryable());
    }

    #[test]
    fn invalid_scope_is_not_retryable() {
        let err = DbError::InvalidUserScope("bad id".to_string());
        assert!(!err.is_retryable());
    }
}
