// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! Dual-role, per-user row-level-security persistence substrate (§4.1).
//!
//! Two [`sqlx::PgPool`]s connect to the same database as two different
//! Postgres roles: an admin role used only for schema/migration work, and
//! an unprivileged app role every user-scoped query actually runs under.
//! Row-level security on every per-user table (installed by the migrations
//! in this crate) means isolation is enforced by Postgres itself, not by
//! application `WHERE` clauses — [`Db::with_user_scope`]/[`Db::with_user_read`]
//! are the only supported way to touch a per-user table, and any code path
//! that reaches the app pool without going through one of them gets back
//! rows filtered to nothing rather than another user's data, because
//! `current_setting('app.current_user_id', true)` is unset.

mod error;

pub use error::DbError;

use fleet_config::FleetConfig;
use fleet_core::UserId;
use futures::future::BoxFuture;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{PgPool, Postgres, Transaction};
use std::str::FromStr;
use std::time::Duration;

/// How long a pool will wait for a free connection before giving up.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

/// Holds both connection pools. Constructed once at startup via
/// [`Db::connect`] and shared (behind an `Arc`, typically) across the
/// service.
#[derive(Clone)]
pub struct Db {
    admin_pool: PgPool,
    app_pool: PgPool,
}

impl Db {
    /// Open both pools against `config.database_url`, logging in as
    /// `config.admin_role` and `config.app_role` respectively. Does not run
    /// migrations — call [`Db::migrate`] explicitly after connecting.
    pub async fn connect(config: &FleetConfig) -> Result<Self, DbError> {
        let base = PgConnectOptions::from_str(&config.database_url)
            .map_err(DbError::InvalidDatabaseUrl)?;

        let admin_opts = base.clone().username(&config.admin_role);
        let app_opts = base.username(&config.app_role);

        let admin_pool = PgPoolOptions::new()
            .max_connections(config.db_max_connections)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect_with(admin_opts)
            .await
            .map_err(DbError::Connect)?;

        let app_pool = PgPoolOptions::new()
            .max_connections(config.db_max_connections)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect_with(app_opts)
            .await
            .map_err(DbError::Connect)?;

        tracing::info!(
            admin_role = %config.admin_role,
            app_role = %config.app_role,
            max_connections = config.db_max_connections,
            "connected db pools"
        );

        Ok(Self {
            admin_pool,
            app_pool,
        })
    }

    /// Build a `Db` directly from two already-open pools — used by tests
    /// that want to exercise both roles against one `sqlx::PgPool` test
    /// fixture, or by callers that manage pool construction themselves.
    pub fn from_pools(admin_pool: PgPool, app_pool: PgPool) -> Self {
        Self {
            admin_pool,
            app_pool,
        }
    }

    /// Run this crate's bundled migrations against the admin pool, then
    /// grant the unprivileged `app_role` `SELECT`/`INSERT`/`UPDATE`/`DELETE`
    /// on every table the migrations just created (§4.1). DDL and the grant
    /// must never be attempted via the app pool — this is the one place in
    /// the crate that touches schema or role privileges.
    pub async fn migrate(&self, app_role: &str) -> Result<(), DbError> {
        sqlx::migrate!("./migrations")
            .run(&self.admin_pool)
            .await
            .map_err(DbError::Migrate)?;
        tracing::info!("migrations applied");

        grant_app_role(&self.admin_pool, app_role).await?;
        tracing::info!(app_role, "granted table privileges to app role");
        Ok(())
    }

    /// The privileged pool, for schema/catalog operations that are
    /// deliberately not user-scoped (reference catalog upserts, §4.2).
    pub fn admin_pool(&self) -> &PgPool {
        &self.admin_pool
    }

    /// The unprivileged pool, exposed only so store factories built on top
    /// of this crate can call [`Db::with_user_scope`]/[`Db::with_user_read`]
    /// — never query it directly without going through one of those.
    pub fn app_pool(&self) -> &PgPool {
        &self.app_pool
    }

    /// Run `f` inside a read/write transaction scoped to `user_id`: opens a
    /// transaction on the app pool, issues `SET LOCAL app.current_user_id`,
    /// runs `f`, and commits on success or rolls back on any error
    /// (including `f` itself failing).
    ///
    /// Generic over the error type `f` returns (anything `DbError` converts
    /// into, `DbError` itself included) so a caller whose transaction body
    /// also enforces its own domain state machine — e.g. `fleet-proposal`'s
    /// `apply`, which must reject a non-`proposed` or expired proposal from
    /// inside the same transaction that writes the entity mutation and
    /// receipt — can surface that failure directly instead of laundering it
    /// through `DbError`.
    pub async fn with_user_scope<T, E, F>(&self, user_id: &UserId, f: F) -> Result<T, E>
    where
        T: Send + 'static,
        E: From<DbError> + Send + 'static,
        F: for<'c> FnOnce(&'c mut Transaction<'_, Postgres>) -> BoxFuture<'c, Result<T, E>> + Send,
    {
        let mut tx = self
            .app_pool
            .begin()
            .await
            .map_err(|e| E::from(DbError::Connect(e)))?;
        set_scope(&mut tx, user_id).await.map_err(E::from)?;

        match f(&mut tx).await {
            Ok(value) => {
                tx.commit().await.map_err(|e| E::from(DbError::Connect(e)))?;
                Ok(value)
            }
            Err(err) => {
                let _ = tx.rollback().await;
                Err(err)
            }
        }
    }

    /// Same as [`Db::with_user_scope`], but intended for read-only work.
    /// Postgres does not let `SET LOCAL` vary by statement read/write-ness
    /// within one transaction, so this sets the same session variable; the
    /// distinction exists at the call-site level so read paths are never
    /// accidentally given license to write.
    pub async fn with_user_read<T, E, F>(&self, user_id: &UserId, f: F) -> Result<T, E>
    where
        T: Send + 'static,
        E: From<DbError> + Send + 'static,
        F: for<'c> FnOnce(&'c mut Transaction<'_, Postgres>) -> BoxFuture<'c, Result<T, E>> + Send,
    {
        let mut tx = self
            .app_pool
            .begin()
            .await
            .map_err(|e| E::from(DbError::Connect(e)))?;
        sqlx::query("SET TRANSACTION READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(|e| E::from(DbError::Connect(e)))?;
        set_scope(&mut tx, user_id).await.map_err(E::from)?;

        match f(&mut tx).await {
            Ok(value) => {
                tx.commit().await.map_err(|e| E::from(DbError::Connect(e)))?;
                Ok(value)
            }
            Err(err) => {
                let _ = tx.rollback().await;
                Err(err)
            }
        }
    }
}

async fn set_scope(tx: &mut Transaction<'_, Postgres>, user_id: &UserId) -> Result<(), DbError> {
    // user_id is an opaque server-generated identifier, never raw user
    // input, but it is still interpolated into SQL text because `SET LOCAL`
    // does not accept bind parameters. Reject anything that is not a bare
    // identifier-safe string before it reaches the database.
    if user_id.as_str().is_empty()
        || !user_id
            .as_str()
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(DbError::InvalidUserScope(user_id.as_str().to_string()));
    }

    let stmt = format!("SET LOCAL app.current_user_id = '{}'", user_id.as_str());
    sqlx::query(&stmt)
        .execute(&mut **tx)
        .await
        .map_err(DbError::Connect)?;

    Ok(())
}

/// Grant `app_role` DML privileges on every table in `public`, run once
/// after migrations apply (§4.1). `GRANT ... TO %I` needs the role name as
/// an identifier, not a bind parameter, so it is validated the same way
/// [`set_scope`] validates `user_id` before interpolating it into SQL text.
async fn grant_app_role(pool: &PgPool, app_role: &str) -> Result<(), DbError> {
    if app_role.is_empty()
        || !app_role.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(DbError::InvalidAppRole(app_role.to_string()));
    }

    let stmt = format!("GRANT SELECT, INSERT, UPDATE, DELETE ON ALL TABLES IN SCHEMA public TO \"{app_role}\"");
    sqlx::query(&stmt)
        .execute(pool)
        .await
        .map_err(DbError::Connect)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_user_scope_shape() {
        let id = UserId::from("");
        assert!(id.as_str().is_empty());
    }

    #[test]
    fn accepts_opaque_id_shape() {
        let id = UserId::from("u_01HXYZ");
        assert!(id
            .as_str()
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn rejects_id_with_sql_metacharacters() {
        let id = UserId::from("u1'; DROP TABLE users; --");
        assert!(!id
            .as_str()
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }
}
