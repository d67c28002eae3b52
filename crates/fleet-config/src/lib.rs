// SPDX-License-Identifier: MIT OR Apache-2.0
//! Environment-variable configuration loading and validation for the fleet
//! intelligence backend (§6, §6.1, §4.8).
//!
//! This crate provides [`FleetConfig`] — the top-level runtime settings,
//! loaded exclusively from environment variables (no file format; the
//! backend is deployed as a twelve-factor service) — together with
//! [`validate_config`] for semantic checks that return advisory
//! [`ConfigWarning`]s alongside hard [`ConfigError`]s.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::env::VarError;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable was not set.
    #[error("missing required environment variable: {name}")]
    MissingRequired {
        /// Name of the missing variable.
        name: String,
    },

    /// An environment variable was set but could not be parsed into its
    /// expected type.
    #[error("invalid value for {name}: {reason}")]
    InvalidValue {
        /// Name of the offending variable.
        name: String,
        /// Human-readable parse failure detail.
        reason: String,
    },

    /// Semantic validation failed (one or more problems).
    #[error("config validation failed: {reasons:?}")]
    ValidationError {
        /// Individual validation failure messages.
        reasons: Vec<String>,
    },
}

// ---------------------------------------------------------------------------
// Warnings
// ---------------------------------------------------------------------------

/// Advisory-level issues that do not prevent startup but deserve attention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// SMTP is not fully configured; email delivery will be a no-op (logged,
    /// not fatal — §7 propagation policy: "email delivery failures: log,
    /// proceed").
    SmtpNotConfigured,
    /// `ADMIN_TOKEN` is unset; the bearer-admin-token auth path (§4.7) is
    /// disabled.
    AdminTokenNotConfigured,
    /// A pool size or TTL knob is unusually large.
    UnusuallyLarge {
        /// Name of the field.
        field: String,
        /// The configured value.
        value: u64,
    },
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigWarning::SmtpNotConfigured => {
                write!(f, "SMTP_* not fully configured; email delivery disabled")
            }
            ConfigWarning::AdminTokenNotConfigured => {
                write!(f, "ADMIN_TOKEN not set; bearer-admin-token auth path disabled")
            }
            ConfigWarning::UnusuallyLarge { field, value } => {
                write!(f, "'{field}' is unusually large ({value})")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Config types
// ---------------------------------------------------------------------------

/// SMTP delivery settings (§1 non-goal: delivery itself is a side
/// collaborator; this crate only carries the connection settings it needs).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct SmtpConfig {
    /// SMTP host.
    pub host: String,
    /// SMTP port.
    pub port: u16,
    /// SMTP username.
    pub user: String,
    /// SMTP password.
    pub pass: String,
    /// `From:` address used on outgoing mail.
    pub from: String,
}

/// Top-level runtime configuration for the fleet intelligence backend,
/// loaded entirely from environment variables (§6 "Environment variables").
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct FleetConfig {
    /// Postgres connection string for both pools (§4.1).
    pub database_url: String,
    /// Bearer token that synthesises a stable admiral identity (§4.7).
    /// Absent disables that auth path.
    pub admin_token: Option<String>,
    /// Legacy invite-tenant token that synthesises a stable, read-only
    /// `lieutenant` identity (§4.7 resolution order, step (c)). Absent
    /// disables that auth path.
    pub legacy_invite_token: Option<String>,
    /// SMTP settings; `None` if any of `SMTP_HOST`/`SMTP_PORT`/`SMTP_USER`/
    /// `SMTP_PASS`/`SMTP_FROM` is unset.
    pub smtp: Option<SmtpConfig>,
    /// Base URL used to construct links in outgoing email.
    pub base_url: String,
    /// `tracing` filter directive, e.g. `"info"`, `"fleet_server=debug"`.
    pub log_level: String,
    /// Whether to use `tracing-subscriber`'s pretty (human-readable) format
    /// instead of compact/JSON.
    pub log_pretty: bool,
    /// Postgres role name for the privileged admin pool (§4.1, §6.1).
    pub admin_role: String,
    /// Postgres role name for the unprivileged app pool (§4.1, §6.1).
    pub app_role: String,
    /// Per-pool connection ceiling (§6.1).
    pub db_max_connections: u32,
    /// Default proposal TTL in seconds (§6, §6.1).
    pub proposal_ttl_secs: u64,
}

impl Default for FleetConfig {
    /// Defaults matching the values `spec.md`/`SPEC_FULL.md` name explicitly;
    /// `database_url` has no sane default and must always come from the
    /// environment (enforced by [`load_config`], not by this impl, so tests
    /// can still construct a `FleetConfig` directly).
    fn default() -> Self {
        Self {
            database_url: String::new(),
            admin_token: None,
            legacy_invite_token: None,
            smtp: None,
            base_url: "http://localhost:3000".to_string(),
            log_level: "info".to_string(),
            log_pretty: false,
            admin_role: "fleet_admin".to_string(),
            app_role: "fleet_app".to_string(),
            db_max_connections: 10,
            proposal_ttl_secs: 900,
        }
    }
}

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Ceiling above which [`validate_config`] flags `db_max_connections` as
/// unusually large.
const LARGE_POOL_THRESHOLD: u32 = 200;
/// Ceiling above which [`validate_config`] flags `proposal_ttl_secs` as
/// unusually large.
const LARGE_TTL_THRESHOLD_SECS: u64 = 86_400;

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Read an environment variable, mapping "not present" to `None` and any
/// other error (not valid UTF-8) to [`ConfigError::InvalidValue`].
fn env_opt(name: &str) -> Result<Option<String>, ConfigError> {
    match std::env::var(name) {
        Ok(v) => Ok(Some(v)),
        Err(VarError::NotPresent) => Ok(None),
        Err(VarError::NotUnicode(_)) => Err(ConfigError::InvalidValue {
            name: name.to_string(),
            reason: "value is not valid UTF-8".to_string(),
        }),
    }
}

fn env_required(name: &str) -> Result<String, ConfigError> {
    env_opt(name)?.ok_or_else(|| ConfigError::MissingRequired {
        name: name.to_string(),
    })
}

fn env_parsed<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match env_opt(name)? {
        None => Ok(default),
        Some(v) => v.parse().map_err(|_| ConfigError::InvalidValue {
            name: name.to_string(),
            reason: format!("could not parse '{v}'"),
        }),
    }
}

fn env_bool(name: &str, default: bool) -> Result<bool, ConfigError> {
    match env_opt(name)? {
        None => Ok(default),
        Some(v) => match v.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => Err(ConfigError::InvalidValue {
                name: name.to_string(),
                reason: format!("'{other}' is not a recognised boolean"),
            }),
        },
    }
}

/// Load a [`FleetConfig`] from the process environment.
///
/// `DATABASE_URL` is the only strictly required variable; every other
/// variable falls back to a documented default. See `SPEC_FULL.md` §6.1 for
/// the full enumerated list.
pub fn load_config() -> Result<FleetConfig, ConfigError> {
    let database_url = env_required("DATABASE_URL")?;
    let admin_token = env_opt("ADMIN_TOKEN")?;
    let legacy_invite_token = env_opt("LEGACY_INVITE_TOKEN")?;

    let smtp_host = env_opt("SMTP_HOST")?;
    let smtp_port = env_opt("SMTP_PORT")?;
    let smtp_user = env_opt("SMTP_USER")?;
    let smtp_pass = env_opt("SMTP_PASS")?;
    let smtp_from = env_opt("SMTP_FROM")?;
    let smtp = match (smtp_host, smtp_port, smtp_user, smtp_pass, smtp_from) {
        (Some(host), Some(port), Some(user), Some(pass), Some(from)) => Some(SmtpConfig {
            host,
            port: port.parse().map_err(|_| ConfigError::InvalidValue {
                name: "SMTP_PORT".to_string(),
                reason: format!("'{port}' is not a valid port number"),
            })?,
            user,
            pass,
            from,
        }),
        _ => None,
    };

    let base_url = env_opt("BASE_URL")?.unwrap_or_else(|| "http://localhost:3000".to_string());
    let log_level = env_opt("LOG_LEVEL")?.unwrap_or_else(|| "info".to_string());
    let log_pretty = env_bool("LOG_PRETTY", false)?;
    let admin_role = env_opt("FLEET_ADMIN_ROLE")?.unwrap_or_else(|| "fleet_admin".to_string());
    let app_role = env_opt("FLEET_APP_ROLE")?.unwrap_or_else(|| "fleet_app".to_string());
    let db_max_connections = env_parsed("FLEET_DB_MAX_CONNECTIONS", 10u32)?;
    let proposal_ttl_secs = env_parsed("FLEET_PROPOSAL_TTL_SECS", 900u64)?;

    Ok(FleetConfig {
        database_url,
        admin_token,
        legacy_invite_token,
        smtp,
        base_url,
        log_level,
        log_pretty,
        admin_role,
        app_role,
        db_max_connections,
        proposal_ttl_secs,
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a loaded configuration, returning advisory warnings.
///
/// Hard errors (empty role names, `admin_role == app_role`, zero pool size)
/// come back as [`ConfigError::ValidationError`]; soft issues come back as
/// warnings the caller should log but may ignore.
pub fn validate_config(config: &FleetConfig) -> Result<Vec<ConfigWarning>, ConfigError> {
    let mut errors: Vec<String> = Vec::new();
    let mut warnings: Vec<ConfigWarning> = Vec::new();

    if config.database_url.trim().is_empty() {
        errors.push("database_url must not be empty".to_string());
    }
    if config.admin_role.trim().is_empty() {
        errors.push("admin_role must not be empty".to_string());
    }
    if config.app_role.trim().is_empty() {
        errors.push("app_role must not be empty".to_string());
    }
    if !config.admin_role.trim().is_empty()
        && !config.app_role.trim().is_empty()
        && config.admin_role == config.app_role
    {
        errors.push("admin_role and app_role must differ (§4.1: the app pool must not be privileged)".to_string());
    }
    if config.db_max_connections == 0 {
        errors.push("db_max_connections must be at least 1".to_string());
    }
    if config.proposal_ttl_secs == 0 {
        errors.push("proposal_ttl_secs must be at least 1".to_string());
    }

    if config.db_max_connections as u64 > LARGE_POOL_THRESHOLD as u64 {
        warnings.push(ConfigWarning::UnusuallyLarge {
            field: "db_max_connections".to_string(),
            value: config.db_max_connections as u64,
        });
    }
    if config.proposal_ttl_secs > LARGE_TTL_THRESHOLD_SECS {
        warnings.push(ConfigWarning::UnusuallyLarge {
            field: "proposal_ttl_secs".to_string(),
            value: config.proposal_ttl_secs,
        });
    }
    if config.smtp.is_none() {
        warnings.push(ConfigWarning::SmtpNotConfigured);
    }
    if config.admin_token.is_none() {
        warnings.push(ConfigWarning::AdminTokenNotConfigured);
    }

    if errors.is_empty() {
        Ok(warnings)
    } else {
        Err(ConfigError::ValidationError { reasons: errors })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variable mutation is process-global; serialise tests that
    // touch it so they don't race each other.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_all() {
        for name in [
            "DATABASE_URL",
            "ADMIN_TOKEN",
            "LEGACY_INVITE_TOKEN",
            "SMTP_HOST",
            "SMTP_PORT",
            "SMTP_USER",
            "SMTP_PASS",
            "SMTP_FROM",
            "BASE_URL",
            "LOG_LEVEL",
            "LOG_PRETTY",
            "FLEET_ADMIN_ROLE",
            "FLEET_APP_ROLE",
            "FLEET_DB_MAX_CONNECTIONS",
            "FLEET_PROPOSAL_TTL_SECS",
        ] {
            unsafe { std::env::remove_var(name) };
        }
    }

    #[test]
    fn default_config_fails_validation_on_empty_database_url() {
        let cfg = FleetConfig::default();
        let err = validate_config(&cfg).unwrap_err();
        match err {
            ConfigError::ValidationError { reasons } => {
                assert!(reasons.iter().any(|r| r.contains("database_url")));
            }
            other => panic!("expected ValidationError, got {other:?}"),
        }
    }

    #[test]
    fn valid_config_passes_with_warnings() {
        let cfg = FleetConfig {
            database_url: "postgres://localhost/fleet".to_string(),
            ..Default::default()
        };
        let warnings = validate_config(&cfg).unwrap();
        assert!(warnings.contains(&ConfigWarning::SmtpNotConfigured));
        assert!(warnings.contains(&ConfigWarning::AdminTokenNotConfigured));
    }

    #[test]
    fn validation_rejects_matching_roles() {
        let cfg = FleetConfig {
            database_url: "postgres://localhost/fleet".to_string(),
            admin_role: "same".to_string(),
            app_role: "same".to_string(),
            ..Default::default()
        };
        let err = validate_config(&cfg).unwrap_err();
        match err {
            ConfigError::ValidationError { reasons } => {
                assert!(reasons.iter().any(|r| r.contains("must differ")));
            }
            other => panic!("expected ValidationError, got {other:?}"),
        }
    }

    #[test]
    fn validation_rejects_zero_pool_size() {
        let cfg = FleetConfig {
            database_url: "postgres://localhost/fleet".to_string(),
            db_max_connections: 0,
            ..Default::default()
        };
        assert!(validate_config(&cfg).is_err());
    }

    #[test]
    fn unusually_large_pool_size_warns_not_errors() {
        let cfg = FleetConfig {
            database_url: "postgres://localhost/fleet".to_string(),
            db_max_connections: 500,
            ..Default::default()
        };
        let warnings = validate_config(&cfg).unwrap();
        assert!(warnings.iter().any(|w| matches!(
            w,
            ConfigWarning::UnusuallyLarge { field, .. } if field == "db_max_connections"
        )));
    }

    #[test]
    fn load_config_requires_database_url() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_all();
        let err = load_config().unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired { name } if name == "DATABASE_URL"));
    }

    #[test]
    fn load_config_applies_defaults() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_all();
        unsafe { std::env::set_var("DATABASE_URL", "postgres://localhost/fleet") };
        let cfg = load_config().unwrap();
        assert_eq!(cfg.admin_role, "fleet_admin");
        assert_eq!(cfg.app_role, "fleet_app");
        assert_eq!(cfg.db_max_connections, 10);
        assert_eq!(cfg.proposal_ttl_secs, 900);
        assert!(!cfg.log_pretty);
        clear_all();
    }

    #[test]
    fn load_config_reads_smtp_only_when_fully_set() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_all();
        unsafe {
            std::env::set_var("DATABASE_URL", "postgres://localhost/fleet");
            std::env::set_var("SMTP_HOST", "smtp.example.com");
            // SMTP_PORT deliberately left unset: smtp should remain None.
        }
        let cfg = load_config().unwrap();
        assert!(cfg.smtp.is_none());
        clear_all();
    }

    #[test]
    fn load_config_builds_smtp_when_all_five_set() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_all();
        unsafe {
            std::env::set_var("DATABASE_URL", "postgres://localhost/fleet");
            std::env::set_var("SMTP_HOST", "smtp.example.com");
            std::env::set_var("SMTP_PORT", "587");
            std::env::set_var("SMTP_USER", "bot");
            std::env::set_var("SMTP_PASS", "secret");
            std::env::set_var("SMTP_FROM", "bot@example.com");
        }
        let cfg = load_config().unwrap();
        let smtp = cfg.smtp.expect("smtp should be populated");
        assert_eq!(smtp.port, 587);
        assert_eq!(smtp.from, "bot@example.com");
        clear_all();
    }

    #[test]
    fn log_pretty_parses_common_boolean_spellings() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_all();
        unsafe {
            std::env::set_var("DATABASE_URL", "postgres://localhost/fleet");
            std::env::set_var("LOG_PRETTY", "true");
        }
        assert!(load_config().unwrap().log_pretty);
        clear_all();
    }

    #[test]
    fn log_pretty_rejects_unrecognised_value() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_all();
        unsafe {
            std::env::set_var("DATABASE_URL", "postgres://localhost/fleet");
            std::env::set_var("LOG_PRETTY", "maybe");
        }
        assert!(matches!(load_config(), Err(ConfigError::InvalidValue { .. })));
        clear_all();
    }

    #[test]
    fn config_error_display() {
        let e = ConfigError::MissingRequired {
            name: "DATABASE_URL".to_string(),
        };
        assert!(e.to_string().contains("DATABASE_URL"));
    }

    #[test]
    fn config_warning_display() {
        let w = ConfigWarning::UnusuallyLarge {
            field: "db_max_connections".to_string(),
            value: 999,
        };
        assert!(w.to_string().contains("999"));
    }
}
