//! Unified error taxonomy with stable error codes for the fleet intelligence
//! backend.
//!
//! Every error carries an [`ErrorCode`] (a machine-readable, stable string
//! tag), a human-readable message, an optional cause chain, and arbitrary
//! key-value context. Use the builder returned by [`FleetError::new`] to
//! construct errors fluently.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// ErrorCategory
// ---------------------------------------------------------------------------

/// Broad family that an [`ErrorCode`] belongs to, matching the taxonomy used
/// for HTTP status mapping and propagation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Malformed or oversized caller input.
    Input,
    /// Identity, verification, or role-rank failures.
    Auth,
    /// A substore has not finished initialising or failed to open.
    Availability,
    /// Conflicting state, including proposal-status mismatches and expiry.
    Conflict,
    /// A request exceeded its allotted time budget.
    Timeout,
    /// Rate limiting at the boundary (not enforced by this crate; see `fleet-server`).
    RateLimit,
    /// Catch-all for unexpected internal errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Input => "input",
            Self::Auth => "auth",
            Self::Availability => "availability",
            Self::Conflict => "conflict",
            Self::Timeout => "timeout",
            Self::RateLimit => "rate_limit",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// The substores that can independently fail to initialise, each surfaced as
/// its own `*_STORE_NOT_AVAILABLE` error code (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Store {
    /// Reference catalog + overlay store.
    Catalog,
    /// Import receipt store.
    Receipt,
    /// Mutation proposal store.
    Proposal,
    /// Auth / session store.
    Auth,
    /// Chat session registry.
    Session,
    /// Behavior rule store.
    Rule,
    /// Trust-tier policy override store.
    Policy,
    /// Composition store (loadouts, bridge cores, docks, plan items, targets).
    Composition,
}

impl Store {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Catalog => "CATALOG",
            Self::Receipt => "RECEIPT",
            Self::Proposal => "PROPOSAL",
            Self::Auth => "AUTH",
            Self::Session => "SESSION",
            Self::Rule => "RULE",
            Self::Policy => "POLICY",
            Self::Composition => "COMPOSITION",
        }
    }

    fn from_str(s: &str) -> Option<Self> {
        match s {
            "CATALOG" => Some(Self::Catalog),
            "RECEIPT" => Some(Self::Receipt),
            "PROPOSAL" => Some(Self::Proposal),
            "AUTH" => Some(Self::Auth),
            "SESSION" => Some(Self::Session),
            "RULE" => Some(Self::Rule),
            "POLICY" => Some(Self::Policy),
            "COMPOSITION" => Some(Self::Composition),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// ErrorCode
// ---------------------------------------------------------------------------

/// Machine-readable, stable error code (§6–§7).
///
/// Each variant serialises to a `SCREAMING_SNAKE_CASE` string that is
/// guaranteed not to change across patch releases. `StoreNotAvailable`
/// serialises to `"<STORE>_STORE_NOT_AVAILABLE"`, one code per substore, per
/// the enumerated set in §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// No identity could be resolved from the envelope.
    Unauthorized,
    /// Identity resolved but lacks permission for this operation.
    Forbidden,
    /// The account's email has not been verified.
    EmailNotVerified,
    /// The account is locked (`lockedAt` set).
    AccountLocked,
    /// The caller's role is below the minimum rank required.
    InsufficientRank,
    /// Caller exceeded a configured rate limit (boundary concern; see `fleet-server`).
    RateLimited,
    /// A required parameter was absent.
    MissingParam,
    /// A parameter was present but failed validation.
    InvalidParam,
    /// The requested resource does not exist, or exists but is owned by a different user.
    NotFound,
    /// State conflict: proposal status mismatch, expiry, duplicate, etc.
    Conflict,
    /// Request body exceeded the configured size bound.
    PayloadTooLarge,
    /// The operation exceeded its time budget.
    RequestTimeout,
    /// A substore has not finished initialising or failed to open.
    StoreNotAvailable(Store),
    /// Catch-all for unexpected internal errors.
    Internal,
}

impl Serialize for ErrorCode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.as_str())
    }
}

impl<'de> Deserialize<'de> for ErrorCode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ErrorCode::from_str(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown error code: {s}")))
    }
}

impl ErrorCode {
    /// Returns the broad [`ErrorCategory`] this code belongs to.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Unauthorized
            | Self::Forbidden
            | Self::EmailNotVerified
            | Self::AccountLocked
            | Self::InsufficientRank => ErrorCategory::Auth,

            Self::RateLimited => ErrorCategory::RateLimit,

            Self::MissingParam | Self::InvalidParam | Self::PayloadTooLarge => {
                ErrorCategory::Input
            }

            Self::NotFound | Self::Conflict => ErrorCategory::Conflict,

            Self::RequestTimeout => ErrorCategory::Timeout,

            Self::StoreNotAvailable(_) => ErrorCategory::Availability,

            Self::Internal => ErrorCategory::Internal,
        }
    }

    /// Stable `String` representation of the code (e.g. `"INSUFFICIENT_RANK"`
    /// or `"CATALOG_STORE_NOT_AVAILABLE"`).
    pub fn as_str(&self) -> String {
        match self {
            Self::Unauthorized => "UNAUTHORIZED".to_string(),
            Self::Forbidden => "FORBIDDEN".to_string(),
            Self::EmailNotVerified => "EMAIL_NOT_VERIFIED".to_string(),
            Self::AccountLocked => "ACCOUNT_LOCKED".to_string(),
            Self::InsufficientRank => "INSUFFICIENT_RANK".to_string(),
            Self::RateLimited => "RATE_LIMITED".to_string(),
            Self::MissingParam => "MISSING_PARAM".to_string(),
            Self::InvalidParam => "INVALID_PARAM".to_string(),
            Self::NotFound => "NOT_FOUND".to_string(),
            Self::Conflict => "CONFLICT".to_string(),
            Self::PayloadTooLarge => "PAYLOAD_TOO_LARGE".to_string(),
            Self::RequestTimeout => "REQUEST_TIMEOUT".to_string(),
            Self::StoreNotAvailable(store) => format!("{}_STORE_NOT_AVAILABLE", store.as_str()),
            Self::Internal => "INTERNAL_ERROR".to_string(),
        }
    }

    fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "UNAUTHORIZED" => Self::Unauthorized,
            "FORBIDDEN" => Self::Forbidden,
            "EMAIL_NOT_VERIFIED" => Self::EmailNotVerified,
            "ACCOUNT_LOCKED" => Self::AccountLocked,
            "INSUFFICIENT_RANK" => Self::InsufficientRank,
            "RATE_LIMITED" => Self::RateLimited,
            "MISSING_PARAM" => Self::MissingParam,
            "INVALID_PARAM" => Self::InvalidParam,
            "NOT_FOUND" => Self::NotFound,
            "CONFLICT" => Self::Conflict,
            "PAYLOAD_TOO_LARGE" => Self::PayloadTooLarge,
            "REQUEST_TIMEOUT" => Self::RequestTimeout,
            "INTERNAL_ERROR" => Self::Internal,
            other => {
                let store_name = other.strip_suffix("_STORE_NOT_AVAILABLE")?;
                Self::StoreNotAvailable(Store::from_str(store_name)?)
            }
        })
    }

    /// HTTP status code this error maps to at the envelope boundary (§7).
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Unauthorized => 401,
            Self::Forbidden | Self::EmailNotVerified | Self::AccountLocked | Self::InsufficientRank => 403,
            Self::RateLimited => 429,
            Self::MissingParam | Self::InvalidParam => 400,
            Self::PayloadTooLarge => 413,
            Self::NotFound => 404,
            Self::Conflict => 409,
            Self::RequestTimeout => 504,
            Self::StoreNotAvailable(_) => 503,
            Self::Internal => 500,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str())
    }
}

impl JsonSchema for ErrorCode {
    fn schema_name() -> std::borrow::Cow<'static, str> {
        "ErrorCode".into()
    }

    fn json_schema(_generator: &mut schemars::SchemaGenerator) -> schemars::Schema {
        // Hand-rolled Serialize/Deserialize means the derive can't see the
        // variant set; publish it as an opaque string rather than enumerate
        // every `StoreNotAvailable(Store)` combination by hand.
        schemars::json_schema!({ "type": "string" })
    }
}

// ---------------------------------------------------------------------------
// FleetError
// ---------------------------------------------------------------------------

/// Unified error type for the fleet intelligence backend.
///
/// Carries a stable [`ErrorCode`], a human-readable message, an optional
/// source error for cause-chaining, and arbitrary structured context.
///
/// # Builder usage
///
/// ```
/// use fleet_error::{FleetError, ErrorCode};
///
/// let err = FleetError::new(ErrorCode::RequestTimeout, "import apply timed out")
///     .with_context("tool", "import_apply")
///     .with_context("timeout_ms", 600_000);
/// ```
pub struct FleetError {
    /// Machine-readable error code.
    pub code: ErrorCode,
    /// Human-readable description.
    pub message: String,
    /// Optional underlying cause.
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
    /// Arbitrary structured context for diagnostics.
    pub context: BTreeMap<String, serde_json::Value>,
    /// User-facing next-step hints (auth/input errors carry these; §7).
    pub hints: Vec<String>,
}

impl FleetError {
    /// Create a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
            context: BTreeMap::new(),
            hints: Vec::new(),
        }
    }

    /// Attach a key-value pair to the diagnostic context.
    ///
    /// The value is converted via [`serde_json::to_value`]; if serialisation
    /// fails, the entry is silently skipped.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    /// Attach an underlying cause.
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Attach a user-facing hint.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hints.push(hint.into());
        self
    }

    /// Shorthand for `self.code.category()`.
    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }

    /// Shorthand for `self.code.http_status()`.
    pub fn http_status(&self) -> u16 {
        self.code.http_status()
    }

    /// The message a 5xx response should actually show the caller: a generic
    /// string, with the real message only ever logged server-side (§6, §7).
    pub fn public_message(&self) -> String {
        if self.http_status() >= 500 {
            "Internal server error".to_string()
        } else {
            self.message.clone()
        }
    }
}

impl fmt::Debug for FleetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("FleetError");
        d.field("code", &self.code);
        d.field("message", &self.message);
        if let Some(ref src) = self.source {
            d.field("source", &src.to_string());
        }
        if !self.context.is_empty() {
            d.field("context", &self.context);
        }
        if !self.hints.is_empty() {
            d.field("hints", &self.hints);
        }
        d.finish()
    }
}

impl fmt::Display for FleetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)?;
        if !self.context.is_empty() {
            // Deterministic output thanks to BTreeMap.
            if let Ok(ctx) = serde_json::to_string(&self.context) {
                write!(f, " {ctx}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for FleetError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

// ---------------------------------------------------------------------------
// Serialization support
// ---------------------------------------------------------------------------

/// Serialisable snapshot of a [`FleetError`] (without the opaque source).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FleetErrorDto {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message (already downgraded to a generic string for 5xx).
    pub message: String,
    /// Structured context.
    pub context: BTreeMap<String, serde_json::Value>,
    /// User-facing next-step hints.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub hints: Vec<String>,
    /// String representation of the source error, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_message: Option<String>,
}

impl From<&FleetError> for FleetErrorDto {
    fn from(err: &FleetError) -> Self {
        Self {
            code: err.code,
            message: err.public_message(),
            context: err.context.clone(),
            hints: err.hints.clone(),
            source_message: err.source.as_ref().map(|s| s.to_string()),
        }
    }
}

impl From<FleetErrorDto> for FleetError {
    fn from(dto: FleetErrorDto) -> Self {
        Self {
            code: dto.code,
            message: dto.message,
            source: None,
            context: dto.context,
            hints: dto.hints,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::io;

    const ALL_CODES: &[ErrorCode] = &[
        ErrorCode::Unauthorized,
        ErrorCode::Forbidden,
        ErrorCode::EmailNotVerified,
        ErrorCode::AccountLocked,
        ErrorCode::InsufficientRank,
        ErrorCode::RateLimited,
        ErrorCode::MissingParam,
        ErrorCode::InvalidParam,
        ErrorCode::NotFound,
        ErrorCode::Conflict,
        ErrorCode::PayloadTooLarge,
        ErrorCode::RequestTimeout,
        ErrorCode::StoreNotAvailable(Store::Catalog),
        ErrorCode::StoreNotAvailable(Store::Receipt),
        ErrorCode::StoreNotAvailable(Store::Proposal),
        ErrorCode::StoreNotAvailable(Store::Auth),
        ErrorCode::StoreNotAvailable(Store::Session),
        ErrorCode::StoreNotAvailable(Store::Rule),
        ErrorCode::Internal,
    ];

    #[test]
    fn basic_construction() {
        let err = FleetError::new(ErrorCode::Internal, "boom");
        assert_eq!(err.code, ErrorCode::Internal);
        assert_eq!(err.message, "boom");
        assert!(err.source.is_none());
        assert!(err.context.is_empty());
    }

    #[test]
    fn display_without_context() {
        let err = FleetError::new(ErrorCode::NotFound, "no such loadout");
        assert_eq!(err.to_string(), "[NOT_FOUND] no such loadout");
    }

    #[test]
    fn display_with_context() {
        let err = FleetError::new(ErrorCode::RequestTimeout, "timed out")
            .with_context("timeout_ms", 5000);
        let s = err.to_string();
        assert!(s.starts_with("[REQUEST_TIMEOUT] timed out"));
        assert!(s.contains("timeout_ms"));
        assert!(s.contains("5000"));
    }

    #[test]
    fn debug_impl() {
        let err = FleetError::new(ErrorCode::Forbidden, "nope");
        let dbg = format!("{err:?}");
        assert!(dbg.contains("Forbidden"));
        assert!(dbg.contains("nope"));
    }

    #[test]
    fn debug_with_source() {
        let src = io::Error::new(io::ErrorKind::NotFound, "file missing");
        let err = FleetError::new(ErrorCode::Internal, "init failed").with_source(src);
        let dbg = format!("{err:?}");
        assert!(dbg.contains("source"));
        assert!(dbg.contains("file missing"));
    }

    #[test]
    fn auth_codes_categorised() {
        assert_eq!(ErrorCode::Unauthorized.category(), ErrorCategory::Auth);
        assert_eq!(ErrorCode::Forbidden.category(), ErrorCategory::Auth);
        assert_eq!(ErrorCode::EmailNotVerified.category(), ErrorCategory::Auth);
        assert_eq!(ErrorCode::AccountLocked.category(), ErrorCategory::Auth);
        assert_eq!(ErrorCode::InsufficientRank.category(), ErrorCategory::Auth);
    }

    #[test]
    fn input_codes_categorised() {
        assert_eq!(ErrorCode::MissingParam.category(), ErrorCategory::Input);
        assert_eq!(ErrorCode::InvalidParam.category(), ErrorCategory::Input);
        assert_eq!(ErrorCode::PayloadTooLarge.category(), ErrorCategory::Input);
    }

    #[test]
    fn conflict_codes_categorised() {
        assert_eq!(ErrorCode::NotFound.category(), ErrorCategory::Conflict);
        assert_eq!(ErrorCode::Conflict.category(), ErrorCategory::Conflict);
    }

    #[test]
    fn availability_code_categorised() {
        assert_eq!(
            ErrorCode::StoreNotAvailable(Store::Proposal).category(),
            ErrorCategory::Availability
        );
    }

    #[test]
    fn store_not_available_as_str() {
        assert_eq!(
            ErrorCode::StoreNotAvailable(Store::Catalog).as_str(),
            "CATALOG_STORE_NOT_AVAILABLE"
        );
        assert_eq!(
            ErrorCode::StoreNotAvailable(Store::Session).as_str(),
            "SESSION_STORE_NOT_AVAILABLE"
        );
    }

    #[test]
    fn http_status_mapping() {
        assert_eq!(ErrorCode::Unauthorized.http_status(), 401);
        assert_eq!(ErrorCode::Forbidden.http_status(), 403);
        assert_eq!(ErrorCode::MissingParam.http_status(), 400);
        assert_eq!(ErrorCode::PayloadTooLarge.http_status(), 413);
        assert_eq!(ErrorCode::NotFound.http_status(), 404);
        assert_eq!(ErrorCode::Conflict.http_status(), 409);
        assert_eq!(ErrorCode::RequestTimeout.http_status(), 504);
        assert_eq!(
            ErrorCode::StoreNotAvailable(Store::Catalog).http_status(),
            503
        );
        assert_eq!(ErrorCode::Internal.http_status(), 500);
    }

    #[test]
    fn internal_errors_get_generic_public_message() {
        let err = FleetError::new(ErrorCode::Internal, "duplicate key violates constraint xyz");
        assert_eq!(err.public_message(), "Internal server error");
    }

    #[test]
    fn non_5xx_errors_keep_their_message() {
        let err = FleetError::new(ErrorCode::InvalidParam, "shipRefId is required");
        assert_eq!(err.public_message(), "shipRefId is required");
    }

    #[test]
    fn builder_with_context_multiple_keys() {
        let err = FleetError::new(ErrorCode::RequestTimeout, "timeout")
            .with_context("tool", "import_apply")
            .with_context("timeout_ms", 600_000)
            .with_hint("break the request into smaller imports");
        assert_eq!(err.context.len(), 2);
        assert_eq!(err.hints.len(), 1);
    }

    #[test]
    fn builder_with_source() {
        let src = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let err = FleetError::new(ErrorCode::Forbidden, "denied").with_source(src);
        assert!(err.source.is_some());
        let displayed = err.source.as_ref().unwrap().to_string();
        assert_eq!(displayed, "access denied");
    }

    #[test]
    fn category_shorthand() {
        let err = FleetError::new(ErrorCode::AccountLocked, "locked");
        assert_eq!(err.category(), ErrorCategory::Auth);
    }

    #[test]
    fn error_code_serde_roundtrip() {
        let code = ErrorCode::InsufficientRank;
        let json = serde_json::to_string(&code).unwrap();
        assert_eq!(json, r#""INSUFFICIENT_RANK""#);
        let back: ErrorCode = serde_json::from_str(&json).unwrap();
        assert_eq!(back, code);
    }

    #[test]
    fn error_category_serde_roundtrip() {
        let cat = ErrorCategory::Auth;
        let json = serde_json::to_string(&cat).unwrap();
        assert_eq!(json, r#""auth""#);
        let back: ErrorCategory = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cat);
    }

    #[test]
    fn dto_roundtrip_without_source() {
        let err = FleetError::new(ErrorCode::InvalidParam, "bad refId")
            .with_context("field", "refId");
        let dto: FleetErrorDto = (&err).into();
        let json = serde_json::to_string(&dto).unwrap();
        let back: FleetErrorDto = serde_json::from_str(&json).unwrap();
        assert_eq!(dto, back);
        assert!(back.source_message.is_none());
    }

    #[test]
    fn dto_downgrades_internal_message() {
        let err = FleetError::new(ErrorCode::Internal, "pq: constraint violation on users_pkey");
        let dto: FleetErrorDto = (&err).into();
        assert_eq!(dto.message, "Internal server error");
    }

    #[test]
    fn dto_to_fleet_error() {
        let dto = FleetErrorDto {
            code: ErrorCode::Conflict,
            message: "bad".into(),
            context: BTreeMap::new(),
            hints: Vec::new(),
            source_message: Some("inner".into()),
        };
        let err: FleetError = dto.into();
        assert_eq!(err.code, ErrorCode::Conflict);
        // Source is lost in DTO -> FleetError conversion (opaque type).
        assert!(err.source.is_none());
    }

    #[test]
    fn std_error_source_chain() {
        let inner = io::Error::new(io::ErrorKind::NotFound, "not found");
        let err = FleetError::new(ErrorCode::Internal, "staging").with_source(inner);
        let src = std::error::Error::source(&err).unwrap();
        assert_eq!(src.to_string(), "not found");
    }

    #[test]
    fn std_error_source_none_by_default() {
        let err = FleetError::new(ErrorCode::Internal, "oops");
        assert!(std::error::Error::source(&err).is_none());
    }

    #[test]
    fn all_codes_have_unique_as_str() {
        let mut seen = HashSet::new();
        for code in ALL_CODES {
            let s = code.as_str();
            assert!(seen.insert(s.clone()), "duplicate as_str value: {s}");
        }
        assert_eq!(seen.len(), ALL_CODES.len());
    }

    #[test]
    fn all_codes_display_matches_as_str() {
        for code in ALL_CODES {
            assert_eq!(code.to_string(), code.as_str());
        }
    }
}
