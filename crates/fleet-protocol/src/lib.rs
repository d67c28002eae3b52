// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! The external response envelope, its error projection, and the weak ETag
//! helper (§6).
//!
//! Every boundary response is one of the two [`Envelope`] variants; ETags
//! are computed over `data` only (never `meta`) using the same sorted-key
//! canonical JSON convention `fleet-receipt` uses for hashing, per §9's
//! open-question resolution.

use chrono::{DateTime, Utc};
use fleet_error::{ErrorCode, FleetError, FleetErrorDto};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Per-response metadata common to both envelope variants.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Meta {
    /// Fresh opaque id, echoed in the `X-Request-Id` header.
    pub request_id: String,
    /// When the response was produced.
    pub timestamp: DateTime<Utc>,
    /// Wall-clock time spent handling the request.
    pub duration_ms: u64,
}

impl Meta {
    /// Build metadata for a request that began `duration_ms` milliseconds
    /// ago, minting a fresh request id.
    pub fn new(duration_ms: u64) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            duration_ms,
        }
    }
}

/// The error half of an [`Envelope`]: a stable code, a message (downgraded
/// to a generic string for 5xx responses, §7), optional detail, and
/// next-step hints.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ApiErrorBody {
    /// Machine-readable error code.
    pub code: ErrorCode,
    /// Human-readable message; the real message for non-5xx, a generic
    /// string for 5xx (the real one is logged server-side with `request_id`).
    pub message: String,
    /// Structured detail, e.g. `{expiresAt}` for an expired-proposal conflict.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
    /// User-facing next-step hints.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub hints: Vec<String>,
}

impl From<&FleetError> for ApiErrorBody {
    fn from(err: &FleetError) -> Self {
        Self {
            code: err.code,
            message: err.public_message(),
            detail: None,
            hints: err.hints.clone(),
        }
    }
}

impl From<&FleetErrorDto> for ApiErrorBody {
    fn from(dto: &FleetErrorDto) -> Self {
        Self {
            code: dto.code,
            message: dto.message.clone(),
            detail: None,
            hints: dto.hints.clone(),
        }
    }
}

/// Every boundary response is one of these two shapes (§6).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum Envelope<T> {
    /// A successful call.
    Ok {
        /// Always `true`.
        ok: bool,
        /// The response payload.
        data: T,
        /// Per-response metadata.
        meta: Meta,
    },
    /// A failed call.
    Err {
        /// Always `false`.
        ok: bool,
        /// The error projection.
        error: ApiErrorBody,
        /// Per-response metadata.
        meta: Meta,
    },
}

impl<T> Envelope<T> {
    /// Build a success envelope.
    pub fn ok(data: T, duration_ms: u64) -> Self {
        Envelope::Ok {
            ok: true,
            data,
            meta: Meta::new(duration_ms),
        }
    }

    /// True if this is the success variant.
    pub fn is_ok(&self) -> bool {
        matches!(self, Envelope::Ok { .. })
    }
}

impl Envelope<()> {
    /// Build an error envelope from a [`FleetError`], attaching `detail` when
    /// given (e.g. the `expiresAt` timestamp for an expired-proposal
    /// conflict, §7).
    pub fn err(error: &FleetError, detail: Option<serde_json::Value>, duration_ms: u64) -> Self {
        let mut body = ApiErrorBody::from(error);
        body.detail = detail;
        Envelope::Err {
            ok: false,
            error: body,
            meta: Meta::new(duration_ms),
        }
    }
}

/// Compute a weak ETag (`W/"<hex>"`) over `data` alone, using sorted-key
/// canonical JSON so independent implementations agree on the same hash for
/// the same logical payload (§6, §9 open question).
///
/// # Errors
///
/// Returns a `serde_json::Error` if `data` cannot be serialized.
pub fn etag<T: Serialize>(data: &T) -> Result<String, serde_json::Error> {
    let value = serde_json::to_value(data)?;
    let canonical = serde_json::to_string(&value)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(format!("W/\"{:x}\"", hasher.finalize()))
}

/// True if `if_none_match` contains an ETag matching `current`, meaning the
/// caller's cached copy is still fresh and a `304 Not Modified` should be
/// returned instead of the body (§6).
pub fn etag_matches(if_none_match: &str, current: &str) -> bool {
    if_none_match
        .split(',')
        .map(str::trim)
        .any(|candidate| candidate == current || candidate == "*")
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_error::ErrorCode;
    use serde_json::json;

    #[test]
    fn etag_is_deterministic_for_same_payload() {
        let a = etag(&json!({"b": 1, "a": 2})).unwrap();
        let b = etag(&json!({"a": 2, "b": 1})).unwrap();
        assert_eq!(a, b, "key order must not affect the hash");
    }

    #[test]
    fn etag_differs_for_different_payloads() {
        assert_ne!(etag(&json!({"a": 1})).unwrap(), etag(&json!({"a": 2})).unwrap());
    }

    #[test]
    fn etag_is_weak_quoted() {
        let tag = etag(&json!({"a": 1})).unwrap();
        assert!(tag.starts_with("W/\""));
        assert!(tag.ends_with('"'));
    }

    #[test]
    fn etag_matches_exact_and_wildcard() {
        let tag = etag(&json!({"a": 1})).unwrap();
        assert!(etag_matches(&tag, &tag));
        assert!(etag_matches("*", &tag));
        assert!(!etag_matches("W/\"other\"", &tag));
    }

    #[test]
    fn etag_matches_any_of_comma_separated_list() {
        let tag = etag(&json!({"a": 1})).unwrap();
        let list = format!("W/\"zzz\", {tag}");
        assert!(etag_matches(&list, &tag));
    }

    #[test]
    fn envelope_ok_round_trips_through_json() {
        let env = Envelope::ok(json!({"hello": "world"}), 5);
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["ok"], true);
        assert_eq!(json["data"]["hello"], "world");
        assert!(json["meta"]["requestId"].is_null(), "wire fields are snake_case");
        assert!(json["meta"]["request_id"].is_string());
    }

    #[test]
    fn envelope_err_carries_code_and_detail() {
        let err = FleetError::new(ErrorCode::Conflict, "proposal expired");
        let env = Envelope::<()>::err(&err, Some(json!({"expiresAt": "2026-01-01T00:00:00Z"})), 2);
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["ok"], false);
        assert_eq!(json["error"]["code"], "CONFLICT");
        assert_eq!(json["error"]["detail"]["expiresAt"], "2026-01-01T00:00:00Z");
    }

    #[test]
    fn server_error_downgrades_message() {
        let err = FleetError::new(ErrorCode::Internal, "leaking a table name here");
        let env = Envelope::<()>::err(&err, None, 1);
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["error"]["message"], "Internal server error");
    }
}
