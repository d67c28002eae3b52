// SPDX-License-Identifier: MIT OR Apache-2.0
//! Envelope and ETag plumbing shared by every route handler (§6).
//!
//! Handlers never construct [`fleet_protocol::Envelope`] directly; they
//! call [`ok`]/[`ok_cacheable`]/[`err`] so the `meta.request_id` always
//! matches the `X-Request-Id` header the outer middleware stamped on the
//! same response, and so 5xx messages are downgraded exactly once, in one
//! place.

use std::time::Instant;

use axum::{
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use fleet_error::FleetError;
use fleet_protocol::{ApiErrorBody, Envelope, Meta};
use serde::Serialize;
use uuid::Uuid;

fn meta(request_id: Uuid, started: Instant) -> Meta {
    Meta {
        request_id: request_id.to_string(),
        timestamp: Utc::now(),
        duration_ms: started.elapsed().as_millis() as u64,
    }
}

/// Build a `200 OK` envelope response.
pub fn ok<T: Serialize>(request_id: Uuid, started: Instant, data: T) -> Response {
    let envelope = Envelope::Ok { ok: true, data, meta: meta(request_id, started) };
    (StatusCode::OK, Json(envelope)).into_response()
}

/// Build a `201 Created` envelope response.
pub fn created<T: Serialize>(request_id: Uuid, started: Instant, data: T) -> Response {
    let envelope = Envelope::Ok { ok: true, data, meta: meta(request_id, started) };
    (StatusCode::CREATED, Json(envelope)).into_response()
}

/// Build a `200 OK` envelope for a `GET`, honouring `If-None-Match` (§6):
/// a matching weak ETag short-circuits to `304 Not Modified` with no body.
pub fn ok_cacheable<T: Serialize>(
    request_id: Uuid,
    started: Instant,
    if_none_match: Option<&str>,
    data: T,
) -> Response {
    let tag = match fleet_protocol::etag(&data) {
        Ok(tag) => tag,
        Err(_) => return err(request_id, started, FleetError::new(fleet_error::ErrorCode::Internal, "failed to compute etag"), None),
    };

    if let Some(candidate) = if_none_match {
        if fleet_protocol::etag_matches(candidate, &tag) {
            let mut resp = Response::builder().status(StatusCode::NOT_MODIFIED).body(axum::body::Body::empty()).unwrap();
            if let Ok(value) = HeaderValue::from_str(&tag) {
                resp.headers_mut().insert(axum::http::header::ETAG, value);
            }
            return resp;
        }
    }

    let mut resp = (StatusCode::OK, Json(Envelope::Ok { ok: true, data, meta: meta(request_id, started) })).into_response();
    if let Ok(value) = HeaderValue::from_str(&tag) {
        resp.headers_mut().insert(axum::http::header::ETAG, value);
    }
    resp
}

/// Build an error envelope response, using `error.http_status()` (§7) and
/// attaching `detail` (e.g. `{expiresAt}` for an expired-proposal conflict).
pub fn err(request_id: Uuid, started: Instant, error: FleetError, detail: Option<serde_json::Value>) -> Response {
    let status = StatusCode::from_u16(error.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut body = ApiErrorBody::from(&error);
    body.detail = detail;
    let envelope: Envelope<()> = Envelope::Err { ok: false, error: body, meta: meta(request_id, started) };
    (status, Json(envelope)).into_response()
}

/// Project a store error into `detail`, carrying the conflict-specific
/// context `fleet-error` already attached (e.g. `expiresAt`) through to the
/// wire without duplicating per-store knowledge in every handler.
pub fn detail_of(error: &FleetError) -> Option<serde_json::Value> {
    if error.context.is_empty() {
        None
    } else {
        serde_json::to_value(&error.context).ok()
    }
}

/// Resolve a fallible store result into a `200`/error envelope in one call.
pub fn respond<T: Serialize, E: Into<FleetError>>(
    request_id: Uuid,
    started: Instant,
    result: Result<T, E>,
) -> Response {
    match result {
        Ok(data) => ok(request_id, started, data),
        Err(e) => {
            let fleet_err = e.into();
            let detail = detail_of(&fleet_err);
            err(request_id, started, fleet_err, detail)
        }
    }
}

/// Resolve a fallible store result into a `201`/error envelope in one call.
pub fn respond_created<T: Serialize, E: Into<FleetError>>(
    request_id: Uuid,
    started: Instant,
    result: Result<T, E>,
) -> Response {
    match result {
        Ok(data) => created(request_id, started, data),
        Err(e) => {
            let fleet_err = e.into();
            let detail = detail_of(&fleet_err);
            err(request_id, started, fleet_err, detail)
        }
    }
}
