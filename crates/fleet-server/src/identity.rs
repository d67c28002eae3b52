// SPDX-License-Identifier: MIT OR Apache-2.0
//! Extract a [`fleet_auth::Identity`] from request headers/cookies (§4.7).

use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, State},
    http::request::Parts,
};
use fleet_auth::{Identity, InboundEnvelope};
use fleet_core::Role;

use crate::response::{err, respond};
use crate::state::AppState;

/// The resolved caller, available to any handler that takes it as an
/// extractor argument. Resolution follows §4.7's three-path order.
pub struct CurrentIdentity(pub Identity);

/// Session cookie name a signed-in browser presents (§8 scenario 1).
pub const SESSION_COOKIE: &str = "majel_session";

pub fn cookie_value<'a>(cookie_header: &'a str, name: &str) -> Option<&'a str> {
    cookie_header.split(';').find_map(|part| {
        let part = part.trim();
        let (k, v) = part.split_once('=')?;
        (k == name).then_some(v)
    })
}

/// Build the [`InboundEnvelope`] this request presents, from the
/// `Authorization: Bearer`, `Cookie: majel_session=`, and
/// `X-Legacy-Invite-Token` headers (§4.7).
pub fn inbound_envelope(parts: &Parts) -> InboundEnvelope {
    let bearer_token = parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string);

    let session_token = parts
        .headers
        .get(axum::http::header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|cookie| cookie_value(cookie, SESSION_COOKIE))
        .map(str::to_string)
        .or_else(|| {
            parts
                .headers
                .get("x-session-token")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        });

    let legacy_invite_token = parts
        .headers
        .get("x-legacy-invite-token")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    InboundEnvelope { bearer_token, session_token, legacy_invite_token }
}

impl FromRequestParts<Arc<AppState>> for CurrentIdentity {
    type Rejection = axum::response::Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let request_id = parts
            .extensions
            .get::<crate::middleware::RequestId>()
            .map(|r| r.0)
            .unwrap_or_else(uuid::Uuid::new_v4);
        let started = std::time::Instant::now();

        let State(state) = State::<Arc<AppState>>::from_request_parts(parts, state)
            .await
            .expect("AppState is always extractable");

        let envelope = inbound_envelope(parts);
        match state.auth.resolve_identity(&envelope, &state.config).await {
            Ok(identity) => Ok(CurrentIdentity(identity)),
            Err(e) => {
                let fleet_err: fleet_error::FleetError = e.into();
                Err(err(request_id, started, fleet_err, None))
            }
        }
    }
}

/// Assert `identity` satisfies `minimum`, converting a failure into the
/// uniform error envelope (§4.7's rank/lock/verification gates).
pub fn require_rank(
    identity: &Identity,
    minimum: Role,
    request_id: uuid::Uuid,
    started: std::time::Instant,
) -> Result<(), axum::response::Response> {
    identity
        .require_rank(minimum)
        .map_err(|e| respond::<(), fleet_auth::AuthError>(request_id, started, Err(e)))
}
