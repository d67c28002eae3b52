// SPDX-License-Identifier: MIT OR Apache-2.0
//! Chat turn route (§4.5).

use std::sync::Arc;
use std::time::Instant;

use axum::{extract::State, response::Response, Json};
use fleet_core::Role;
use fleet_session::cancel::CancellationToken;
use serde::Deserialize;

use crate::identity::{require_rank, CurrentIdentity};
use crate::middleware::RequestId;
use crate::response::respond;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatBody {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Run one turn of the per-session chat protocol (§4.5): record the
/// message, send it through the installed backend (with validation if a
/// [`fleet_session::validate::MicroRunner`] is configured), and append the
/// response to bounded history.
pub async fn chat(
    State(state): State<Arc<AppState>>,
    RequestId(request_id): RequestId,
    CurrentIdentity(identity): CurrentIdentity,
    Json(body): Json<ChatBody>,
) -> Response {
    let started = Instant::now();
    if let Err(resp) = require_rank(&identity, Role::Lieutenant, request_id.0, started) {
        return resp;
    }

    let cancel = CancellationToken::new();
    let result = state
        .orchestrator
        .run_turn(identity.user_id.clone(), body.session_id, body.message, &cancel)
        .await
        .map(|outcome| {
            serde_json::json!({
                "session_id": outcome.session_id,
                "response": outcome.response,
                "validated": outcome.validation.is_some(),
            })
        });
    respond(request_id.0, started, result)
}
