// SPDX-License-Identifier: MIT OR Apache-2.0
//! Mutation proposal routes (§4.4, §4.5).

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Path, State},
    response::Response,
    Json,
};
use fleet_core::{ProposalId, ProposalStatus, Role};
use fleet_session::tools::ToolOutcome;
use serde::Deserialize;

use crate::identity::{require_rank, CurrentIdentity};
use crate::middleware::RequestId;
use crate::response::{ok, respond};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CallToolBody {
    pub tool: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

/// Route a tool call through the trust-tier gate: `block` rejects
/// outright, `approve` stages a proposal, `auto` applies and returns the
/// committed receipt (§4.5's tool runtime contract).
pub async fn call_tool(
    State(state): State<Arc<AppState>>,
    RequestId(request_id): RequestId,
    CurrentIdentity(identity): CurrentIdentity,
    Json(body): Json<CallToolBody>,
) -> Response {
    let started = Instant::now();
    if let Err(resp) = require_rank(&identity, Role::Lieutenant, request_id.0, started) {
        return resp;
    }
    let result = state.tools.call(&identity.user_id, &body.tool, body.args).await;
    match result {
        Ok(ToolOutcome::Applied { proposal, receipt }) => {
            ok(request_id.0, started, serde_json::json!({"status": "applied", "proposal": proposal, "receipt": receipt}))
        }
        Ok(ToolOutcome::Proposed { proposal_id, expires_at, preview }) => ok(
            request_id.0,
            started,
            serde_json::json!({
                "status": "proposed",
                "proposal_id": proposal_id.as_str(),
                "expires_at": expires_at,
                "preview": preview,
            }),
        ),
        Err(e) => {
            let fleet_err: fleet_error::FleetError = e.into();
            let detail = crate::response::detail_of(&fleet_err);
            crate::response::err(request_id.0, started, fleet_err, detail)
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListProposalsQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

pub async fn list_proposals(
    State(state): State<Arc<AppState>>,
    RequestId(request_id): RequestId,
    CurrentIdentity(identity): CurrentIdentity,
    axum::extract::Query(query): axum::extract::Query<ListProposalsQuery>,
) -> Response {
    let started = Instant::now();
    if let Err(resp) = require_rank(&identity, Role::Lieutenant, request_id.0, started) {
        return resp;
    }
    let status = query.status.as_deref().and_then(status_from_str);
    let limit = query.limit.unwrap_or(50);
    let user_proposals = state.proposals.for_user(identity.user_id.clone());
    let result = user_proposals.list(status, limit).await;
    respond(request_id.0, started, result)
}

fn status_from_str(s: &str) -> Option<ProposalStatus> {
    match s {
        "proposed" => Some(ProposalStatus::Proposed),
        "applied" => Some(ProposalStatus::Applied),
        "declined" => Some(ProposalStatus::Declined),
        "expired" => Some(ProposalStatus::Expired),
        _ => None,
    }
}

pub async fn get_proposal(
    State(state): State<Arc<AppState>>,
    RequestId(request_id): RequestId,
    CurrentIdentity(identity): CurrentIdentity,
    Path(id): Path<String>,
) -> Response {
    let started = Instant::now();
    if let Err(resp) = require_rank(&identity, Role::Lieutenant, request_id.0, started) {
        return resp;
    }
    let user_proposals = state.proposals.for_user(identity.user_id.clone());
    match user_proposals.get(&ProposalId::from(id)).await {
        Ok(Some(proposal)) => ok(request_id.0, started, proposal),
        Ok(None) => crate::response::err(
            request_id.0,
            started,
            fleet_error::FleetError::new(fleet_error::ErrorCode::NotFound, "proposal not found"),
            None,
        ),
        Err(e) => crate::response::err(request_id.0, started, e.into(), None),
    }
}

/// Confirm a `proposed` proposal: re-dispatch its tool from the stored
/// arguments and commit the mutation, receipt, and proposal transition
/// together (§4.4 `apply`).
pub async fn apply_proposal(
    State(state): State<Arc<AppState>>,
    RequestId(request_id): RequestId,
    CurrentIdentity(identity): CurrentIdentity,
    Path(id): Path<String>,
) -> Response {
    let started = Instant::now();
    if let Err(resp) = require_rank(&identity, Role::Admiral, request_id.0, started) {
        return resp;
    }
    let id = ProposalId::from(id);
    let user_proposals = state.proposals.for_user(identity.user_id.clone());
    let proposal = match user_proposals.get(&id).await {
        Ok(Some(p)) => p,
        Ok(None) => {
            return crate::response::err(
                request_id.0,
                started,
                fleet_error::FleetError::new(fleet_error::ErrorCode::NotFound, "proposal not found"),
                None,
            )
        }
        Err(e) => return crate::response::err(request_id.0, started, e.into(), None),
    };

    let result = state.tools.confirm(&identity.user_id, &proposal).await;
    match result {
        Ok(ToolOutcome::Applied { proposal, receipt }) => {
            ok(request_id.0, started, serde_json::json!({"proposal": proposal, "receipt": receipt}))
        }
        Ok(ToolOutcome::Proposed { .. }) => unreachable!("confirm never re-proposes"),
        Err(e) => {
            let fleet_err: fleet_error::FleetError = e.into();
            let detail = crate::response::detail_of(&fleet_err);
            crate::response::err(request_id.0, started, fleet_err, detail)
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct DeclineBody {
    pub reason: Option<String>,
}

pub async fn decline_proposal(
    State(state): State<Arc<AppState>>,
    RequestId(request_id): RequestId,
    CurrentIdentity(identity): CurrentIdentity,
    Path(id): Path<String>,
    body: Option<Json<DeclineBody>>,
) -> Response {
    let started = Instant::now();
    if let Err(resp) = require_rank(&identity, Role::Admiral, request_id.0, started) {
        return resp;
    }
    let reason = body.map(|Json(b)| b.reason).unwrap_or(None);
    let user_proposals = state.proposals.for_user(identity.user_id.clone());
    let result = user_proposals.decline(&ProposalId::from(id), reason).await;
    respond(request_id.0, started, result)
}
