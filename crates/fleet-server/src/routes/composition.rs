// SPDX-License-Identifier: MIT OR Apache-2.0
//! Composition read routes (§3, §4.5).
//!
//! Loadouts, bridge cores, below-deck policies, docks, plan items, and
//! targets are mutated exclusively through the proposal protocol (see
//! `routes::proposals::call_tool`); this module only ever reads.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Path, State},
    response::Response,
};
use fleet_core::{LoadoutId, Role, TargetId, TargetStatus};
use serde::Deserialize;

use crate::identity::{require_rank, CurrentIdentity};
use crate::middleware::RequestId;
use crate::response::{ok, ok_cacheable, respond};
use crate::state::AppState;

fn if_none_match(headers: &axum::http::HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

pub async fn list_loadouts(
    State(state): State<Arc<AppState>>,
    RequestId(request_id): RequestId,
    CurrentIdentity(identity): CurrentIdentity,
    headers: axum::http::HeaderMap,
) -> Response {
    let started = Instant::now();
    if let Err(resp) = require_rank(&identity, Role::Lieutenant, request_id.0, started) {
        return resp;
    }
    let composition = state.composition.for_user(identity.user_id.clone());
    match composition.list_loadouts().await {
        Ok(data) => ok_cacheable(request_id.0, started, if_none_match(&headers).as_deref(), data),
        Err(e) => crate::response::err(request_id.0, started, e.into(), None),
    }
}

pub async fn get_loadout(
    State(state): State<Arc<AppState>>,
    RequestId(request_id): RequestId,
    CurrentIdentity(identity): CurrentIdentity,
    Path(id): Path<String>,
) -> Response {
    let started = Instant::now();
    if let Err(resp) = require_rank(&identity, Role::Lieutenant, request_id.0, started) {
        return resp;
    }
    let composition = state.composition.for_user(identity.user_id.clone());
    respond_option(request_id.0, started, composition.get_loadout(&LoadoutId::from(id)).await)
}

#[derive(Debug, Deserialize)]
pub struct LoadoutVariantsQuery {
    pub base_loadout_id: String,
}

pub async fn list_loadout_variants(
    State(state): State<Arc<AppState>>,
    RequestId(request_id): RequestId,
    CurrentIdentity(identity): CurrentIdentity,
    axum::extract::Query(query): axum::extract::Query<LoadoutVariantsQuery>,
) -> Response {
    let started = Instant::now();
    if let Err(resp) = require_rank(&identity, Role::Lieutenant, request_id.0, started) {
        return resp;
    }
    let composition = state.composition.for_user(identity.user_id.clone());
    let result = composition.list_loadout_variants(&LoadoutId::from(query.base_loadout_id)).await;
    respond(request_id.0, started, result)
}

pub async fn get_loadout_variant(
    State(state): State<Arc<AppState>>,
    RequestId(request_id): RequestId,
    CurrentIdentity(identity): CurrentIdentity,
    Path(id): Path<String>,
) -> Response {
    let started = Instant::now();
    if let Err(resp) = require_rank(&identity, Role::Lieutenant, request_id.0, started) {
        return resp;
    }
    let composition = state.composition.for_user(identity.user_id.clone());
    respond_option(request_id.0, started, composition.get_loadout_variant(&LoadoutId::from(id)).await)
}

pub async fn list_bridge_cores(
    State(state): State<Arc<AppState>>,
    RequestId(request_id): RequestId,
    CurrentIdentity(identity): CurrentIdentity,
) -> Response {
    let started = Instant::now();
    if let Err(resp) = require_rank(&identity, Role::Lieutenant, request_id.0, started) {
        return resp;
    }
    let composition = state.composition.for_user(identity.user_id.clone());
    respond(request_id.0, started, composition.list_bridge_cores().await)
}

pub async fn get_bridge_core(
    State(state): State<Arc<AppState>>,
    RequestId(request_id): RequestId,
    CurrentIdentity(identity): CurrentIdentity,
    Path(id): Path<String>,
) -> Response {
    let started = Instant::now();
    if let Err(resp) = require_rank(&identity, Role::Lieutenant, request_id.0, started) {
        return resp;
    }
    let composition = state.composition.for_user(identity.user_id.clone());
    respond_option(request_id.0, started, composition.get_bridge_core(&LoadoutId::from(id)).await)
}

pub async fn list_below_deck_policies(
    State(state): State<Arc<AppState>>,
    RequestId(request_id): RequestId,
    CurrentIdentity(identity): CurrentIdentity,
) -> Response {
    let started = Instant::now();
    if let Err(resp) = require_rank(&identity, Role::Lieutenant, request_id.0, started) {
        return resp;
    }
    let composition = state.composition.for_user(identity.user_id.clone());
    respond(request_id.0, started, composition.list_below_deck_policies().await)
}

pub async fn get_below_deck_policy(
    State(state): State<Arc<AppState>>,
    RequestId(request_id): RequestId,
    CurrentIdentity(identity): CurrentIdentity,
    Path(id): Path<String>,
) -> Response {
    let started = Instant::now();
    if let Err(resp) = require_rank(&identity, Role::Lieutenant, request_id.0, started) {
        return resp;
    }
    let composition = state.composition.for_user(identity.user_id.clone());
    respond_option(request_id.0, started, composition.get_below_deck_policy(&LoadoutId::from(id)).await)
}

pub async fn list_docks(
    State(state): State<Arc<AppState>>,
    RequestId(request_id): RequestId,
    CurrentIdentity(identity): CurrentIdentity,
) -> Response {
    let started = Instant::now();
    if let Err(resp) = require_rank(&identity, Role::Lieutenant, request_id.0, started) {
        return resp;
    }
    let composition = state.composition.for_user(identity.user_id.clone());
    respond(request_id.0, started, composition.list_docks().await)
}

pub async fn list_plan_items(
    State(state): State<Arc<AppState>>,
    RequestId(request_id): RequestId,
    CurrentIdentity(identity): CurrentIdentity,
) -> Response {
    let started = Instant::now();
    if let Err(resp) = require_rank(&identity, Role::Lieutenant, request_id.0, started) {
        return resp;
    }
    let composition = state.composition.for_user(identity.user_id.clone());
    respond(request_id.0, started, composition.list_plan_items().await)
}

#[derive(Debug, Deserialize, Default)]
pub struct ListTargetsQuery {
    pub status: Option<String>,
}

pub async fn list_targets(
    State(state): State<Arc<AppState>>,
    RequestId(request_id): RequestId,
    CurrentIdentity(identity): CurrentIdentity,
    axum::extract::Query(query): axum::extract::Query<ListTargetsQuery>,
) -> Response {
    let started = Instant::now();
    if let Err(resp) = require_rank(&identity, Role::Lieutenant, request_id.0, started) {
        return resp;
    }
    let status = query.status.as_deref().and_then(target_status_from_str);
    let composition = state.composition.for_user(identity.user_id.clone());
    respond(request_id.0, started, composition.list_targets(status).await)
}

fn target_status_from_str(s: &str) -> Option<TargetStatus> {
    match s {
        "active" => Some(TargetStatus::Active),
        "achieved" => Some(TargetStatus::Achieved),
        "abandoned" => Some(TargetStatus::Abandoned),
        _ => None,
    }
}

pub async fn get_target(
    State(state): State<Arc<AppState>>,
    RequestId(request_id): RequestId,
    CurrentIdentity(identity): CurrentIdentity,
    Path(id): Path<String>,
) -> Response {
    let started = Instant::now();
    if let Err(resp) = require_rank(&identity, Role::Lieutenant, request_id.0, started) {
        return resp;
    }
    let composition = state.composition.for_user(identity.user_id.clone());
    respond_option(request_id.0, started, composition.get_target(&TargetId::from(id)).await)
}

fn respond_option<T: serde::Serialize>(
    request_id: uuid::Uuid,
    started: Instant,
    result: Result<Option<T>, fleet_composition::CompositionError>,
) -> Response {
    match result {
        Ok(Some(data)) => ok(request_id, started, data),
        Ok(None) => crate::response::err(
            request_id,
            started,
            fleet_error::FleetError::new(fleet_error::ErrorCode::NotFound, "resource not found"),
            None,
        ),
        Err(e) => crate::response::err(request_id, started, e.into(), None),
    }
}
