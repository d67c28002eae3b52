// SPDX-License-Identifier: MIT OR Apache-2.0
//! Reference catalog and per-user overlay routes (§4.2).

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Path, State},
    response::Response,
    Json,
};
use fleet_core::{OfficerOverlayPatch, RefId, Role, ShipOverlayPatch};
use serde::Deserialize;

use crate::identity::{require_rank, CurrentIdentity};
use crate::middleware::RequestId;
use crate::response::{ok_cacheable, respond};
use crate::state::AppState;

fn if_none_match(headers: &axum::http::HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

pub async fn list_officers(
    State(state): State<Arc<AppState>>,
    RequestId(request_id): RequestId,
    CurrentIdentity(identity): CurrentIdentity,
    headers: axum::http::HeaderMap,
) -> Response {
    let started = Instant::now();
    if let Err(resp) = require_rank(&identity, Role::Lieutenant, request_id.0, started) {
        return resp;
    }
    let user_catalog = state.catalog.for_user(identity.user_id.clone());
    match user_catalog.list_merged_officers(&state.catalog).await {
        Ok(data) => ok_cacheable(request_id.0, started, if_none_match(&headers).as_deref(), data),
        Err(e) => crate::response::err(request_id.0, started, e.into(), None),
    }
}

pub async fn get_officer(
    State(state): State<Arc<AppState>>,
    RequestId(request_id): RequestId,
    CurrentIdentity(identity): CurrentIdentity,
    Path(ref_id): Path<String>,
    headers: axum::http::HeaderMap,
) -> Response {
    let started = Instant::now();
    if let Err(resp) = require_rank(&identity, Role::Lieutenant, request_id.0, started) {
        return resp;
    }
    let user_catalog = state.catalog.for_user(identity.user_id.clone());
    match user_catalog.get_merged_officer(&state.catalog, &RefId::from(ref_id)).await {
        Ok(data) => ok_cacheable(request_id.0, started, if_none_match(&headers).as_deref(), data),
        Err(e) => crate::response::err(request_id.0, started, e.into(), None),
    }
}

pub async fn set_officer_overlay(
    State(state): State<Arc<AppState>>,
    RequestId(request_id): RequestId,
    CurrentIdentity(identity): CurrentIdentity,
    Path(ref_id): Path<String>,
    Json(patch): Json<OfficerOverlayPatch>,
) -> Response {
    let started = Instant::now();
    if let Err(resp) = require_rank(&identity, Role::Lieutenant, request_id.0, started) {
        return resp;
    }
    let user_catalog = state.catalog.for_user(identity.user_id.clone());
    let result = user_catalog.set_officer_overlay(&RefId::from(ref_id), patch).await;
    respond(request_id.0, started, result)
}

pub async fn reset_officer_overlay(
    State(state): State<Arc<AppState>>,
    RequestId(request_id): RequestId,
    CurrentIdentity(identity): CurrentIdentity,
    Path(ref_id): Path<String>,
) -> Response {
    let started = Instant::now();
    if let Err(resp) = require_rank(&identity, Role::Lieutenant, request_id.0, started) {
        return resp;
    }
    let ref_id = RefId::from(ref_id);
    let user_catalog = state.catalog.for_user(identity.user_id.clone());
    let default = fleet_core::OfficerOverlay::default_for(ref_id.clone());
    let result = user_catalog.restore_officer_overlay(&default).await.map(|_| default);
    respond(request_id.0, started, result)
}

pub async fn list_ships(
    State(state): State<Arc<AppState>>,
    RequestId(request_id): RequestId,
    CurrentIdentity(identity): CurrentIdentity,
    headers: axum::http::HeaderMap,
) -> Response {
    let started = Instant::now();
    if let Err(resp) = require_rank(&identity, Role::Lieutenant, request_id.0, started) {
        return resp;
    }
    let user_catalog = state.catalog.for_user(identity.user_id.clone());
    match user_catalog.list_merged_ships(&state.catalog).await {
        Ok(data) => ok_cacheable(request_id.0, started, if_none_match(&headers).as_deref(), data),
        Err(e) => crate::response::err(request_id.0, started, e.into(), None),
    }
}

pub async fn get_ship(
    State(state): State<Arc<AppState>>,
    RequestId(request_id): RequestId,
    CurrentIdentity(identity): CurrentIdentity,
    Path(ref_id): Path<String>,
    headers: axum::http::HeaderMap,
) -> Response {
    let started = Instant::now();
    if let Err(resp) = require_rank(&identity, Role::Lieutenant, request_id.0, started) {
        return resp;
    }
    let user_catalog = state.catalog.for_user(identity.user_id.clone());
    match user_catalog.get_merged_ship(&state.catalog, &RefId::from(ref_id)).await {
        Ok(data) => ok_cacheable(request_id.0, started, if_none_match(&headers).as_deref(), data),
        Err(e) => crate::response::err(request_id.0, started, e.into(), None),
    }
}

pub async fn set_ship_overlay(
    State(state): State<Arc<AppState>>,
    RequestId(request_id): RequestId,
    CurrentIdentity(identity): CurrentIdentity,
    Path(ref_id): Path<String>,
    Json(patch): Json<ShipOverlayPatch>,
) -> Response {
    let started = Instant::now();
    if let Err(resp) = require_rank(&identity, Role::Lieutenant, request_id.0, started) {
        return resp;
    }
    let user_catalog = state.catalog.for_user(identity.user_id.clone());
    let result = user_catalog.set_ship_overlay(&RefId::from(ref_id), patch).await;
    respond(request_id.0, started, result)
}

pub async fn reset_ship_overlay(
    State(state): State<Arc<AppState>>,
    RequestId(request_id): RequestId,
    CurrentIdentity(identity): CurrentIdentity,
    Path(ref_id): Path<String>,
) -> Response {
    let started = Instant::now();
    if let Err(resp) = require_rank(&identity, Role::Lieutenant, request_id.0, started) {
        return resp;
    }
    let ref_id = RefId::from(ref_id);
    let user_catalog = state.catalog.for_user(identity.user_id.clone());
    let default = fleet_core::ShipOverlay::default_for(ref_id.clone());
    let result = user_catalog.restore_ship_overlay(&default).await.map(|_| default);
    respond(request_id.0, started, result)
}

#[derive(Debug, Deserialize)]
pub struct BulkOfficerOverlayBody {
    pub ref_ids: Vec<String>,
    pub patch: OfficerOverlayPatch,
}

/// A wider-reach sibling of [`set_officer_overlay`] (§4.2 bulk overlay),
/// used by import-adjacent workflows that need to set one field across
/// many owned officers without a round trip per row.
pub async fn bulk_officer_overlay(
    State(state): State<Arc<AppState>>,
    RequestId(request_id): RequestId,
    CurrentIdentity(identity): CurrentIdentity,
    Json(body): Json<BulkOfficerOverlayBody>,
) -> Response {
    let started = Instant::now();
    if let Err(resp) = require_rank(&identity, Role::Lieutenant, request_id.0, started) {
        return resp;
    }
    let user_catalog = state.catalog.for_user(identity.user_id.clone());
    let ref_ids = body.ref_ids.into_iter().map(RefId::from).collect();
    let result = user_catalog.bulk_officer_overlay(ref_ids, body.patch).await;
    respond(request_id.0, started, result)
}

#[derive(Debug, Deserialize)]
pub struct BulkShipOverlayBody {
    pub ref_ids: Vec<String>,
    pub patch: ShipOverlayPatch,
}

pub async fn bulk_ship_overlay(
    State(state): State<Arc<AppState>>,
    RequestId(request_id): RequestId,
    CurrentIdentity(identity): CurrentIdentity,
    Json(body): Json<BulkShipOverlayBody>,
) -> Response {
    let started = Instant::now();
    if let Err(resp) = require_rank(&identity, Role::Lieutenant, request_id.0, started) {
        return resp;
    }
    let user_catalog = state.catalog.for_user(identity.user_id.clone());
    let ref_ids = body.ref_ids.into_iter().map(RefId::from).collect();
    let result = user_catalog.bulk_ship_overlay(ref_ids, body.patch).await;
    respond(request_id.0, started, result)
}
