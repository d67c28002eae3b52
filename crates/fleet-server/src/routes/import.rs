// SPDX-License-Identifier: MIT OR Apache-2.0
//! Translator/import pipeline routes (§4.3).

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Path, State},
    response::Response,
    Json,
};
use fleet_core::{ImportLayer, ReceiptId, Role};
use fleet_import::{parse, resolve, translator, NamedRow, ResolvedRow};
use serde::Deserialize;

use crate::identity::{require_rank, CurrentIdentity};
use crate::middleware::RequestId;
use crate::response::{ok, respond, respond_created};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ParseBody {
    pub file_name: String,
    pub format: String,
    pub content_base64: String,
}

/// Stage 1: decode a `{fileName, format, contentBase64}` payload into
/// headers and string rows.
pub async fn parse_import(
    RequestId(request_id): RequestId,
    CurrentIdentity(identity): CurrentIdentity,
    Json(body): Json<ParseBody>,
) -> Response {
    let started = Instant::now();
    if let Err(resp) = require_rank(&identity, Role::Admiral, request_id.0, started) {
        return resp;
    }
    let result = parse::ImportFormat::parse(&body.format)
        .and_then(|format| parse::parse(&body.file_name, format, &body.content_base64));
    respond(request_id.0, started, result)
}

#[derive(Debug, Deserialize)]
pub struct TranslateBody {
    pub config: translator::TranslatorConfig,
    pub payload: serde_json::Value,
}

/// Stage 2: run a declarative translator config against a decoded
/// payload.
pub async fn translate_import(
    RequestId(request_id): RequestId,
    CurrentIdentity(identity): CurrentIdentity,
    Json(body): Json<TranslateBody>,
) -> Response {
    let started = Instant::now();
    if let Err(resp) = require_rank(&identity, Role::Admiral, request_id.0, started) {
        return resp;
    }
    let result = translator::translate(&body.config, &body.payload);
    respond(request_id.0, started, result)
}

#[derive(Debug, Deserialize)]
pub struct ResolveBody {
    pub rows: Vec<NamedRowBody>,
    pub candidates: Vec<CandidateBody>,
}

#[derive(Debug, Deserialize)]
pub struct NamedRowBody {
    pub row_index: usize,
    pub raw_name: String,
    #[serde(default)]
    pub fields: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct CandidateBody {
    pub ref_id: String,
    pub name: String,
}

/// Stage 3: fuzzy-resolve named rows against a candidate set the caller
/// already fetched from the catalog routes.
pub async fn resolve_import(
    RequestId(request_id): RequestId,
    CurrentIdentity(identity): CurrentIdentity,
    Json(body): Json<ResolveBody>,
) -> Response {
    let started = Instant::now();
    if let Err(resp) = require_rank(&identity, Role::Admiral, request_id.0, started) {
        return resp;
    }
    let candidates: Vec<resolve::Candidate> = body
        .candidates
        .into_iter()
        .map(|c| resolve::Candidate { ref_id: c.ref_id.into(), name: c.name })
        .collect();
    let rows: Vec<NamedRow> = body
        .rows
        .into_iter()
        .map(|r| NamedRow { row_index: r.row_index, raw_name: r.raw_name, fields: r.fields })
        .collect();
    let (resolved, unresolved) = fleet_import::resolve_named_rows(rows, &candidates);
    ok(
        request_id.0,
        started,
        serde_json::json!({
            "resolved": resolved.iter().map(|r| serde_json::json!({
                "row_index": r.row_index,
                "ref_id": r.ref_id.as_str(),
                "fields": r.fields,
            })).collect::<Vec<_>>(),
            "unresolved": unresolved,
        }),
    )
}

#[derive(Debug, Deserialize)]
pub struct ApplyBody {
    pub kind: ApplyKind,
    pub source_type: String,
    pub rows: Vec<ResolvedRowBody>,
    #[serde(default)]
    pub unresolved: Vec<fleet_core::UnresolvedItem>,
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ApplyKind {
    Officers,
    Ships,
}

#[derive(Debug, Deserialize)]
pub struct ResolvedRowBody {
    pub row_index: usize,
    pub ref_id: String,
    #[serde(default)]
    pub fields: serde_json::Value,
}

/// Stage 4: apply resolved rows, recording one reversible receipt.
pub async fn apply_import(
    State(state): State<Arc<AppState>>,
    RequestId(request_id): RequestId,
    CurrentIdentity(identity): CurrentIdentity,
    Json(body): Json<ApplyBody>,
) -> Response {
    let started = Instant::now();
    if let Err(resp) = require_rank(&identity, Role::Admiral, request_id.0, started) {
        return resp;
    }
    let user_import = state.import.for_user(identity.user_id.clone());
    let rows: Vec<ResolvedRow> = body
        .rows
        .into_iter()
        .map(|r| ResolvedRow { row_index: r.row_index, ref_id: r.ref_id.into(), fields: r.fields })
        .collect();

    let result = match body.kind {
        ApplyKind::Officers => user_import.apply_officers(&body.source_type, rows, body.unresolved).await,
        ApplyKind::Ships => user_import.apply_ships(&body.source_type, rows, body.unresolved).await,
    };
    respond_created(request_id.0, started, result)
}

#[derive(Debug, Deserialize)]
pub struct ListReceiptsQuery {
    pub layer: Option<String>,
    pub limit: Option<i64>,
}

pub async fn list_receipts(
    State(state): State<Arc<AppState>>,
    RequestId(request_id): RequestId,
    CurrentIdentity(identity): CurrentIdentity,
    axum::extract::Query(query): axum::extract::Query<ListReceiptsQuery>,
) -> Response {
    let started = Instant::now();
    if let Err(resp) = require_rank(&identity, Role::Lieutenant, request_id.0, started) {
        return resp;
    }
    let layer = query.layer.as_deref().and_then(layer_from_str);
    let limit = query.limit.unwrap_or(50);
    let user_receipts = state.receipts.for_user(identity.user_id.clone());
    let result = user_receipts.list(layer, limit).await;
    respond(request_id.0, started, result)
}

fn layer_from_str(s: &str) -> Option<ImportLayer> {
    match s {
        "reference" => Some(ImportLayer::Reference),
        "ownership" => Some(ImportLayer::Ownership),
        "composition" => Some(ImportLayer::Composition),
        _ => None,
    }
}

pub async fn get_receipt(
    State(state): State<Arc<AppState>>,
    RequestId(request_id): RequestId,
    CurrentIdentity(identity): CurrentIdentity,
    Path(id): Path<String>,
) -> Response {
    let started = Instant::now();
    if let Err(resp) = require_rank(&identity, Role::Lieutenant, request_id.0, started) {
        return resp;
    }
    let user_receipts = state.receipts.for_user(identity.user_id.clone());
    let result = user_receipts.get(&ReceiptId::from(id)).await;
    match result {
        Ok(Some(receipt)) => ok(request_id.0, started, receipt),
        Ok(None) => crate::response::err(
            request_id.0,
            started,
            fleet_error::FleetError::new(fleet_error::ErrorCode::NotFound, "receipt not found"),
            None,
        ),
        Err(e) => crate::response::err(request_id.0, started, e.into(), None),
    }
}

pub async fn undo_receipt(
    State(state): State<Arc<AppState>>,
    RequestId(request_id): RequestId,
    CurrentIdentity(identity): CurrentIdentity,
    Path(id): Path<String>,
) -> Response {
    let started = Instant::now();
    if let Err(resp) = require_rank(&identity, Role::Admiral, request_id.0, started) {
        return resp;
    }
    let user_import = state.import.for_user(identity.user_id.clone());
    let result = user_import.undo(&ReceiptId::from(id)).await;
    respond(request_id.0, started, result)
}

#[derive(Debug, Deserialize)]
pub struct ResolveItemsBody {
    pub resolutions: Vec<(usize, String)>,
}

pub async fn resolve_receipt_items(
    State(state): State<Arc<AppState>>,
    RequestId(request_id): RequestId,
    CurrentIdentity(identity): CurrentIdentity,
    Path(id): Path<String>,
    Json(body): Json<ResolveItemsBody>,
) -> Response {
    let started = Instant::now();
    if let Err(resp) = require_rank(&identity, Role::Admiral, request_id.0, started) {
        return resp;
    }
    let user_import = state.import.for_user(identity.user_id.clone());
    let result = user_import.resolve_items(&ReceiptId::from(id), body.resolutions).await;
    respond(request_id.0, started, result)
}
