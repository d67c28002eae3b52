// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
//! HTTP control plane for the fleet intelligence backend (§6).

pub mod identity;
pub mod middleware;
pub mod response;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::{
    routing::{get, patch, post},
    Json, Router,
};
use tower::ServiceBuilder;

use state::AppState;

/// Wire every core route (§6's routes table) onto one router, with the
/// request-id and logging middleware applied to all of them.
pub fn build_app(state: Arc<AppState>) -> Router {
    let api = Router::new()
        // Auth (§4.7)
        .route("/auth/signup", post(routes::auth::sign_up))
        .route("/auth/verify-email", post(routes::auth::verify_email))
        .route("/auth/signin", post(routes::auth::sign_in))
        .route("/auth/logout", post(routes::auth::logout))
        .route("/auth/change-password", post(routes::auth::change_password))
        .route("/auth/forgot-password", post(routes::auth::forgot_password))
        .route("/auth/reset-password", post(routes::auth::reset_password))
        .route("/auth/me", get(routes::auth::me))
        // Catalog (§4.2)
        .route("/catalog/officers", get(routes::catalog::list_officers))
        .route("/catalog/officers/overlay/bulk", post(routes::catalog::bulk_officer_overlay))
        .route("/catalog/officers/{refId}", get(routes::catalog::get_officer))
        .route(
            "/catalog/officers/{refId}/overlay",
            patch(routes::catalog::set_officer_overlay).delete(routes::catalog::reset_officer_overlay),
        )
        .route("/catalog/ships", get(routes::catalog::list_ships))
        .route("/catalog/ships/overlay/bulk", post(routes::catalog::bulk_ship_overlay))
        .route("/catalog/ships/{refId}", get(routes::catalog::get_ship))
        .route(
            "/catalog/ships/{refId}/overlay",
            patch(routes::catalog::set_ship_overlay).delete(routes::catalog::reset_ship_overlay),
        )
        // Import (§4.3)
        .route("/import/parse", post(routes::import::parse_import))
        .route("/import/translate", post(routes::import::translate_import))
        .route("/import/resolve", post(routes::import::resolve_import))
        .route("/import/apply", post(routes::import::apply_import))
        .route("/import/receipts", get(routes::import::list_receipts))
        .route("/import/receipts/{id}", get(routes::import::get_receipt))
        .route("/import/receipts/{id}/undo", post(routes::import::undo_receipt))
        .route("/import/receipts/{id}/resolve", post(routes::import::resolve_receipt_items))
        // Composition reads (§3; mutation goes through /mutations/proposals)
        .route("/loadouts", get(routes::composition::list_loadouts))
        .route("/loadouts/variants", get(routes::composition::list_loadout_variants))
        .route("/loadouts/variants/{id}", get(routes::composition::get_loadout_variant))
        .route("/loadouts/{id}", get(routes::composition::get_loadout))
        .route("/bridge-cores", get(routes::composition::list_bridge_cores))
        .route("/bridge-cores/{id}", get(routes::composition::get_bridge_core))
        .route("/below-deck-policies", get(routes::composition::list_below_deck_policies))
        .route("/below-deck-policies/{id}", get(routes::composition::get_below_deck_policy))
        .route("/docks", get(routes::composition::list_docks))
        .route("/plan-items", get(routes::composition::list_plan_items))
        .route("/targets", get(routes::composition::list_targets))
        .route("/targets/{id}", get(routes::composition::get_target))
        // Mutation proposals (§4.4, §4.5)
        .route(
            "/mutations/proposals",
            post(routes::proposals::call_tool).get(routes::proposals::list_proposals),
        )
        .route("/mutations/proposals/{id}", get(routes::proposals::get_proposal))
        .route("/mutations/proposals/{id}/apply", post(routes::proposals::apply_proposal))
        .route("/mutations/proposals/{id}/decline", post(routes::proposals::decline_proposal))
        // Chat (§4.5)
        .route("/chat", post(routes::chat::chat));

    Router::new()
        .nest("/api", api)
        .route("/healthz", get(health))
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn(middleware::request_id_middleware))
                .layer(axum::middleware::from_fn(middleware::RequestLogger::layer)),
        )
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}
