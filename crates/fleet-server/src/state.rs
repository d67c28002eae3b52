// SPDX-License-Identifier: MIT OR Apache-2.0
//! Shared application state, constructed once at startup and cloned (as an
//! `Arc`) into every request.

use std::sync::Arc;

use fleet_auth::AuthStore;
use fleet_catalog::CatalogStore;
use fleet_composition::CompositionStore;
use fleet_config::FleetConfig;
use fleet_db::Db;
use fleet_import::ImportStore;
use fleet_policy::{PolicyStore, TrustPolicy};
use fleet_proposal::ProposalStore;
use fleet_receipt_store::ReceiptStore;
use fleet_session::registry::SessionRegistry;
use fleet_session::tools::ToolRuntime;
use fleet_session::orchestrator::SessionOrchestrator;

/// Everything a route handler needs, grouped by substore.
pub struct AppState {
    /// Runtime configuration (§6.1).
    pub config: FleetConfig,
    /// Dual-pool database handle (§4.1).
    pub db: Db,
    /// Identity resolution and account lifecycle (§4.7).
    pub auth: AuthStore,
    /// Reference catalog + per-user overlay (§4.2).
    pub catalog: CatalogStore,
    /// Loadouts, bridge cores, below-deck policies, docks, plan items,
    /// targets (§3).
    pub composition: CompositionStore,
    /// Translator/import pipeline (§4.3).
    pub import: ImportStore,
    /// Mutation proposals (§4.4).
    pub proposals: ProposalStore,
    /// Import/catalog-bulk-overlay receipts (§4.3, §4.2).
    pub receipts: ReceiptStore,
    /// Trust-tier overrides (§4.6).
    pub policy: PolicyStore,
    /// System default trust tiers, shared read-only (§4.6 step 2).
    pub trust_defaults: Arc<TrustPolicy>,
    /// Mutation-gating dispatch for tool calls (§4.5, §4.6).
    pub tools: ToolRuntime,
    /// Bounded per-session chat history and turn protocol (§4.5).
    pub sessions: Arc<SessionRegistry>,
    /// Drives one chat turn end to end.
    pub orchestrator: SessionOrchestrator,
}

impl AppState {
    /// Wire every substore from one connected [`Db`] and [`FleetConfig`].
    pub fn new(db: Db, config: FleetConfig) -> Arc<Self> {
        let trust_defaults = Arc::new(TrustPolicy::with_defaults());
        let catalog = CatalogStore::new(db.clone());
        let composition = CompositionStore::new(db.clone());
        let sessions = Arc::new(SessionRegistry::new());
        let backend: Arc<dyn fleet_session::chat::ChatBackend> =
            Arc::new(fleet_session::chat::EchoBackend::new(""));
        let orchestrator = SessionOrchestrator::new(sessions.clone(), backend, None);

        Arc::new(Self {
            auth: AuthStore::new(db.clone()),
            import: ImportStore::new(catalog.clone(), db.clone()),
            proposals: ProposalStore::new(db.clone()),
            receipts: ReceiptStore::new(db.clone()),
            policy: PolicyStore::new(db.clone()),
            tools: ToolRuntime::new(db.clone(), config.clone(), TrustPolicy::with_defaults()),
            catalog,
            composition,
            sessions,
            orchestrator,
            db,
            config,
            trust_defaults,
        })
    }
}
