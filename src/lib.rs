// src/lib.rs
// Public library surface for the binary, integration tests and widget hosts.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod metrics;
pub mod model;
pub mod store;
pub mod validate;

// Client-side survey widget (state machine + runtime)
pub mod widget;

// ---- Re-exports for stable public API ----
pub use crate::api::{router, AppState};
pub use crate::auth::{CredentialGate, CredentialRejection, KeyRegistry};
pub use crate::config::ServiceConfig;
pub use crate::error::ApiError;
pub use crate::model::{FeedbackSubmission, Score};
pub use crate::store::{InMemoryStore, ResponseStore};

use axum::Router;
use tracing::info;

/// Build the full application from `$NPS_CONFIG_PATH` / `config/nps.toml` /
/// defaults, the same way the binary does.
pub async fn app() -> anyhow::Result<Router> {
    let cfg = ServiceConfig::load_default()?;
    app_with_config(&cfg)
}

pub fn app_with_config(cfg: &ServiceConfig) -> anyhow::Result<Router> {
    let state = AppState::from_config(cfg);
    info!(
        registry = ?cfg.auth.registry,
        live_prefix = %cfg.auth.live_key_prefix,
        metrics = cfg.http.metrics_enabled,
        "NPS ingestion app configured"
    );
    api::create_router(state, cfg)
}
