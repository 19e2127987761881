pub mod cli;
pub mod config;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;
pub mod vault;

use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use trust_core::middleware::{
    metrics_middleware, request_id_middleware, signature_validation_middleware, SignatureConfig,
};

use crate::config::TrustConfig;
use crate::services::{EphemeralStore, StepUpAuthorizer, VaultService};

/// Paths reachable without a request signature.
pub const UNSIGNED_PATHS: [&str; 2] = ["/health", "/metrics"];

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<TrustConfig>,
    pub step_up: StepUpAuthorizer,
    pub store: Arc<dyn EphemeralStore>,
    pub vault: VaultService,
    pub signature: Arc<SignatureConfig>,
}

impl AsRef<SignatureConfig> for AppState {
    fn as_ref(&self) -> &SignatureConfig {
        &self.signature
    }
}

pub fn build_router(state: AppState) -> Router {
    let step_up_routes = Router::new()
        .route(
            "/v1/step-up/grants",
            post(handlers::request_grant).delete(handlers::invalidate_grants),
        )
        .route("/v1/step-up/grants/check", post(handlers::check_grant))
        .route("/v1/step-up/grants/consume", post(handlers::consume_grant));

    let vault_routes = Router::new()
        .route("/v1/vault/secrets", post(handlers::seal_secret))
        .route("/v1/vault/secrets/inspect", post(handlers::inspect_secret));

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics::metrics))
        .merge(step_up_routes)
        .merge(vault_routes)
        .with_state(state.clone())
        .layer(from_fn_with_state(
            state,
            signature_validation_middleware::<AppState>,
        ))
        .layer(from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(from_fn(request_id_middleware))
}
