//! HTTP boundary
//!
//! Routes:
//! - `POST /api/clients` registers a client from a signed envelope
//! - `GET /api/clients/{clientId}/consents?accountId=..` proxies a consent query
//! - `GET /health` liveness

pub mod clients;
pub mod error;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::consents::ConsentQueryProxy;
use crate::envelope::SignatureVerifier;
use crate::registry::ClientRegistry;

/// Shared application state
pub struct AppState {
    pub verifier: SignatureVerifier,
    pub registry: ClientRegistry,
    pub consents: ConsentQueryProxy,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/clients", post(clients::register))
        .route("/api/clients/{client_id}/consents", get(clients::consents))
        .route("/health", get(|| async { "OK" }))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
