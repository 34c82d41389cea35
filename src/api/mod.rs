//! HTTP surface: the push endpoint and the health check.

pub mod health;
pub mod webhook;

use axum::{Router, routing};

use crate::SharedState;

// Re-export handlers
pub use health::health;
pub use webhook::handle_push;

/// Builds the router serving `POST /` and `GET /_health`.
pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", routing::post(handle_push))
        .route("/_health", routing::get(health))
        .with_state(state)
}
