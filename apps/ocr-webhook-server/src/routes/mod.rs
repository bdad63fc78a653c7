//! Route modules for the OCR webhook server

pub mod health;
pub mod webhooks;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the full application router
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(health::router())
        .nest("/webhook", webhooks::router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
