use axum::http::{HeaderValue, Method};
use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

use crate::state::AppState;

pub mod deploy;
pub mod diagrams;
pub mod health;
pub mod ws;

pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.cfg.cors_origin);

    Router::new()
        .route("/health", get(health::health))
        .route(
            "/api/deploy",
            axum::routing::post(deploy::deploy)
                .put(deploy::update)
                .delete(deploy::teardown),
        )
        .route("/api/deploy/status", get(deploy::status))
        .route(
            "/api/diagrams",
            axum::routing::post(diagrams::create).get(diagrams::list),
        )
        .route(
            "/api/diagrams/:id",
            get(diagrams::get)
                .put(diagrams::update)
                .delete(diagrams::delete),
        )
        .route("/ws/status", get(ws::status_ws))
        .layer(cors)
        .with_state(state)
}

/// Single-origin CORS for the workbench frontend. An unparseable origin
/// falls back to allowing any, with a warning, rather than breaking the
/// local tool.
fn cors_layer(origin: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any);

    match origin.parse::<HeaderValue>() {
        Ok(value) => layer.allow_origin(value),
        Err(_) => {
            warn!(origin, "invalid CORS_ORIGIN value; allowing any origin");
            layer.allow_origin(Any)
        }
    }
}
