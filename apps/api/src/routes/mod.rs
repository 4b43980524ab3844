pub mod health;

use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

use crate::pipeline::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let upload_limit = state.config.max_upload_bytes;
    let cors = cors_layer(&state.config.cors_allowed_origins);

    Router::new()
        .route("/health", get(health::health_handler))
        // Session API
        .route("/api/v1/sessions", post(handlers::handle_create_session))
        .route(
            "/api/v1/sessions/:id",
            get(handlers::handle_get_session).delete(handlers::handle_delete_session),
        )
        .route(
            "/api/v1/sessions/:id/generate",
            post(handlers::handle_generate),
        )
        .route("/api/v1/sessions/:id/retry", post(handlers::handle_retry))
        .route(
            "/api/v1/sessions/:id/changes/:change_id/toggle",
            post(handlers::handle_toggle_change),
        )
        .route(
            "/api/v1/sessions/:id/sections/bulk",
            post(handlers::handle_bulk_section),
        )
        .route(
            "/api/v1/sessions/:id/finalize",
            post(handlers::handle_finalize),
        )
        .route(
            "/api/v1/sessions/:id/results",
            get(handlers::handle_get_results),
        )
        .layer(DefaultBodyLimit::max(upload_limit))
        .layer(cors)
        .with_state(state)
}

/// `["*"]` allows any origin; otherwise only the listed ones.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = if origins.iter().any(|o| o == "*") {
        CorsLayer::new().allow_origin(Any)
    } else {
        let allowed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(origin, "Invalid CORS origin in config; skipping");
                    None
                }
            })
            .collect();
        CorsLayer::new().allow_origin(allowed)
    };

    layer
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::ORIGIN])
        .max_age(Duration::from_secs(3600))
}
