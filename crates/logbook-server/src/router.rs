//! Logbook Router
//!
//! HTTP router configuration with middleware stack.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::handlers;
use crate::middleware;
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

// =============================================================================
// Router
// =============================================================================

/// Create the main application router.
pub fn create_router(state: AppState) -> Router {
    let history_routes = Router::new()
        .route("/values", get(handlers::get_values))
        .route("/contexts", get(handlers::get_contexts))
        .route("/paths", get(handlers::get_paths))
        .route("/snapshot", get(handlers::get_snapshot))
        .route("/playback", get(handlers::stream_playback))
        .route("/playback/available", get(handlers::get_playback_availability));

    let mut router = Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/history", history_routes)
        .route("/tracks", get(handlers::get_tracks))
        .route("/track", get(handlers::get_track))
        .route("/deltas", post(handlers::post_delta))
        .fallback(handlers::not_found)
        .layer(TraceLayer::new_for_http());

    if state.config.enable_cors {
        router = router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    router
        .layer(axum::middleware::from_fn(middleware::request_id))
        .with_state(state)
}

// =============================================================================
// Tests
// =============================================================================
