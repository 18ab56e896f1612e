use axum::{middleware as axum_mw, routing::get, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::handlers;
use crate::metrics::stream;
use crate::middleware::timing;
use crate::AppState;

/// Builds the `Router`: demo endpoints and telemetry endpoints, all timed by
/// the instrumentation middleware.
pub fn create_router(state: Arc<AppState>) -> Router {
    let telemetry = state.telemetry.clone();

    Router::new()
        // ── Demo endpoints ──────────────────────────────────────
        .route("/", get(handlers::demo::root))
        .route("/api/status/:code", get(handlers::demo::status))
        .route("/api/sleep/:ms", get(handlers::demo::sleep))
        // ── Relay telemetry ─────────────────────────────────────
        .route("/api/telemetry", get(stream::get_stats))
        .route("/api/telemetry/stream", get(stream::stats_stream))
        .with_state(state)
        // ── Global middleware (applied bottom-up) ───────────────
        .layer(axum_mw::from_fn_with_state(telemetry, timing::instrument))
        .layer(CorsLayer::permissive())
}
