use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::{handlers, usage};
use crate::AppState;

/// Daemon's own endpoints. Everything else falls through to the upstream.
fn service_routes(metrics_path: &str) -> Router<Arc<AppState>> {
    Router::new()
        .route("/v1/health", get(handlers::health))
        .route("/v1/config/reload", post(handlers::reload_config))
        .route(metrics_path, get(handlers::metrics))
}

/// Create the router with usage metrics applied to every request,
/// including forwarded ones.
pub fn create_router(state: Arc<AppState>) -> Router {
    service_routes(&state.settings.metrics.path)
        .fallback(handlers::forward)
        .with_state(state.clone())
        .layer(axum::middleware::from_fn_with_state(
            state,
            usage::usage_metrics,
        ))
        .layer(TraceLayer::new_for_http())
}

/// Wrap an arbitrary application router with usage metrics.
pub fn instrument<S>(router: Router<S>, state: Arc<AppState>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.layer(axum::middleware::from_fn_with_state(
        state,
        usage::usage_metrics,
    ))
}
