//! Usage metrics middleware

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, header::HOST},
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use crate::AppState;
use crate::usage::RequestSnapshot;

/// Record every request that passes through the router once the downstream
/// chain has produced a response. The response itself is passed through
/// untouched.
pub async fn usage_metrics(
    State(state): State<Arc<AppState>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    // Skip the metrics endpoint to avoid self-scrape noise
    let metrics = &state.settings.metrics;
    if !metrics.track_metrics_endpoint && req.uri().path() == metrics.path {
        return next.run(req).await;
    }

    let mut snapshot = snapshot_request(&req);
    let start = Instant::now();

    let response = next.run(req).await;

    snapshot.status_code = response.status().as_u16();
    let snapshot = snapshot.with_elapsed(start.elapsed());
    state.recorder().await.record(&snapshot);

    response
}

/// Capture the request attributes before the body is consumed downstream.
pub fn snapshot_request(req: &Request<Body>) -> RequestSnapshot {
    let uri = req.uri();
    let host = req
        .headers()
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| uri.authority().map(|a| a.as_str()))
        .unwrap_or_default();
    let full_url = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| uri.path());
    let peer_addr = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_default();

    RequestSnapshot {
        method: req.method().to_string(),
        host: host.to_string(),
        path: uri.path().to_string(),
        full_url: full_url.to_string(),
        peer_addr,
        headers: req.headers().clone(),
        ..Default::default()
    }
}
