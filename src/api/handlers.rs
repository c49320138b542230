use axum::{
    Json,
    body::Body,
    extract::{ConnectInfo, State},
    http::{
        HeaderMap, HeaderName, HeaderValue, Request, StatusCode,
        header::{CONNECTION, CONTENT_TYPE, HOST, TRANSFER_ENCODING, UPGRADE},
    },
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::AppState;
use crate::error::UsageError;

const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Headers that apply to a single connection and must not be forwarded.
const HOP_BY_HOP: [&str; 6] = [
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
];

// Response types

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub metrics_enabled: bool,
}

#[derive(Serialize)]
pub struct ReloadResponse {
    /// List of reloaded config sections
    reloaded: Vec<String>,
    /// Reload timestamp
    timestamp: String,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

// Error handling

pub struct AppError(UsageError);

impl<E: Into<UsageError>> From<E> for AppError {
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.0.status_code();
        tracing::warn!(error = %self.0, status = status.as_u16(), "request failed");
        let body = Json(ErrorResponse {
            error: self.0.to_string(),
        });
        (status, body).into_response()
    }
}

// Handlers

pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let status = if state.is_shutting_down() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    let label = if status == StatusCode::OK { "ok" } else { "shutting_down" };
    let body = Json(HealthResponse {
        status: label.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        metrics_enabled: state.recorder().await.is_enabled(),
    });
    (status, body)
}

pub async fn metrics(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    let body = state.registry.encode_text()?;
    Ok((
        [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    ))
}

pub async fn reload_config(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    let reloaded = state.reload_config().await.map_err(|e| {
        tracing::error!(error = %e, "config reload failed");
        e
    })?;

    Ok(Json(ReloadResponse {
        reloaded,
        timestamp: chrono::Utc::now().to_rfc3339(),
    }))
}

/// Fallback: forward to the configured upstream, or 404 when there is none.
pub async fn forward(
    State(state): State<Arc<AppState>>,
    req: Request<Body>,
) -> Result<Response, AppError> {
    let (Some(client), Some(upstream)) = (&state.upstream, &state.settings.upstream) else {
        let body = Json(ErrorResponse {
            error: "not found".to_string(),
        });
        return Ok((StatusCode::NOT_FOUND, body).into_response());
    };

    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let (parts, body) = req.into_parts();
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let url = format!("{}{}", upstream.url.trim_end_matches('/'), path_and_query);

    let body = axum::body::to_bytes(body, state.settings.http.max_body_bytes)
        .await
        .map_err(|e| UsageError::Body(e.to_string()))?;

    let mut headers = parts.headers;
    strip_hop_by_hop(&mut headers);
    headers.remove(HOST);
    if let Some(ip) = peer {
        append_forwarded_for(&mut headers, &ip.to_string());
    }

    tracing::debug!(method = %parts.method, url = %url, "forwarding request");

    let upstream_response = client
        .request(parts.method, &url)
        .headers(headers)
        .body(body)
        .send()
        .await?;

    let status = upstream_response.status();
    let mut response_headers = upstream_response.headers().clone();
    strip_hop_by_hop(&mut response_headers);
    let bytes = upstream_response.bytes().await?;

    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = status;
    *response.headers_mut() = response_headers;
    Ok(response)
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    // Connection may name further per-connection headers
    let named: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in named {
        headers.remove(name);
    }

    headers.remove(CONNECTION);
    headers.remove(TRANSFER_ENCODING);
    headers.remove(UPGRADE);
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

fn append_forwarded_for(headers: &mut HeaderMap, ip: &str) {
    let value = match headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(existing) if !existing.is_empty() => format!("{}, {}", existing, ip),
        _ => ip.to_string(),
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}
