//! Health, info and transport-level middleware.
//!
//! - `GET /healthcheck` — Liveness, always on
//! - `GET /sys/health`  — Liveness plus a store round trip (IP restricted)
//! - `GET /sys/info`    — Process and host details (IP restricted)

use std::net::{IpAddr, SocketAddr};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use uploader_core::RecordId;

use crate::error::error_response;
use crate::state::AppState;

/// Client address: first `X-Forwarded-For` hop, else the socket peer
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<IpAddr> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse().ok())
        .or_else(|| peer.map(|addr| addr.ip()))
}

// ── Handlers ─────────────────────────────────────────────────────────────────

/// GET /healthcheck
pub async fn healthcheck(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let ip = client_ip(&headers, peer.map(|ConnectInfo(addr)| addr));
    Json(json!({
        "status": "ok",
        "service": "uploader-server",
        "version": env!("CARGO_PKG_VERSION"),
        "started_at": state.started_at.to_rfc3339(),
        "uptime_sec": state.uptime_secs(),
        "client_ip": ip.map(|ip| ip.to_string()),
    }))
}

/// GET /sys/health
///
/// Runs one cheap query so a wedged database shows up as 503.
pub async fn sys_health(State(state): State<AppState>) -> impl IntoResponse {
    let store = state.store.clone();
    let probe = tokio::task::spawn_blocking(move || {
        store.content_length(&RecordId::from("healthcheck"))
    })
    .await;

    let (status, store_status) = match probe {
        Ok(Ok(_)) => (StatusCode::OK, "ok".to_string()),
        Ok(Err(e)) => (StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
        Err(e) => (StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
    };

    (
        status,
        Json(json!({
            "status": if status == StatusCode::OK { "ok" } else { "degraded" },
            "store": store_status,
            "uptime_sec": state.uptime_secs(),
        })),
    )
}

/// GET /sys/info
pub async fn sys_info(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "service": "uploader-server",
        "version": env!("CARGO_PKG_VERSION"),
        "core_version": uploader_core::VERSION,
        "pid": std::process::id(),
        "os": std::env::consts::OS,
        "arch": std::env::consts::ARCH,
        "cpus": std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
        "chunk_size": state.store.chunk_size(),
        "started_at": state.started_at.to_rfc3339(),
        "uptime_sec": state.uptime_secs(),
        "timestamp": chrono::Utc::now().timestamp_millis(),
    }))
}

// ── Middleware ───────────────────────────────────────────────────────────────

/// Allow only configured client addresses (empty list allows everyone)
pub async fn restrict_ip(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    req: Request,
    next: Next,
) -> Response {
    let allowed = &state.config.allowed_ips;
    if allowed.is_empty() {
        return next.run(req).await;
    }

    let ip = client_ip(req.headers(), peer.map(|ConnectInfo(addr)| addr));
    let permitted = ip.is_some_and(|ip| {
        allowed
            .iter()
            .filter_map(|a| a.trim().parse::<IpAddr>().ok())
            .any(|a| a == ip)
    });

    if !permitted {
        tracing::warn!(ip = ?ip, path = %req.uri().path(), "Blocked restricted endpoint");
        return error_response(StatusCode::FORBIDDEN, "Forbidden");
    }

    next.run(req).await
}

/// Redirect plain-HTTP requests seen by a TLS-terminating proxy
pub async fn upgrade_to_https(req: Request, next: Next) -> Response {
    let forwarded_http = req
        .headers()
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|proto| proto.eq_ignore_ascii_case("http"));

    if !forwarded_http {
        return next.run(req).await;
    }

    let host = req
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let path = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    match HeaderValue::from_str(&format!("https://{}{}", host, path)) {
        Ok(location) => (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, location)]).into_response(),
        Err(_) => error_response(StatusCode::BAD_REQUEST, "Invalid host header"),
    }
}
