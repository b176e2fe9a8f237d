//! # Uploader Server
//!
//! HTTP front end for the chunked record store.
//!
//! ```text
//! POST   /api/auth             start a session (secret key)
//! DELETE /api/auth             end the session
//! POST   /api/file             multipart upload            (session)
//! GET    /api/file/:id         download, Range aware
//! GET    /api/file/:id/info    metadata and size
//! PUT    /api/file/:id         replace filename and note   (session)
//! DELETE /api/file/:id         delete                      (session)
//! GET    /healthcheck          liveness
//! GET    /sys/{stats,health,info}   opt-in, IP restricted
//! ```

pub mod auth;
pub mod error;
pub mod files;
pub mod health;
pub mod state;
pub mod stats;
pub mod validate;

use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderName, HeaderValue, Method},
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowHeaders, AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use error::{ApiError, StartupError};
pub use state::{AppState, ServerConfig};

/// Build the full application router
pub fn router(state: AppState) -> Router {
    let config = state.config.clone();

    let mut app = Router::new()
        .route("/healthcheck", get(health::healthcheck))
        .route("/api/auth", post(auth::login).delete(auth::logout))
        .route(
            "/api/file",
            post(files::upload_file).layer(DefaultBodyLimit::max(config.max_upload_bytes)),
        )
        .route(
            "/api/file/:id",
            get(files::download_file)
                .put(files::update_file)
                .delete(files::delete_file),
        )
        .route("/api/file/:id/info", get(files::file_info));

    if let Some(sys) = sys_router(&state) {
        app = app.merge(sys);
    }

    app.layer(middleware::from_fn_with_state(state.clone(), stats::track))
        .layer(middleware::from_fn(health::upgrade_to_https))
        .layer(cors_layer(&config))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Opt-in operational endpoints, `None` when all are disabled
fn sys_router(state: &AppState) -> Option<Router<AppState>> {
    let config = &state.config;
    if !config.enable_stats && !config.enable_health {
        return None;
    }

    let mut sys = Router::new();
    if config.enable_stats {
        sys = sys.route("/sys/stats", get(stats::stats_handler));
    }
    if config.enable_health {
        sys = sys
            .route("/sys/health", get(health::sys_health))
            .route("/sys/info", get(health::sys_info));
    }

    Some(sys.route_layer(middleware::from_fn_with_state(
        state.clone(),
        health::restrict_ip,
    )))
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let wildcard = |list: &[String]| list.iter().any(|v| v.trim() == "*");

    let methods: Vec<Method> = config
        .allowed_methods
        .iter()
        .filter_map(|m| Method::from_bytes(m.trim().to_ascii_uppercase().as_bytes()).ok())
        .collect();
    let mut cors = CorsLayer::new().allow_methods(methods);

    let any_origin = wildcard(&config.allowed_origins);
    let any_header = wildcard(&config.allowed_headers);

    if any_origin {
        cors = cors.allow_origin(Any);
    } else if !config.allowed_origins.is_empty() {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|o| HeaderValue::from_str(o.trim()).ok())
            .collect();
        cors = cors.allow_origin(AllowOrigin::list(origins));
    }

    if any_header {
        cors = cors.allow_headers(Any);
    } else if !config.allowed_headers.is_empty() {
        let headers: Vec<HeaderName> = config
            .allowed_headers
            .iter()
            .filter_map(|h| HeaderName::from_bytes(h.trim().as_bytes()).ok())
            .collect();
        cors = cors.allow_headers(AllowHeaders::list(headers));
    }

    // Session cookies cross origins only for explicit allow-lists
    if !any_origin && !any_header && !config.allowed_origins.is_empty() {
        cors = cors.allow_credentials(true);
    }

    cors
}
