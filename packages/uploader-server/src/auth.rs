//! Shared-secret session authentication.
//!
//! There is a single secret for the whole server. `POST /api/auth` with the
//! right secret sets an `authSecret` cookie holding a key derived from it;
//! mutating endpoints require that cookie.
//!
//! - `POST   /api/auth` — Start a session
//! - `DELETE /api/auth` — End the session

use std::sync::Arc;

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequestParts, State},
    http::{header, request::Parts, HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use hkdf::Hkdf;
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{ApiError, ApiResponse, StartupError};
use crate::state::AppState;

/// Session cookie name
pub const SESSION_COOKIE: &str = "authSecret";

/// Session lifetime (30 days)
pub const SESSION_MAX_AGE_SECS: u64 = 30 * 24 * 3600;

/// Set-Cookie value that ends a session
pub const CLEAR_SESSION_COOKIE: &str = "authSecret=; Path=/; HttpOnly; SameSite=Strict; Max-Age=0";

/// Domain separation for the session key
const KEY_SALT: &[u8] = b"uploader-session-salt-v1";
const KEY_INFO: &[u8] = b"uploader-session-key-v1";

/// Holds the derived session key
#[derive(Clone)]
pub struct Authenticator {
    key: Arc<[u8; 32]>,
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator").finish_non_exhaustive()
    }
}

impl Authenticator {
    /// Derive the session key from the configured secret
    pub fn new(secret: &str) -> Result<Self, StartupError> {
        if secret.is_empty() {
            return Err(StartupError::Config("secret key must not be empty".into()));
        }
        let key = derive_key(secret).ok_or_else(|| {
            StartupError::Config("failed to derive session key".into())
        })?;
        Ok(Self { key: Arc::new(key) })
    }

    /// Compare a candidate secret against the configured one
    pub fn verify_secret(&self, candidate: &str) -> bool {
        derive_key(candidate)
            .map(|key| bool::from(key.as_slice().ct_eq(self.key.as_slice())))
            .unwrap_or(false)
    }

    /// Compare a cookie value against the session key
    pub fn verify_token(&self, token: &str) -> bool {
        match STANDARD.decode(token) {
            Ok(bytes) => bool::from(bytes.as_slice().ct_eq(self.key.as_slice())),
            Err(_) => false,
        }
    }

    /// Cookie value for an authenticated session
    pub fn session_token(&self) -> String {
        STANDARD.encode(self.key.as_ref())
    }

    /// Full Set-Cookie value starting a session
    pub fn session_cookie(&self) -> String {
        format!(
            "{}={}; Path=/; HttpOnly; SameSite=Strict; Max-Age={}",
            SESSION_COOKIE,
            self.session_token(),
            SESSION_MAX_AGE_SECS
        )
    }
}

fn derive_key(secret: &str) -> Option<[u8; 32]> {
    let hk = Hkdf::<Sha256>::new(Some(KEY_SALT), secret.as_bytes());
    let mut key = [0u8; 32];
    hk.expand(KEY_INFO, &mut key).ok()?;
    Some(key)
}

/// Find a cookie by name across all Cookie headers
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}

// ── Extractor ────────────────────────────────────────────────────────────────

/// Proof that the request carries a valid session cookie.
///
/// Handlers that take it answer 401 (and clear the cookie) otherwise.
#[derive(Debug, Clone, Copy)]
pub struct Authenticated;

#[async_trait]
impl FromRequestParts<AppState> for Authenticated {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match cookie_value(&parts.headers, SESSION_COOKIE) {
            Some(token) if state.auth.verify_token(&token) => Ok(Authenticated),
            _ => Err(ApiError::Unauthorized),
        }
    }
}

// ── Handlers ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub secret_key: String,
}

/// POST /api/auth
///
/// JSON body: `{"secretKey": "..."}`
pub async fn login(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    if request.secret_key.is_empty() {
        return Err(ApiError::BadRequest("secretKey is required".into()));
    }

    if !state.auth.verify_secret(&request.secret_key) {
        tracing::warn!("Rejected login with wrong secret");
        return Err(ApiError::InvalidSecret);
    }

    let cookie = HeaderValue::from_str(&state.auth.session_cookie())
        .map_err(|e| ApiError::Task(e.to_string()))?;

    Ok((
        [(header::SET_COOKIE, cookie)],
        ApiResponse::success(json!({ "authenticated": true })),
    )
        .into_response())
}

/// DELETE /api/auth
pub async fn logout() -> impl IntoResponse {
    (
        [(header::SET_COOKIE, HeaderValue::from_static(CLEAR_SESSION_COOKIE))],
        ApiResponse::success(json!({ "authenticated": false })),
    )
}
