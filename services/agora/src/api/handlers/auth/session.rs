//! Session inspection and logout endpoints, plus the auth cookie builders.

use axum::{
    Json,
    extract::Extension,
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{InvalidHeaderValue, SET_COOKIE},
    },
    response::IntoResponse,
};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{error, warn};

use super::super::BearerVerifier;
use super::csrf;
use super::error::AuthError;
use super::state::{AuthConfig, AuthState};
use super::storage::{StoreError, delete_session, lookup_session};
use super::types::SessionStatusResponse;
use super::utils::{cookie_value, extract_bearer_token, hash_session_token};

pub(crate) const SESSION_COOKIE_NAME: &str = "agora_session";
pub(crate) const BEARER_COOKIE_NAME: &str = "agora_token";

// The provider's access tokens are short-lived; the cookie only needs to
// outlive one of them, refresh hands out a fresh cookie anyway.
const DEFAULT_BEARER_COOKIE_TTL_SECONDS: u64 = 300;

#[utoipa::path(
    get,
    path = "/v1/auth/session",
    responses(
        (status = 200, description = "Session is active", body = SessionStatusResponse),
        (status = 204, description = "No active session")
    ),
    tag = "auth"
)]
pub async fn session(
    headers: HeaderMap,
    pool: Extension<SqlitePool>,
    verifier: Extension<Arc<BearerVerifier>>,
) -> impl IntoResponse {
    // A verifiable bearer token wins; it carries the identity directly.
    if let Some(token) = extract_presented_bearer(&headers)
        && let Some((auth_type, claims)) = verifier.verify_presented(&token).await
    {
        let response = SessionStatusResponse {
            user_id: Some(claims.sub),
            auth_type,
        };
        return (StatusCode::OK, Json(response)).into_response();
    }

    // Otherwise fall back to the opaque session record. Missing cookies are
    // "no session"; store failures are NOT.
    let Some(token) = cookie_value(&headers, SESSION_COOKIE_NAME) else {
        return StatusCode::NO_CONTENT.into_response();
    };
    let token_hash = hash_session_token(&token);
    match lookup_session(&pool, &token_hash).await {
        Ok(record) => {
            let response = SessionStatusResponse {
                user_id: record.user_id.map(|id| id.to_string()),
                auth_type: record.auth_type,
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(StoreError::NotFound) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => AuthError::from(err).into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    responses(
        (status = 204, description = "Session cleared")
    ),
    tag = "auth"
)]
pub async fn logout(
    headers: HeaderMap,
    pool: Extension<SqlitePool>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    // Logout is deliberately best-effort on CSRF: a stuck session is a worse
    // outcome than a forged logout.
    if let Err(err) = csrf::validate(&headers, auth_state.config()) {
        warn!("Proceeding with logout despite CSRF failure: {err}");
    }

    if let Some(token) = cookie_value(&headers, SESSION_COOKIE_NAME) {
        let token_hash = hash_session_token(&token);
        match lookup_session(&pool, &token_hash).await {
            Ok(record) => {
                // Revoke the refresh token upstream; local deletion happens
                // regardless of the outcome.
                if let Err(err) = auth_state
                    .keycloak()
                    .logout(record.auth_type, &record.refresh_token)
                    .await
                {
                    warn!("Failed to revoke refresh token at provider: {err}");
                }
            }
            Err(StoreError::NotFound) => {}
            Err(err) => error!("Failed to load session during logout: {err}"),
        }
        if let Err(err) = delete_session(&pool, &token_hash).await {
            error!("Failed to delete session: {err}");
        }
    }

    // Always clear every auth cookie, even if the session record was missing.
    let mut response_headers = HeaderMap::new();
    append_cleared_auth_cookies(&mut response_headers, auth_state.config());
    (StatusCode::NO_CONTENT, response_headers).into_response()
}

/// Build a secure `HttpOnly` cookie for the session id.
pub(crate) fn session_cookie(
    config: &AuthConfig,
    token: &str,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let ttl_seconds = config.session_ttl_seconds();
    let secure = config.cookie_secure();
    let mut cookie = format!(
        "{SESSION_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={ttl_seconds}"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// Cookie carrying the short-lived provider access token.
pub(crate) fn bearer_cookie(
    config: &AuthConfig,
    token: &str,
    expires_in: Option<u64>,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let ttl_seconds = expires_in.unwrap_or(DEFAULT_BEARER_COOKIE_TTL_SECONDS);
    let secure = config.cookie_secure();
    let mut cookie = format!(
        "{BEARER_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={ttl_seconds}"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// Expire the session, bearer, and CSRF cookies in one response.
pub(crate) fn append_cleared_auth_cookies(headers: &mut HeaderMap, config: &AuthConfig) {
    for name in [SESSION_COOKIE_NAME, BEARER_COOKIE_NAME] {
        match clear_cookie(name, config) {
            Ok(cookie) => {
                headers.append(SET_COOKIE, cookie);
            }
            Err(err) => error!("Failed to build expired {name} cookie: {err}"),
        }
    }
    match csrf::clear_csrf_cookie(config) {
        Ok(cookie) => {
            headers.append(SET_COOKIE, cookie);
        }
        Err(err) => error!("Failed to build expired CSRF cookie: {err}"),
    }
}

fn clear_cookie(name: &str, config: &AuthConfig) -> Result<HeaderValue, InvalidHeaderValue> {
    let secure = config.cookie_secure();
    let mut cookie = format!("{name}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// A bearer token presented either in `Authorization` or its cookie.
fn extract_presented_bearer(headers: &HeaderMap) -> Option<String> {
    extract_bearer_token(headers).or_else(|| cookie_value(headers, BEARER_COOKIE_NAME))
}
