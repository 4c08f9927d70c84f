//! Session rotation: exchange the stored refresh token for fresh material.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    response::{IntoResponse, Response},
};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::warn;

use super::csrf;
use super::error::AuthError;
use super::keycloak::GrantError;
use super::session::{SESSION_COOKIE_NAME, bearer_cookie};
use super::state::AuthState;
use super::storage::{delete_session, lookup_session, rotate_session};
use super::types::RefreshResponse;
use super::utils::{cookie_value, hash_session_token};

#[utoipa::path(
    post,
    path = "/v1/auth/refresh",
    responses(
        (status = 200, description = "Session rotated; fresh bearer cookie issued", body = RefreshResponse),
        (status = 401, description = "No session, or the provider revoked it"),
        (status = 403, description = "CSRF validation failed"),
        (status = 500, description = "Provider or storage failure")
    ),
    tag = "auth"
)]
pub async fn refresh(
    headers: HeaderMap,
    pool: Extension<SqlitePool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Response {
    match handle_refresh(&headers, &pool, &auth_state).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn handle_refresh(
    headers: &HeaderMap,
    pool: &SqlitePool,
    auth_state: &AuthState,
) -> Result<Response, AuthError> {
    let config = auth_state.config();
    csrf::validate(headers, config)?;

    let token = cookie_value(headers, SESSION_COOKIE_NAME).ok_or(AuthError::SessionNotFound)?;
    let token_hash = hash_session_token(&token);
    let record = lookup_session(pool, &token_hash).await?;

    let tokens = match auth_state
        .keycloak()
        .refresh_grant(record.auth_type, &record.refresh_token)
        .await
    {
        Ok(tokens) => tokens,
        Err(GrantError::BadCredentials | GrantError::SecondFactorRequired) => {
            // The provider no longer honors the refresh token; the session is
            // dead on our side too.
            if let Err(err) = delete_session(pool, &token_hash).await {
                warn!("Failed to delete revoked session: {err}");
            }
            return Err(AuthError::SessionNotFound);
        }
        Err(GrantError::Provider(err)) => return Err(AuthError::Provider(err)),
    };

    // Keycloak rotates the refresh token on every grant; keep the old one
    // only if the provider chose not to send a replacement.
    let new_refresh_token = tokens
        .refresh_token
        .unwrap_or_else(|| record.refresh_token.clone());
    let rotated = rotate_session(pool, &token_hash, &new_refresh_token).await?;

    let mut response_headers = HeaderMap::new();
    response_headers.append(
        SET_COOKIE,
        bearer_cookie(config, &tokens.access_token, tokens.expires_in)
            .map_err(|_| AuthError::Internal("bearer cookie construction failed"))?,
    );

    let body = RefreshResponse {
        user_id: rotated.user_id.map(|id| id.to_string()),
        auth_type: rotated.auth_type,
    };
    Ok((StatusCode::OK, response_headers, Json(body)).into_response())
}
