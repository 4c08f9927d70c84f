//! Login endpoint: CSRF gate, provider grant, session establishment.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    response::{IntoResponse, Response},
};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::super::BearerVerifier;
use super::csrf;
use super::error::AuthError;
use super::keycloak::{GrantError, TokenSet};
use super::session::{bearer_cookie, session_cookie};
use super::state::AuthState;
use super::storage::create_session;
use super::types::{LoginRequest, LoginResponse};
use super::utils::generate_csrf_token;

/// Per-attempt login state machine.
///
/// A single HTTP request walks several transitions: the provider answers one
/// grant call, and the outcome decides whether the attempt ended
/// authenticated, failed, or parked awaiting a second factor (the client
/// then retries with `otp` set).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum LoginFlow {
    Idle,
    CredentialsSubmitted,
    AwaitingSecondFactor,
    Authenticated,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum LoginEvent {
    Submit,
    ChallengeSecondFactor,
    SecondFactorVerified,
    Succeed,
    Fail,
    Reset,
}

impl LoginFlow {
    pub(super) fn advance(self, event: LoginEvent) -> Self {
        let next = match (self, event) {
            (Self::Idle, LoginEvent::Submit) => Self::CredentialsSubmitted,
            (Self::CredentialsSubmitted, LoginEvent::ChallengeSecondFactor) => {
                Self::AwaitingSecondFactor
            }
            (Self::CredentialsSubmitted, LoginEvent::Succeed)
            | (Self::AwaitingSecondFactor, LoginEvent::SecondFactorVerified) => Self::Authenticated,
            (
                Self::Idle | Self::CredentialsSubmitted | Self::AwaitingSecondFactor,
                LoginEvent::Fail,
            ) => Self::Failed,
            (Self::Failed | Self::Authenticated, LoginEvent::Reset) => Self::Idle,
            // Anything else is a protocol bug; land in Failed rather than
            // silently staying put.
            (state, event) => {
                warn!("invalid login transition {state:?} + {event:?}");
                Self::Failed
            }
        };
        debug!("login flow {self:?} -> {next:?}");
        next
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Authenticated; session cookie issued", body = LoginResponse),
        (status = 400, description = "Malformed request"),
        (status = 401, description = "Bad credentials or second factor required"),
        (status = 403, description = "CSRF validation failed"),
        (status = 500, description = "Provider or storage failure")
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    pool: Extension<SqlitePool>,
    auth_state: Extension<Arc<AuthState>>,
    verifier: Extension<Arc<BearerVerifier>>,
    Json(request): Json<LoginRequest>,
) -> Response {
    match handle_login(&headers, &pool, &auth_state, &verifier, request).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn handle_login(
    headers: &HeaderMap,
    pool: &SqlitePool,
    auth_state: &AuthState,
    verifier: &BearerVerifier,
    request: LoginRequest,
) -> Result<Response, AuthError> {
    let config = auth_state.config();

    // CSRF short-circuits before the credentials ever reach the provider.
    csrf::validate(headers, config)?;
    let mut flow = LoginFlow::Idle.advance(LoginEvent::Submit);

    if request.username.trim().is_empty() {
        return Err(AuthError::MalformedRequest("Missing username"));
    }
    if request.password.is_empty() {
        return Err(AuthError::MalformedRequest("Missing password"));
    }

    let tokens = match auth_state
        .keycloak()
        .password_grant(
            request.auth_type,
            request.username.trim(),
            &request.password,
            request.otp.as_deref(),
        )
        .await
    {
        Ok(tokens) => {
            flow = if request.otp.is_some() {
                flow.advance(LoginEvent::ChallengeSecondFactor)
                    .advance(LoginEvent::SecondFactorVerified)
            } else {
                flow.advance(LoginEvent::Succeed)
            };
            tokens
        }
        Err(GrantError::SecondFactorRequired) => {
            let _ = flow.advance(LoginEvent::ChallengeSecondFactor);
            return Err(AuthError::SecondFactorRequired);
        }
        Err(GrantError::BadCredentials) => {
            let _ = flow.advance(LoginEvent::Fail);
            return Err(AuthError::BadCredentials);
        }
        Err(GrantError::Provider(err)) => {
            let _ = flow.advance(LoginEvent::Fail);
            return Err(AuthError::Provider(err));
        }
    };
    debug_assert_eq!(flow, LoginFlow::Authenticated);

    establish_session(pool, auth_state, verifier, request.auth_type, tokens).await
}

/// Create the session record and assemble the cookie-bearing response.
/// Only runs after the provider call fully succeeded, so a timed-out grant
/// can never leave a half-created session behind.
async fn establish_session(
    pool: &SqlitePool,
    auth_state: &AuthState,
    verifier: &BearerVerifier,
    auth_type: super::types::AuthType,
    tokens: TokenSet,
) -> Result<Response, AuthError> {
    let config = auth_state.config();

    let Some(refresh_token) = tokens.refresh_token else {
        return Err(AuthError::Provider(
            super::keycloak::ProviderError::Rejected {
                status: 200,
                error: "grant response carried no refresh token".to_string(),
            },
        ));
    };

    // The verifier is the authority on the token's identity claims. A
    // verification miss (e.g. certs endpoint briefly down) degrades to an
    // anonymous session record rather than failing a valid login.
    let user_id = match verifier.verify(auth_type, &tokens.access_token).await {
        Some(claims) => Uuid::parse_str(&claims.sub).ok(),
        None => {
            warn!("access token from provider did not verify; storing session without user id");
            None
        }
    };

    let session_id = create_session(
        pool,
        &refresh_token,
        auth_type,
        user_id,
        config.session_ttl_seconds(),
    )
    .await?;

    // Rotate CSRF material along with the new session.
    let csrf_token =
        generate_csrf_token().map_err(|_| AuthError::Internal("CSRF token generation failed"))?;

    let mut response_headers = HeaderMap::new();
    response_headers.append(
        SET_COOKIE,
        session_cookie(config, &session_id)
            .map_err(|_| AuthError::Internal("session cookie construction failed"))?,
    );
    response_headers.append(
        SET_COOKIE,
        bearer_cookie(config, &tokens.access_token, tokens.expires_in)
            .map_err(|_| AuthError::Internal("bearer cookie construction failed"))?,
    );
    response_headers.append(
        SET_COOKIE,
        csrf::csrf_cookie(config, &csrf_token)
            .map_err(|_| AuthError::Internal("CSRF cookie construction failed"))?,
    );

    let body = LoginResponse {
        user_id: user_id.map(|id| id.to_string()),
        auth_type,
        csrf_token,
    };
    Ok((StatusCode::OK, response_headers, Json(body)).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_without_second_factor() {
        let flow = LoginFlow::Idle
            .advance(LoginEvent::Submit)
            .advance(LoginEvent::Succeed);
        assert_eq!(flow, LoginFlow::Authenticated);
    }

    #[test]
    fn happy_path_with_second_factor() {
        let flow = LoginFlow::Idle
            .advance(LoginEvent::Submit)
            .advance(LoginEvent::ChallengeSecondFactor)
            .advance(LoginEvent::SecondFactorVerified);
        assert_eq!(flow, LoginFlow::Authenticated);
    }

    #[test]
    fn every_pre_terminal_state_can_fail() {
        for state in [
            LoginFlow::Idle,
            LoginFlow::CredentialsSubmitted,
            LoginFlow::AwaitingSecondFactor,
        ] {
            assert_eq!(state.advance(LoginEvent::Fail), LoginFlow::Failed);
        }
    }

    #[test]
    fn terminal_states_reset_to_idle() {
        assert_eq!(
            LoginFlow::Failed.advance(LoginEvent::Reset),
            LoginFlow::Idle
        );
        assert_eq!(
            LoginFlow::Authenticated.advance(LoginEvent::Reset),
            LoginFlow::Idle
        );
    }

    #[test]
    fn invalid_transitions_land_in_failed() {
        assert_eq!(
            LoginFlow::Idle.advance(LoginEvent::Succeed),
            LoginFlow::Failed
        );
        assert_eq!(
            LoginFlow::Authenticated.advance(LoginEvent::Submit),
            LoginFlow::Failed
        );
        assert_eq!(
            LoginFlow::CredentialsSubmitted.advance(LoginEvent::SecondFactorVerified),
            LoginFlow::Failed
        );
    }
}
