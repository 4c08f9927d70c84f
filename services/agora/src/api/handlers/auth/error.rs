//! The auth error taxonomy and its HTTP mapping.
//!
//! Every failure a handler can hit is one of these variants, matched
//! exhaustively for the response status. Client-facing messages stay
//! generic; the variant (and source error) is only logged server-side.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::{error, warn};

use super::keycloak::ProviderError;
use super::storage::StoreError;
use super::types::ErrorResponse;

#[derive(Debug, Error)]
pub(crate) enum AuthError {
    #[error("CSRF token missing")]
    CsrfMissing,
    #[error("CSRF token mismatch")]
    CsrfMismatch,
    /// Bearer token failed verification; the subtype is in the source error.
    #[error("bearer token rejected")]
    Token(#[from] bearer_token::Error),
    #[error("bad credentials")]
    BadCredentials,
    #[error("second factor required")]
    SecondFactorRequired,
    #[error("session not found")]
    SessionNotFound,
    /// The session store failed. Never downgraded to "no session": a
    /// transient storage problem must not log users out.
    #[error("session store unavailable")]
    Store(#[source] StoreError),
    #[error("identity provider error")]
    Provider(#[source] ProviderError),
    #[error("malformed request: {0}")]
    MalformedRequest(&'static str),
    /// Server-side construction failure (e.g. a cookie value that won't
    /// serialize). Should not happen; logged with context.
    #[error("internal error: {0}")]
    Internal(&'static str),
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => Self::SessionNotFound,
            other => Self::Store(other),
        }
    }
}

impl AuthError {
    pub(crate) const fn status(&self) -> StatusCode {
        match self {
            Self::CsrfMissing | Self::CsrfMismatch => StatusCode::FORBIDDEN,
            Self::Token(_)
            | Self::BadCredentials
            | Self::SecondFactorRequired
            | Self::SessionNotFound => StatusCode::UNAUTHORIZED,
            Self::MalformedRequest(_) => StatusCode::BAD_REQUEST,
            Self::Store(_) | Self::Provider(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// What the client is allowed to see.
    const fn public_message(&self) -> &'static str {
        match self {
            Self::CsrfMissing | Self::CsrfMismatch => "CSRF validation failed",
            Self::Token(_) | Self::BadCredentials => "Authentication failed",
            Self::SecondFactorRequired => "One-time code required",
            Self::SessionNotFound => "Not authenticated",
            Self::MalformedRequest(detail) => detail,
            Self::Store(_) | Self::Internal(_) => "Internal server error",
            Self::Provider(_) => "Authentication failed",
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = ?self, "auth request failed");
        } else {
            warn!(error = ?self, "auth request rejected");
        }

        let body = ErrorResponse {
            error: self.public_message().to_string(),
            otp_required: matches!(self, Self::SecondFactorRequired).then_some(true),
        };
        (status, Json(body)).into_response()
    }
}
