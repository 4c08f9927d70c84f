//! Identity provider (Keycloak) client for the direct-grant auth flows.
//!
//! Every call goes through the provider's per-realm OpenID Connect
//! endpoints. Transport failures are retried with exponential backoff;
//! definitive provider answers (4xx) are never retried.

use anyhow::{Context, Result};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{Instrument, info_span, warn};

use super::backoff;
use super::state::AuthConfig;
use super::types::AuthType;

#[derive(Debug, Error)]
pub(crate) enum ProviderError {
    /// Transport-level failure after every retry attempt.
    #[error("identity provider unreachable")]
    Unreachable(#[source] reqwest::Error),
    /// The provider answered with something other than a grant outcome.
    #[error("identity provider returned {status}: {error}")]
    Rejected { status: u16, error: String },
    #[error("identity provider response malformed")]
    Malformed(#[source] reqwest::Error),
}

#[derive(Debug, Error)]
pub(crate) enum GrantError {
    #[error("credentials rejected")]
    BadCredentials,
    /// The account needs a one-time code the request didn't carry (or
    /// carried a wrong one).
    #[error("second factor required")]
    SecondFactorRequired,
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Token material returned by a successful grant.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TokenSet {
    pub(crate) access_token: String,
    #[serde(default)]
    pub(crate) refresh_token: Option<String>,
    #[serde(default)]
    pub(crate) expires_in: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ProviderErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

pub(crate) struct KeycloakClient {
    http: Client,
    base_url: String,
    client_id: String,
    client_secret: Option<SecretString>,
    retry_attempts: u32,
    backoff_base_ms: u64,
    backoff_max_ms: u64,
}

impl KeycloakClient {
    /// Build the provider client from the auth configuration.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub(crate) fn new(config: &AuthConfig) -> Result<Self> {
        let http = Client::builder()
            .use_rustls_tls()
            .user_agent(crate::APP_USER_AGENT)
            // Login is interactive; a hung provider call must not hold the
            // request open longer than this.
            .timeout(Duration::from_secs(config.provider_timeout_seconds()))
            .build()
            .context("Failed to build identity provider HTTP client")?;

        Ok(Self {
            http,
            base_url: config.keycloak_base_url().trim_end_matches('/').to_string(),
            client_id: config.client_id().to_string(),
            client_secret: config.client_secret().cloned(),
            retry_attempts: config.provider_retry_attempts().max(1),
            backoff_base_ms: config.provider_backoff_base_ms(),
            backoff_max_ms: config.provider_backoff_max_ms(),
        })
    }

    fn token_url(&self, auth_type: AuthType) -> String {
        format!(
            "{}/realms/{}/protocol/openid-connect/token",
            self.base_url,
            auth_type.realm()
        )
    }

    fn logout_url(&self, auth_type: AuthType) -> String {
        format!(
            "{}/realms/{}/protocol/openid-connect/logout",
            self.base_url,
            auth_type.realm()
        )
    }

    /// Resource-owner password grant, optionally carrying a one-time code.
    pub(crate) async fn password_grant(
        &self,
        auth_type: AuthType,
        username: &str,
        password: &str,
        otp: Option<&str>,
    ) -> Result<TokenSet, GrantError> {
        let mut params = vec![
            ("grant_type", "password"),
            ("client_id", self.client_id.as_str()),
            ("scope", "openid"),
            ("username", username),
            ("password", password),
        ];
        if let Some(otp) = otp {
            params.push(("totp", otp));
        }
        if let Some(secret) = &self.client_secret {
            params.push(("client_secret", secret.expose_secret()));
        }
        self.grant(&self.token_url(auth_type), &params).await
    }

    /// Refresh-token grant used for session rotation.
    pub(crate) async fn refresh_grant(
        &self,
        auth_type: AuthType,
        refresh_token: &str,
    ) -> Result<TokenSet, GrantError> {
        let mut params = vec![
            ("grant_type", "refresh_token"),
            ("client_id", self.client_id.as_str()),
            ("refresh_token", refresh_token),
        ];
        if let Some(secret) = &self.client_secret {
            params.push(("client_secret", secret.expose_secret()));
        }
        self.grant(&self.token_url(auth_type), &params).await
    }

    /// Revoke the refresh token at the provider. Callers treat this as
    /// best-effort; local session deletion never waits on it succeeding.
    pub(crate) async fn logout(
        &self,
        auth_type: AuthType,
        refresh_token: &str,
    ) -> Result<(), ProviderError> {
        let mut params = vec![
            ("client_id", self.client_id.as_str()),
            ("refresh_token", refresh_token),
        ];
        if let Some(secret) = &self.client_secret {
            params.push(("client_secret", secret.expose_secret()));
        }

        let response = self.send_form(&self.logout_url(auth_type), &params).await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        Err(ProviderError::Rejected {
            status: status.as_u16(),
            error: "logout rejected".to_string(),
        })
    }

    async fn grant(&self, url: &str, params: &[(&str, &str)]) -> Result<TokenSet, GrantError> {
        let response = self.send_form(url, params).await?;
        let status = response.status();
        if status.is_success() {
            return response
                .json::<TokenSet>()
                .await
                .map_err(|err| GrantError::Provider(ProviderError::Malformed(err)));
        }

        // Error bodies are JSON on the happy unhappy path; anything else
        // still classifies (as an unexpected provider response).
        let body = response
            .json::<ProviderErrorBody>()
            .await
            .unwrap_or_default();
        Err(classify_rejection(status.as_u16(), &body))
    }

    /// POST a form, retrying transport errors with exponential backoff.
    async fn send_form(
        &self,
        url: &str,
        params: &[(&str, &str)],
    ) -> Result<reqwest::Response, ProviderError> {
        let span = info_span!(
            "idp.request",
            http.method = "POST",
            url = %url
        );
        async {
            let mut attempt: u32 = 0;
            loop {
                match self.http.post(url).form(&params).send().await {
                    Ok(response) => return Ok(response),
                    Err(err) => {
                        if attempt + 1 >= self.retry_attempts {
                            return Err(ProviderError::Unreachable(err));
                        }
                        let backoff_time = backoff::delay_ms(
                            self.backoff_base_ms,
                            attempt,
                            Some(self.backoff_max_ms),
                            backoff::DEFAULT_FACTOR,
                        );
                        warn!(
                            "Identity provider request failed, backing off for {} ms: {}",
                            backoff_time, err
                        );
                        tokio::time::sleep(Duration::from_millis(backoff_time)).await;
                        attempt += 1;
                    }
                }
            }
        }
        .instrument(span)
        .await
    }
}

/// Map a definitive provider rejection onto the grant outcome.
///
/// Keycloak reports both "wrong password" and "missing/wrong one-time code"
/// as `invalid_grant`; the description is the only signal that a second
/// factor is involved.
fn classify_rejection(status: u16, body: &ProviderErrorBody) -> GrantError {
    let error = body.error.as_deref().unwrap_or("");
    let description = body.error_description.as_deref().unwrap_or("");

    if error == "invalid_grant" {
        if description.to_lowercase().contains("otp") {
            return GrantError::SecondFactorRequired;
        }
        return GrantError::BadCredentials;
    }

    GrantError::Provider(ProviderError::Rejected {
        status,
        error: if error.is_empty() {
            "unexpected response".to_string()
        } else {
            error.to_string()
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    fn body(error: &str, description: &str) -> ProviderErrorBody {
        ProviderErrorBody {
            error: Some(error.to_string()),
            error_description: Some(description.to_string()),
        }
    }

    #[test]
    fn invalid_grant_maps_to_bad_credentials() {
        let outcome = classify_rejection(401, &body("invalid_grant", "Invalid user credentials"));
        assert!(matches!(outcome, GrantError::BadCredentials));
    }

    #[test]
    fn otp_descriptions_map_to_second_factor() {
        for description in ["Invalid totp", "Missing TOTP", "invalid OTP code"] {
            let outcome = classify_rejection(401, &body("invalid_grant", description));
            assert!(
                matches!(outcome, GrantError::SecondFactorRequired),
                "description {description:?} should demand a second factor"
            );
        }
    }

    #[test]
    fn other_errors_surface_as_provider_rejection() {
        let outcome = classify_rejection(502, &body("server_error", "boom"));
        assert!(matches!(
            outcome,
            GrantError::Provider(ProviderError::Rejected { status: 502, .. })
        ));

        let outcome = classify_rejection(500, &ProviderErrorBody::default());
        assert!(matches!(
            outcome,
            GrantError::Provider(ProviderError::Rejected { status: 500, .. })
        ));
    }

    #[test]
    fn token_set_tolerates_extra_members() -> Result<()> {
        let token_set: TokenSet = serde_json::from_value(serde_json::json!({
            "access_token": "at",
            "refresh_token": "rt",
            "expires_in": 300,
            "token_type": "Bearer",
            "session_state": "ignored",
        }))?;
        assert_eq!(token_set.access_token, "at");
        assert_eq!(token_set.refresh_token.as_deref(), Some("rt"));
        assert_eq!(token_set.expires_in, Some(300));
        Ok(())
    }

    #[test]
    fn endpoint_urls_are_per_realm() -> Result<()> {
        let config = AuthConfig::new(
            "https://id.agora.test/".to_string(),
            "https://agora.test".to_string(),
        );
        let client = KeycloakClient::new(&config)?;
        assert_eq!(
            client.token_url(AuthType::Developers),
            "https://id.agora.test/realms/developers/protocol/openid-connect/token"
        );
        assert_eq!(
            client.logout_url(AuthType::Customers),
            "https://id.agora.test/realms/customers/protocol/openid-connect/logout"
        );
        Ok(())
    }
}
