//! Auth configuration and shared per-process state.

use anyhow::Result;
use secrecy::SecretString;

use super::keycloak::KeycloakClient;

const DEFAULT_SESSION_TTL_SECONDS: i64 = 12 * 60 * 60;
const DEFAULT_CSRF_TTL_SECONDS: i64 = 60 * 60;
const DEFAULT_CLIENT_ID: &str = "agora-web";
const DEFAULT_PROVIDER_TIMEOUT_SECONDS: u64 = 5;
const DEFAULT_PROVIDER_RETRY_ATTEMPTS: u32 = 3;
const DEFAULT_PROVIDER_BACKOFF_BASE_MS: u64 = 100;
const DEFAULT_PROVIDER_BACKOFF_MAX_MS: u64 = 2_000;
const DEFAULT_SWEEP_INTERVAL_SECONDS: u64 = 300;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    keycloak_base_url: String,
    frontend_base_url: String,
    client_id: String,
    client_secret: Option<SecretString>,
    session_ttl_seconds: i64,
    csrf_ttl_seconds: i64,
    csrf_allow_missing: bool,
    provider_timeout_seconds: u64,
    provider_retry_attempts: u32,
    provider_backoff_base_ms: u64,
    provider_backoff_max_ms: u64,
    sweep_interval_seconds: u64,
}

impl AuthConfig {
    #[must_use]
    pub fn new(keycloak_base_url: String, frontend_base_url: String) -> Self {
        Self {
            keycloak_base_url,
            frontend_base_url,
            client_id: DEFAULT_CLIENT_ID.to_string(),
            client_secret: None,
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            csrf_ttl_seconds: DEFAULT_CSRF_TTL_SECONDS,
            csrf_allow_missing: false,
            provider_timeout_seconds: DEFAULT_PROVIDER_TIMEOUT_SECONDS,
            provider_retry_attempts: DEFAULT_PROVIDER_RETRY_ATTEMPTS,
            provider_backoff_base_ms: DEFAULT_PROVIDER_BACKOFF_BASE_MS,
            provider_backoff_max_ms: DEFAULT_PROVIDER_BACKOFF_MAX_MS,
            sweep_interval_seconds: DEFAULT_SWEEP_INTERVAL_SECONDS,
        }
    }

    #[must_use]
    pub fn with_client_id(mut self, client_id: String) -> Self {
        self.client_id = client_id;
        self
    }

    #[must_use]
    pub fn with_client_secret(mut self, client_secret: Option<SecretString>) -> Self {
        self.client_secret = client_secret;
        self
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_csrf_ttl_seconds(mut self, seconds: i64) -> Self {
        self.csrf_ttl_seconds = seconds;
        self
    }

    /// Development-only escape hatch: treat requests with NO CSRF material
    /// as valid. Present tokens are still compared. Never enable this in
    /// production.
    #[must_use]
    pub fn with_csrf_allow_missing(mut self, allow: bool) -> Self {
        self.csrf_allow_missing = allow;
        self
    }

    #[must_use]
    pub fn with_provider_timeout_seconds(mut self, seconds: u64) -> Self {
        self.provider_timeout_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_provider_retry_attempts(mut self, attempts: u32) -> Self {
        self.provider_retry_attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_provider_backoff_base_ms(mut self, ms: u64) -> Self {
        self.provider_backoff_base_ms = ms;
        self
    }

    #[must_use]
    pub fn with_provider_backoff_max_ms(mut self, ms: u64) -> Self {
        self.provider_backoff_max_ms = ms;
        self
    }

    #[must_use]
    pub fn with_sweep_interval_seconds(mut self, seconds: u64) -> Self {
        self.sweep_interval_seconds = seconds;
        self
    }

    #[must_use]
    pub fn keycloak_base_url(&self) -> &str {
        &self.keycloak_base_url
    }

    #[must_use]
    pub fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub(crate) fn client_secret(&self) -> Option<&SecretString> {
        self.client_secret.as_ref()
    }

    #[must_use]
    pub fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl_seconds
    }

    #[must_use]
    pub fn csrf_ttl_seconds(&self) -> i64 {
        self.csrf_ttl_seconds
    }

    pub(crate) fn csrf_allow_missing(&self) -> bool {
        self.csrf_allow_missing
    }

    #[must_use]
    pub fn provider_timeout_seconds(&self) -> u64 {
        self.provider_timeout_seconds
    }

    pub(crate) fn provider_retry_attempts(&self) -> u32 {
        self.provider_retry_attempts
    }

    pub(crate) fn provider_backoff_base_ms(&self) -> u64 {
        self.provider_backoff_base_ms
    }

    pub(crate) fn provider_backoff_max_ms(&self) -> u64 {
        self.provider_backoff_max_ms
    }

    #[must_use]
    pub fn sweep_interval_seconds(&self) -> u64 {
        self.sweep_interval_seconds
    }

    /// Only mark cookies secure when the frontend is served over HTTPS.
    pub(crate) fn cookie_secure(&self) -> bool {
        self.frontend_base_url.starts_with("https://")
    }
}

pub struct AuthState {
    config: AuthConfig,
    keycloak: KeycloakClient,
}

impl AuthState {
    /// Build shared auth state, including the provider HTTP client.
    ///
    /// # Errors
    /// Returns an error if the provider client cannot be constructed.
    pub fn new(config: AuthConfig) -> Result<Self> {
        let keycloak = KeycloakClient::new(&config)?;
        Ok(Self { config, keycloak })
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub(crate) fn keycloak(&self) -> &KeycloakClient {
        &self.keycloak
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_overrides() {
        let config = AuthConfig::new(
            "https://id.agora.test".to_string(),
            "https://agora.test".to_string(),
        );

        assert_eq!(config.keycloak_base_url(), "https://id.agora.test");
        assert_eq!(config.client_id(), super::DEFAULT_CLIENT_ID);
        assert_eq!(
            config.session_ttl_seconds(),
            super::DEFAULT_SESSION_TTL_SECONDS
        );
        assert_eq!(config.csrf_ttl_seconds(), super::DEFAULT_CSRF_TTL_SECONDS);
        assert!(!config.csrf_allow_missing());
        assert_eq!(
            config.provider_retry_attempts(),
            super::DEFAULT_PROVIDER_RETRY_ATTEMPTS
        );

        let config = config
            .with_client_id("agora-admin".to_string())
            .with_session_ttl_seconds(60)
            .with_csrf_ttl_seconds(120)
            .with_csrf_allow_missing(true)
            .with_provider_timeout_seconds(2)
            .with_provider_retry_attempts(1)
            .with_provider_backoff_base_ms(10)
            .with_provider_backoff_max_ms(50)
            .with_sweep_interval_seconds(30);

        assert_eq!(config.client_id(), "agora-admin");
        assert_eq!(config.session_ttl_seconds(), 60);
        assert_eq!(config.csrf_ttl_seconds(), 120);
        assert!(config.csrf_allow_missing());
        assert_eq!(config.provider_timeout_seconds(), 2);
        assert_eq!(config.provider_retry_attempts(), 1);
        assert_eq!(config.provider_backoff_base_ms(), 10);
        assert_eq!(config.provider_backoff_max_ms(), 50);
        assert_eq!(config.sweep_interval_seconds(), 30);
    }

    #[test]
    fn cookies_secure_only_over_https_frontend() {
        let secure = AuthConfig::new(
            "https://id.agora.test".to_string(),
            "https://agora.test".to_string(),
        );
        assert!(secure.cookie_secure());

        let insecure = AuthConfig::new(
            "http://localhost:8081".to_string(),
            "http://localhost:3000".to_string(),
        );
        assert!(!insecure.cookie_secure());
    }

    #[test]
    fn auth_state_exposes_config() -> Result<()> {
        let config = AuthConfig::new(
            "https://id.agora.test".to_string(),
            "https://agora.test".to_string(),
        );
        let state = AuthState::new(config)?;
        assert_eq!(state.config().client_id(), super::DEFAULT_CLIENT_ID);
        Ok(())
    }
}
