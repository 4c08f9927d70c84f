use crate::api::{
    self,
    handlers::{BearerVerifier, auth::AuthConfig},
};
use anyhow::Result;
use secrecy::SecretString;
use std::{sync::Arc, time::Duration};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub keycloak_base_url: String,
    pub frontend_base_url: String,
    pub client_id: String,
    pub client_secret: Option<SecretString>,
    pub session_ttl_seconds: i64,
    pub csrf_ttl_seconds: i64,
    pub csrf_allow_missing: bool,
    pub provider_timeout_seconds: u64,
    pub provider_retry_attempts: u32,
    pub provider_backoff_base_ms: u64,
    pub provider_backoff_max_ms: u64,
    pub sweep_interval_seconds: u64,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the verifier cannot be built or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let verifier = Arc::new(BearerVerifier::new_remote(
        &args.keycloak_base_url,
        Duration::from_secs(args.provider_timeout_seconds),
    )?);

    let auth_config = AuthConfig::new(args.keycloak_base_url, args.frontend_base_url)
        .with_client_id(args.client_id)
        .with_client_secret(args.client_secret)
        .with_session_ttl_seconds(args.session_ttl_seconds)
        .with_csrf_ttl_seconds(args.csrf_ttl_seconds)
        .with_csrf_allow_missing(args.csrf_allow_missing)
        .with_provider_timeout_seconds(args.provider_timeout_seconds)
        .with_provider_retry_attempts(args.provider_retry_attempts)
        .with_provider_backoff_base_ms(args.provider_backoff_base_ms)
        .with_provider_backoff_max_ms(args.provider_backoff_max_ms)
        .with_sweep_interval_seconds(args.sweep_interval_seconds);

    api::new(args.port, args.dsn, verifier, auth_config).await
}
