use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use secrecy::SecretString;

pub fn with_args(command: Command) -> Command {
    let command = with_provider_args(command);
    let command = with_session_args(command);
    with_csrf_args(command)
}

fn with_provider_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("keycloak-base-url")
                .long("keycloak-base-url")
                .help("Identity provider base URL (realm endpoints live under it)")
                .env("AGORA_KEYCLOAK_BASE_URL"),
        )
        .arg(
            Arg::new("client-id")
                .long("client-id")
                .help("OIDC client id used for direct grants")
                .env("AGORA_CLIENT_ID")
                .default_value("agora-web"),
        )
        .arg(
            Arg::new("client-secret")
                .long("client-secret")
                .help("OIDC client secret, when the client is confidential")
                .env("AGORA_CLIENT_SECRET"),
        )
        .arg(
            Arg::new("provider-timeout-seconds")
                .long("provider-timeout-seconds")
                .help("Request timeout for identity provider calls")
                .env("AGORA_PROVIDER_TIMEOUT_SECONDS")
                .default_value("5")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("provider-retry-attempts")
                .long("provider-retry-attempts")
                .help("Attempts per provider call before giving up")
                .env("AGORA_PROVIDER_RETRY_ATTEMPTS")
                .default_value("3")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("provider-backoff-base-ms")
                .long("provider-backoff-base-ms")
                .help("Base delay for provider retry backoff")
                .env("AGORA_PROVIDER_BACKOFF_BASE_MS")
                .default_value("100")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("provider-backoff-max-ms")
                .long("provider-backoff-max-ms")
                .help("Max delay for provider retry backoff")
                .env("AGORA_PROVIDER_BACKOFF_MAX_MS")
                .default_value("2000")
                .value_parser(clap::value_parser!(u64)),
        )
}

fn with_session_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("frontend-base-url")
                .long("frontend-base-url")
                .help("Frontend base URL; sets the CORS origin and the Secure cookie gate")
                .env("AGORA_FRONTEND_BASE_URL")
                .default_value("https://agora-market.dev"),
        )
        .arg(
            Arg::new("session-ttl-seconds")
                .long("session-ttl-seconds")
                .help("Session cookie and record TTL in seconds")
                .env("AGORA_SESSION_TTL_SECONDS")
                .default_value("43200")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("sweep-interval-seconds")
                .long("sweep-interval-seconds")
                .help("Interval between expired-session sweeps")
                .env("AGORA_SWEEP_INTERVAL_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(u64)),
        )
}

fn with_csrf_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("csrf-ttl-seconds")
                .long("csrf-ttl-seconds")
                .help("CSRF cookie TTL in seconds")
                .env("AGORA_CSRF_TTL_SECONDS")
                .default_value("3600")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("csrf-allow-missing")
                .long("csrf-allow-missing")
                .help("DEVELOPMENT ONLY: accept requests with no CSRF material")
                .env("AGORA_CSRF_ALLOW_MISSING")
                .action(ArgAction::SetTrue),
        )
}

/// Parsed auth-related options.
#[derive(Debug)]
pub struct Options {
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

impl Options {
    /// Extract auth options from parsed matches.
    ///
    /// # Errors
    /// Returns an error if the provider base URL is missing.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let keycloak_base_url = matches
            .get_one::<String>("keycloak-base-url")
            .cloned()
            .context("missing required argument: --keycloak-base-url")?;

        Ok(Self {
            keycloak_base_url,
            frontend_base_url: matches
                .get_one::<String>("frontend-base-url")
                .cloned()
                .unwrap_or_default(),
            client_id: matches
                .get_one::<String>("client-id")
                .cloned()
                .unwrap_or_default(),
            client_secret: matches
                .get_one::<String>("client-secret")
                .map(|secret| SecretString::from(secret.clone())),
            session_ttl_seconds: matches
                .get_one::<i64>("session-ttl-seconds")
                .copied()
                .unwrap_or(43_200),
            csrf_ttl_seconds: matches
                .get_one::<i64>("csrf-ttl-seconds")
                .copied()
                .unwrap_or(3_600),
            csrf_allow_missing: matches.get_flag("csrf-allow-missing"),
            provider_timeout_seconds: matches
                .get_one::<u64>("provider-timeout-seconds")
                .copied()
                .unwrap_or(5),
            provider_retry_attempts: matches
                .get_one::<u32>("provider-retry-attempts")
                .copied()
                .unwrap_or(3),
            provider_backoff_base_ms: matches
                .get_one::<u64>("provider-backoff-base-ms")
                .copied()
                .unwrap_or(100),
            provider_backoff_max_ms: matches
                .get_one::<u64>("provider-backoff-max-ms")
                .copied()
                .unwrap_or(2_000),
            sweep_interval_seconds: matches
                .get_one::<u64>("sweep-interval-seconds")
                .copied()
                .unwrap_or(300),
        })
    }
}
