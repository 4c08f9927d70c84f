//! Command-line argument dispatch and server initialization.
//!
//! This module parses validated CLI arguments and maps them to the appropriate
//! action, such as starting the API server with its full configuration state.

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::auth;
use anyhow::{Context, Result};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;

    // Validate the provider URL scheme relative to what clap can't express
    crate::cli::commands::validate(matches).map_err(|e| anyhow::anyhow!(e))?;

    let auth_opts = auth::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn,
        keycloak_base_url: auth_opts.keycloak_base_url,
        frontend_base_url: auth_opts.frontend_base_url,
        client_id: auth_opts.client_id,
        client_secret: auth_opts.client_secret,
        session_ttl_seconds: auth_opts.session_ttl_seconds,
        csrf_ttl_seconds: auth_opts.csrf_ttl_seconds,
        csrf_allow_missing: auth_opts.csrf_allow_missing,
        provider_timeout_seconds: auth_opts.provider_timeout_seconds,
        provider_retry_attempts: auth_opts.provider_retry_attempts,
        provider_backoff_base_ms: auth_opts.provider_backoff_base_ms,
        provider_backoff_max_ms: auth_opts.provider_backoff_max_ms,
        sweep_interval_seconds: auth_opts.sweep_interval_seconds,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keycloak_base_url_required() {
        temp_env::with_vars(
            [
                ("AGORA_KEYCLOAK_BASE_URL", None::<&str>),
                ("AGORA_DSN", Some("sqlite://sessions.db")),
            ],
            || {
                let command = crate::cli::commands::new();
                let matches = command.get_matches_from(vec!["agora"]);
                let result = handler(&matches);
                assert!(result.is_err());
                if let Err(err) = result {
                    assert!(
                        err.to_string()
                            .contains("missing required argument: --keycloak-base-url")
                    );
                }
            },
        );
    }

    #[test]
    fn full_server_args_pass_through() {
        temp_env::with_vars(
            [
                (
                    "AGORA_KEYCLOAK_BASE_URL",
                    Some("https://id.agora-market.dev"),
                ),
                ("AGORA_CLIENT_SECRET", Some("s3cr3t")),
            ],
            || {
                let command = crate::cli::commands::new();
                let matches = command.get_matches_from(vec![
                    "agora",
                    "--port",
                    "9000",
                    "--dsn",
                    "sqlite://custom.db",
                    "--session-ttl-seconds",
                    "600",
                    "--csrf-allow-missing",
                ]);
                let result = handler(&matches);
                assert!(result.is_ok());
                if let Ok(Action::Server(args)) = result {
                    assert_eq!(args.port, 9000);
                    assert_eq!(args.dsn, "sqlite://custom.db");
                    assert_eq!(args.keycloak_base_url, "https://id.agora-market.dev");
                    assert_eq!(args.session_ttl_seconds, 600);
                    assert!(args.csrf_allow_missing);
                    assert!(args.client_secret.is_some());
                }
            },
        );
    }
}
