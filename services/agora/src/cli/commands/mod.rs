pub mod auth;
pub mod logging;

use clap::{
    Arg, ColorChoice, Command,
    builder::styling::{AnsiColor, Effects, Styles},
};

/// Validate argument combinations clap cannot express on its own.
///
/// # Errors
/// Returns an error string if the identity provider URL has an unsupported
/// scheme.
pub fn validate(matches: &clap::ArgMatches) -> Result<(), String> {
    let Some(url) = matches.get_one::<String>("keycloak-base-url") else {
        return Ok(()); // Reported as missing by dispatch
    };

    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(format!(
            "--keycloak-base-url must be an http(s) URL, got: {url}"
        ));
    }
    Ok(())
}

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("agora")
        .about("Marketplace auth/session service")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .help("Port to listen on")
                .default_value("8080")
                .env("AGORA_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("dsn")
                .short('d')
                .long("dsn")
                .help("Session store connection string")
                .long_help(
                    "Session store connection string. The SQLite database file is created on first start if it does not exist.",
                )
                .env("AGORA_DSN")
                .default_value("sqlite://agora-sessions.db"),
        );

    let command = auth::with_args(command);
    logging::with_args(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new() {
        let command = new();

        assert_eq!(command.get_name(), "agora");
        assert_eq!(
            command.get_about().map(ToString::to_string),
            Some("Marketplace auth/session service".to_string())
        );
        assert_eq!(
            command.get_version().map(ToString::to_string),
            Some(env!("CARGO_PKG_VERSION").to_string())
        );
    }

    #[test]
    fn test_check_port_and_dsn() {
        let command = new();
        let matches = command.get_matches_from(vec![
            "agora",
            "--port",
            "8080",
            "--dsn",
            "sqlite:///var/lib/agora/sessions.db",
            "--keycloak-base-url",
            "https://id.agora-market.dev",
            "--client-secret",
            "s3cr3t",
        ]);

        assert_eq!(matches.get_one::<u16>("port").copied(), Some(8080));
        assert_eq!(
            matches.get_one::<String>("dsn").cloned(),
            Some("sqlite:///var/lib/agora/sessions.db".to_string())
        );
        assert_eq!(
            matches.get_one::<String>("keycloak-base-url").cloned(),
            Some("https://id.agora-market.dev".to_string())
        );
        assert!(validate(&matches).is_ok());
    }

    #[test]
    fn test_check_env() {
        temp_env::with_vars(
            [
                (
                    "AGORA_KEYCLOAK_BASE_URL",
                    Some("https://id.agora-market.dev"),
                ),
                ("AGORA_PORT", Some("443")),
                ("AGORA_DSN", Some("sqlite://sessions.db")),
                ("AGORA_SESSION_TTL_SECONDS", Some("600")),
                ("AGORA_CSRF_ALLOW_MISSING", Some("true")),
                ("AGORA_LOG_LEVEL", Some("info")),
            ],
            || {
                let command = new();
                let matches = command.get_matches_from(vec!["agora"]);
                assert_eq!(matches.get_one::<u16>("port").copied(), Some(443));
                assert_eq!(
                    matches.get_one::<String>("dsn").cloned(),
                    Some("sqlite://sessions.db".to_string())
                );
                assert_eq!(
                    matches.get_one::<i64>("session-ttl-seconds").copied(),
                    Some(600)
                );
                assert!(matches.get_flag("csrf-allow-missing"));
                assert_eq!(
                    matches.get_one::<u8>(logging::ARG_VERBOSITY).copied(),
                    Some(2)
                );
            },
        );
    }

    #[test]
    fn test_check_log_level_env() {
        // loop cover all possible value_parse
        let levels = ["error", "warn", "info", "debug", "trace"];
        for (index, &level) in levels.iter().enumerate() {
            temp_env::with_vars(
                [
                    ("AGORA_LOG_LEVEL", Some(level)),
                    (
                        "AGORA_KEYCLOAK_BASE_URL",
                        Some("https://id.agora-market.dev"),
                    ),
                ],
                || {
                    let command = new();
                    let matches = command.get_matches_from(vec!["agora"]);
                    assert_eq!(
                        matches.get_one::<u8>(logging::ARG_VERBOSITY).copied(),
                        u8::try_from(index).ok()
                    );
                },
            );
        }
    }

    #[test]
    fn test_check_log_level_verbosity() {
        // loop cover all possible value_parse
        let levels = ["error", "warn", "info", "debug", "trace"];
        for (index, _) in levels.iter().enumerate() {
            temp_env::with_vars([("AGORA_LOG_LEVEL", None::<String>)], || {
                let mut args = vec![
                    "agora".to_string(),
                    "--keycloak-base-url".to_string(),
                    "https://id.agora-market.dev".to_string(),
                ];

                // Add the appropriate number of "-v" flags based on the index
                if index > 0 {
                    let v = format!("-{}", "v".repeat(index));
                    args.push(v);
                }

                let command = new();

                let matches = command.get_matches_from(args);

                assert_eq!(
                    matches.get_one::<u8>(logging::ARG_VERBOSITY).copied(),
                    u8::try_from(index).ok()
                );
            });
        }
    }

    #[test]
    fn test_validate_rejects_non_http_scheme() {
        temp_env::with_vars([("AGORA_KEYCLOAK_BASE_URL", None::<&str>)], || {
            let command = new();
            let matches = command.get_matches_from(vec![
                "agora",
                "--keycloak-base-url",
                "ldap://id.agora-market.dev",
            ]);
            assert!(validate(&matches).is_err());
        });
    }

    #[test]
    fn test_validate_accepts_http_for_development() {
        temp_env::with_vars([("AGORA_KEYCLOAK_BASE_URL", None::<&str>)], || {
            let command = new();
            let matches = command.get_matches_from(vec![
                "agora",
                "--keycloak-base-url",
                "http://localhost:8081",
            ]);
            assert!(validate(&matches).is_ok());
        });
    }
}
