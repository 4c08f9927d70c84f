//! # Agora (marketplace auth/session authority)
//!
//! `agora` is the authentication and session service for the Agora
//! marketplace platform. It fronts a Keycloak identity provider and owns the
//! cookie-facing side of authentication: CSRF double-submit tokens, opaque
//! server-side sessions, and bearer-token verification against the
//! provider's published key sets.
//!
//! ## Tenancy (auth types)
//!
//! The platform serves three populations, each backed by its own provider
//! realm: `customers`, `developers`, and `vendors`. A session is always
//! bound to exactly one auth type.
//!
//! ## Sessions
//!
//! Session ids are opaque 32-byte random values handed to the browser in an
//! `HttpOnly` cookie. The database stores only a SHA-256 hash of the id,
//! together with the provider-issued refresh token the session owns. Refresh
//! tokens never leave the service.
//!
//! ## CSRF
//!
//! State-changing endpoints require the double-submit pattern: the value of
//! the `agora_csrf` cookie must be echoed in the `X-CSRF-Token` header and
//! the two are compared in constant time. Logout is deliberately exempt:
//! failing to end a session is worse than allowing a forged logout.

pub mod api;
pub mod cli;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
