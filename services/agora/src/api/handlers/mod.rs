//! API handlers and shared utilities for Agora.
//!
//! This module organizes the service's route handlers and provides the
//! bearer-token verifier with its per-realm JWKS cache.

pub mod auth;
pub mod health;
pub mod root;

use anyhow::{Context, Result, anyhow};
use bearer_token::{BearerTokenClaims, Error as TokenError, Jwks, peek_issuer, verify_rs256};
use reqwest::{
    Client,
    header::{ETAG, IF_NONE_MATCH},
};
use std::{
    collections::HashMap,
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant, SystemTime},
};
use tokio::sync::RwLock;
use tracing::{Instrument, error, info, info_span, warn};
use url::Url;

use self::auth::types::AuthType;

// JWKS caching: keep an in-memory key set per realm with a TTL; refresh on a
// stale cache or an unknown kid. If a refresh fails, keep the last known key
// set so verification keeps working.
const KEYSET_CACHE_TTL_SECONDS: u64 = 300;
const KEYSET_REFRESH_COOLDOWN_SECONDS: u64 = 30;

#[derive(Debug)]
enum KeysetSource {
    /// Key sets supplied at construction and never refreshed.
    Static,
    /// Key sets fetched per realm from the provider's `certs` endpoint.
    Remote { base_url: String, client: Client },
}

#[derive(Debug, Clone)]
struct KeysetCache {
    /// Last known JWKS for the realm.
    jwks: Jwks,
    /// When the key set was last successfully fetched.
    fetched_at: Instant,
    /// `ETag` from the last successful fetch, if the provider sent one.
    etag: Option<String>,
}

impl KeysetCache {
    /// A key set is fresh if within TTL; stale entries trigger a refresh attempt.
    fn is_fresh(&self) -> bool {
        self.fetched_at.elapsed() < Duration::from_secs(KEYSET_CACHE_TTL_SECONDS)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyStatus {
    /// Provider key sets are reachable (or all caches are fresh).
    Ok,
    /// At least one realm's key set could not be fetched.
    Error,
    /// Static key sets mean no external dependency.
    Static,
}

impl DependencyStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Error => "error",
            Self::Static => "static",
        }
    }

    #[must_use]
    pub const fn is_healthy(self) -> bool {
        !matches!(self, Self::Error)
    }
}

/// Verifies provider-issued bearer tokens using cached per-realm JWKS.
///
/// Used by the session endpoints to validate presented access tokens and by
/// `/health` to report provider reachability.
#[derive(Debug)]
pub struct BearerVerifier {
    /// Where key sets come from (static for tests, remote provider otherwise).
    keyset_source: KeysetSource,
    /// In-memory cached key set per realm.
    caches: RwLock<HashMap<AuthType, KeysetCache>>,
    /// Base URL used to derive the expected issuer per realm.
    issuer_base: String,
    /// Timestamp to throttle refresh attempts on unknown kid.
    last_refresh_unix: AtomicU64,
}

impl BearerVerifier {
    /// Build from fixed key sets, no remote refresh. Intended for tests and
    /// air-gapped tooling.
    #[must_use]
    pub fn new_static(keysets: HashMap<AuthType, Jwks>, issuer_base: String) -> Self {
        let caches = keysets
            .into_iter()
            .map(|(auth_type, jwks)| {
                (
                    auth_type,
                    KeysetCache {
                        jwks,
                        fetched_at: Instant::now(),
                        etag: None,
                    },
                )
            })
            .collect();
        Self {
            keyset_source: KeysetSource::Static,
            caches: RwLock::new(caches),
            issuer_base: normalize_base(&issuer_base),
            last_refresh_unix: AtomicU64::new(0),
        }
    }

    /// Build a verifier that fetches key sets from the provider.
    ///
    /// Realms are fetched lazily on first verification, so a provider that is
    /// still starting up does not block service startup; verification fails
    /// closed until the first successful fetch.
    ///
    /// # Errors
    /// Returns an error if the base URL is invalid or the HTTP client cannot
    /// be built.
    pub fn new_remote(base_url: &str, timeout: Duration) -> Result<Self> {
        let parsed = Url::parse(base_url).context("Invalid identity provider base URL")?;
        if parsed.scheme() != "https" {
            // Permitted for local development against a plain-HTTP provider.
            warn!(url = %base_url, "identity provider base URL is not https");
        }

        let client = Client::builder()
            .use_rustls_tls()
            .user_agent(crate::APP_USER_AGENT)
            .timeout(timeout)
            .build()
            .context("Failed to build JWKS HTTP client")?;

        Ok(Self {
            keyset_source: KeysetSource::Remote {
                base_url: normalize_base(base_url),
                client,
            },
            caches: RwLock::new(HashMap::new()),
            issuer_base: normalize_base(base_url),
            last_refresh_unix: AtomicU64::new(0),
        })
    }

    /// Expected `iss` value for tokens of the given auth type.
    #[must_use]
    pub fn issuer(&self, auth_type: AuthType) -> String {
        format!("{}/realms/{}", self.issuer_base, auth_type.realm())
    }

    /// Resolve a token's issuer to one of the configured auth types.
    #[must_use]
    pub fn auth_type_for_issuer(&self, issuer: &str) -> Option<AuthType> {
        AuthType::all()
            .iter()
            .copied()
            .find(|auth_type| self.issuer(*auth_type) == issuer)
    }

    /// Return a key set snapshot; refresh if stale, keep cache if refresh fails.
    async fn jwks_snapshot(&self, auth_type: AuthType) -> Option<Jwks> {
        let cached = {
            let caches = self.caches.read().await;
            caches.get(&auth_type).cloned()
        };

        if let Some(cache) = &cached
            && cache.is_fresh()
        {
            return Some(cache.jwks.clone());
        }

        if let Err(err) = self.refresh_realm(auth_type).await {
            // Refresh failure shouldn't break verification; keep using the
            // last cached key set when one exists.
            warn!(
                error = %err,
                realm = auth_type.realm(),
                "failed to refresh JWKS cache"
            );
            return cached.map(|cache| cache.jwks);
        }

        let caches = self.caches.read().await;
        caches.get(&auth_type).map(|cache| cache.jwks.clone())
    }

    /// Fetch the realm's JWKS from the provider and update the cache.
    async fn refresh_realm(&self, auth_type: AuthType) -> Result<()> {
        let (base_url, client) = match &self.keyset_source {
            KeysetSource::Static => return Ok(()),
            KeysetSource::Remote { base_url, client } => (base_url.clone(), client.clone()),
        };

        let url = format!(
            "{base_url}/realms/{}/protocol/openid-connect/certs",
            auth_type.realm()
        );
        let etag = {
            let caches = self.caches.read().await;
            caches.get(&auth_type).and_then(|cache| cache.etag.clone())
        };

        match fetch_jwks(&client, &url, etag.as_deref()).await? {
            FetchOutcome::NotModified => {
                let mut caches = self.caches.write().await;
                if let Some(cache) = caches.get_mut(&auth_type) {
                    cache.fetched_at = Instant::now();
                }
            }
            FetchOutcome::Updated { jwks, etag } => {
                if jwks.keys.is_empty() {
                    return Err(anyhow!("provider returned an empty JWKS"));
                }
                let mut caches = self.caches.write().await;
                let keys = jwks.keys.len();
                caches.insert(
                    auth_type,
                    KeysetCache {
                        jwks,
                        fetched_at: Instant::now(),
                        etag,
                    },
                );
                info!(
                    realm = auth_type.realm(),
                    keyset_keys = keys,
                    "JWKS cache refreshed"
                );
            }
        }
        Ok(())
    }

    /// Report dependency status for `/health`: refresh whatever is stale.
    pub async fn dependency_status(&self) -> DependencyStatus {
        match &self.keyset_source {
            KeysetSource::Static => DependencyStatus::Static,
            KeysetSource::Remote { base_url, .. } => {
                for auth_type in AuthType::all() {
                    let fresh = {
                        let caches = self.caches.read().await;
                        caches.get(auth_type).is_some_and(KeysetCache::is_fresh)
                    };
                    if fresh {
                        continue;
                    }
                    if let Err(err) = self.refresh_realm(*auth_type).await {
                        warn!(
                            error = %err,
                            url = %base_url,
                            realm = auth_type.realm(),
                            "JWKS fetch failed during health check"
                        );
                        return DependencyStatus::Error;
                    }
                }
                DependencyStatus::Ok
            }
        }
    }

    /// Refresh if a token `kid` is unknown, with cooldown to avoid hammering
    /// the provider when many unknown-kid tokens arrive.
    async fn refresh_on_unknown_kid(&self, auth_type: AuthType) -> Result<bool> {
        if matches!(&self.keyset_source, KeysetSource::Static) {
            return Ok(false);
        }
        let now = now_unix_seconds_u64();
        let last = self.last_refresh_unix.load(Ordering::Relaxed);
        if now.saturating_sub(last) < KEYSET_REFRESH_COOLDOWN_SECONDS {
            return Ok(false);
        }
        self.last_refresh_unix.store(now, Ordering::Relaxed);
        self.refresh_realm(auth_type).await?;
        Ok(true)
    }

    /// Verify a bearer token against the given realm's key set.
    ///
    /// All failure subtypes collapse to `None` for callers; the specific
    /// reason is only logged.
    pub async fn verify(&self, auth_type: AuthType, token: &str) -> Option<BearerTokenClaims> {
        let Some(jwks) = self.jwks_snapshot(auth_type).await else {
            error!(realm = auth_type.realm(), "no JWKS available for realm");
            return None;
        };

        let issuer = self.issuer(auth_type);
        match verify_rs256(token, &jwks, &issuer, now_unix_seconds()) {
            Ok(verified) => Some(verified.claims),
            Err(TokenError::UnknownKid(kid)) => match self.refresh_on_unknown_kid(auth_type).await
            {
                Ok(true) => {
                    let jwks = self.jwks_snapshot(auth_type).await?;
                    match verify_rs256(token, &jwks, &issuer, now_unix_seconds()) {
                        Ok(verified) => Some(verified.claims),
                        Err(err) => {
                            log_rejected_token(&err);
                            None
                        }
                    }
                }
                Ok(false) => {
                    warn!(kid = %kid, "bearer token kid not found and refresh suppressed");
                    None
                }
                Err(err) => {
                    error!("JWKS refresh failed: {err}");
                    None
                }
            },
            Err(err) => {
                log_rejected_token(&err);
                None
            }
        }
    }

    /// Verify a presented token, routing it to a realm via its `iss` claim.
    ///
    /// Returns the resolved auth type along with the verified claims.
    pub async fn verify_presented(&self, token: &str) -> Option<(AuthType, BearerTokenClaims)> {
        let issuer = match peek_issuer(token) {
            Ok(issuer) => issuer,
            Err(err) => {
                log_rejected_token(&err);
                return None;
            }
        };
        let Some(auth_type) = self.auth_type_for_issuer(&issuer) else {
            warn!(issuer = %issuer, "bearer token issuer matches no configured realm");
            return None;
        };
        let claims = self.verify(auth_type, token).await?;
        Some((auth_type, claims))
    }
}

/// The client sees a uniform "unauthorized"; the subtype is for logs only.
fn log_rejected_token(err: &TokenError) {
    match err {
        TokenError::Expired => warn!("bearer token rejected: expired"),
        TokenError::TokenFormat | TokenError::Base64 | TokenError::Json(_) => {
            warn!("bearer token rejected: malformed ({err})");
        }
        _ => warn!("bearer token rejected: {err}"),
    }
}

/// Unix seconds for token expiry validation.
fn now_unix_seconds() -> i64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

/// Convenience for cooldown tracking (unsigned).
fn now_unix_seconds_u64() -> u64 {
    u64::try_from(now_unix_seconds()).unwrap_or(0)
}

fn normalize_base(base: &str) -> String {
    base.trim_end_matches('/').to_string()
}

enum FetchOutcome {
    NotModified,
    Updated { jwks: Jwks, etag: Option<String> },
}

/// Fetch a realm's JWKS from the provider and parse its JSON response.
async fn fetch_jwks(client: &Client, url: &str, etag: Option<&str>) -> Result<FetchOutcome> {
    let span = info_span!(
        "jwks.fetch",
        http.method = "GET",
        url = %url
    );
    async {
        let mut request = client.get(url);
        if let Some(etag_value) = etag {
            request = request.header(IF_NONE_MATCH, etag_value);
        }
        let response = request.send().await?;
        let status = response.status();
        if status.as_u16() == 304 {
            return Ok(FetchOutcome::NotModified);
        }
        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response.text().await?;

        if !status.is_success() {
            return Err(anyhow!("JWKS fetch failed: {status}"));
        }

        let jwks = Jwks::from_json(&body).context("Invalid JWKS JSON")?;
        Ok(FetchOutcome::Updated { jwks, etag })
    }
    .instrument(span)
    .await
}
