use rsa::errors::Error as RsaError;
use thiserror::Error;

/// Verification and key-handling failures.
///
/// Callers are expected to collapse all variants into a single
/// "unauthorized" outcome for clients; the variant only drives server-side
/// logging.
#[derive(Debug, Error)]
pub enum Error {
    /// Token is not a three-segment compact JWT. Detected before any
    /// signature work is attempted.
    #[error("invalid token format")]
    TokenFormat,
    #[error("invalid base64url encoding")]
    Base64,
    #[error("invalid json")]
    Json(#[from] serde_json::Error),
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlg(String),
    #[error("unknown key id: {0}")]
    UnknownKid(String),
    #[error("failed to parse RSA key")]
    KeyParse,
    #[error("rsa error")]
    Rsa(#[from] RsaError),
    #[error("invalid signature")]
    InvalidSignature,
    /// Well-formed and signature-valid, but `exp` is in the past.
    #[error("token expired")]
    Expired,
    #[error("invalid issuer")]
    InvalidIssuer,
}
