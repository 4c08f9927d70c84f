//! RS256 bearer token (JWT) handling for the Agora platform.
//!
//! Verification is fully offline: callers supply the [`Jwks`] document
//! (typically fetched from the identity provider's `certs` endpoint and
//! cached) together with the expected issuer. Signing exists for tests and
//! tooling; the service itself never mints bearer tokens.

pub mod error;
pub mod jwks;
pub mod jwt;

pub use error::Error;
pub use jwks::{Jwk, Jwks};
pub use jwt::{
    BearerTokenClaims, BearerTokenHeader, RealmAccess, VerifiedBearerToken, peek_issuer,
    sign_rs256, verify_rs256,
};
