//! JWKS documents as served by the identity provider's `certs` endpoint.

use base64ct::{Base64UrlUnpadded, Encoding};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};

use crate::error::Error;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Jwks {
    pub keys: Vec<Jwk>,
}

impl Jwks {
    /// Parse a JWKS from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if `s` is not valid JSON or doesn't match the
    /// expected JWKS shape.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Find a key by `kid` (Key ID).
    #[must_use]
    pub fn find_by_kid(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|k| k.kid == kid)
    }

    /// Build a single-key JWKS from an RSA private key (PEM or DER).
    ///
    /// The public half is derived from the private key. Used by tests and
    /// tooling to mirror what the provider would publish.
    ///
    /// # Errors
    ///
    /// Returns an error if the key cannot be parsed.
    pub fn from_rsa_private_key_pem_or_der(
        private_key_pem_or_der: &[u8],
        kid: impl Into<String>,
    ) -> Result<Self, Error> {
        let private_key = decode_private_key(private_key_pem_or_der)?;
        let public_key = RsaPublicKey::from(&private_key);
        let jwk = Jwk::from_rsa_public_key(&public_key, kid)?;
        Ok(Self { keys: vec![jwk] })
    }
}

/// A single RSA signing key. Only the members needed for RS256
/// verification are modeled; providers may serve more (`x5c`, `x5t`) and
/// those are ignored on deserialization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Jwk {
    pub kty: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    #[serde(rename = "use", skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,
    pub kid: String,
    pub n: String,
    pub e: String,
}

impl Jwk {
    /// Build a JWK from an `RsaPublicKey`.
    ///
    /// # Errors
    ///
    /// Returns an error if the key cannot be converted to a JWK.
    pub fn from_rsa_public_key(
        public_key: &RsaPublicKey,
        kid: impl Into<String>,
    ) -> Result<Self, Error> {
        let n = Base64UrlUnpadded::encode_string(&public_key.n().to_bytes_be());
        let e = Base64UrlUnpadded::encode_string(&public_key.e().to_bytes_be());
        Ok(Self {
            kty: "RSA".to_string(),
            alg: Some("RS256".to_string()),
            key_use: Some("sig".to_string()),
            kid: kid.into(),
            n,
            e,
        })
    }

    /// Convert this JWK back to an `RsaPublicKey`.
    ///
    /// # Errors
    ///
    /// Returns an error if the base64url members cannot be decoded or the
    /// RSA key is invalid.
    pub fn to_rsa_public_key(&self) -> Result<RsaPublicKey, Error> {
        let n_bytes = Base64UrlUnpadded::decode_vec(&self.n).map_err(|_| Error::Base64)?;
        let e_bytes = Base64UrlUnpadded::decode_vec(&self.e).map_err(|_| Error::Base64)?;
        let n = BigUint::from_bytes_be(&n_bytes);
        let e = BigUint::from_bytes_be(&e_bytes);
        RsaPublicKey::new(n, e).map_err(Error::Rsa)
    }
}

pub(crate) fn decode_private_key(pem_or_der: &[u8]) -> Result<RsaPrivateKey, Error> {
    if pem_or_der.starts_with(b"-----BEGIN") {
        let s = std::str::from_utf8(pem_or_der).map_err(|_| Error::KeyParse)?;
        if let Ok(k) = RsaPrivateKey::from_pkcs8_pem(s) {
            return Ok(k);
        }
        if let Ok(k) = RsaPrivateKey::from_pkcs1_pem(s) {
            return Ok(k);
        }
        return Err(Error::KeyParse);
    }

    if let Ok(k) = RsaPrivateKey::from_pkcs8_der(pem_or_der) {
        return Ok(k);
    }
    if let Ok(k) = RsaPrivateKey::from_pkcs1_der(pem_or_der) {
        return Ok(k);
    }
    Err(Error::KeyParse)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_json_rejects_wrong_shape() {
        assert!(Jwks::from_json(r#"{"keys": "nope"}"#).is_err());
    }

    #[test]
    fn from_json_ignores_extra_members() -> Result<(), serde_json::Error> {
        let json = r#"{
            "keys": [{
                "kty": "RSA",
                "kid": "k1",
                "n": "AQAB",
                "e": "AQAB",
                "x5t": "ignored"
            }]
        }"#;
        let jwks = Jwks::from_json(json)?;
        assert_eq!(jwks.keys.len(), 1);
        assert!(jwks.find_by_kid("k1").is_some());
        assert!(jwks.find_by_kid("k2").is_none());
        Ok(())
    }

    #[test]
    fn jwk_round_trips_through_rsa_public_key() -> Result<(), Error> {
        let jwks = Jwks::from_rsa_private_key_pem_or_der(
            crate::jwt::tests::TEST_PRIVATE_KEY_PEM.as_bytes(),
            "round-trip",
        )?;
        let jwk = jwks.find_by_kid("round-trip").ok_or(Error::KeyParse)?;
        let public_key = jwk.to_rsa_public_key()?;
        let again = Jwk::from_rsa_public_key(&public_key, "round-trip")?;
        assert_eq!(jwk, &again);
        Ok(())
    }
}
