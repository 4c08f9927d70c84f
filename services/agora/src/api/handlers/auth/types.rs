//! Request/response types for auth endpoints.
//!
//! Wire names are camelCase to match what the web frontend sends.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

/// Tenant population a credential belongs to. Each variant maps to its own
/// realm at the identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    Customers,
    Developers,
    Vendors,
}

impl AuthType {
    pub const fn all() -> &'static [Self] {
        &[Self::Customers, Self::Developers, Self::Vendors]
    }

    /// Realm name at the identity provider.
    #[must_use]
    pub const fn realm(self) -> &'static str {
        match self {
            Self::Customers => "customers",
            Self::Developers => "developers",
            Self::Vendors => "vendors",
        }
    }
}

impl fmt::Display for AuthType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.realm())
    }
}

impl FromStr for AuthType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customers" => Ok(Self::Customers),
            "developers" => Ok(Self::Developers),
            "vendors" => Ok(Self::Vendors),
            other => Err(format!("unknown auth type: {other}")),
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CsrfTokenResponse {
    pub csrf_token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    pub auth_type: AuthType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub otp: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub auth_type: AuthType,
    /// A fresh CSRF token is minted on login; the matching cookie rides the
    /// same response.
    pub csrf_token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatusResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub auth_type: AuthType,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub auth_type: AuthType,
}

/// Uniform error body. `otpRequired` is only present when the provider asked
/// for a second factor.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub otp_required: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, Result};

    #[test]
    fn auth_type_round_trips_lowercase() -> Result<()> {
        let value = serde_json::to_value(AuthType::Developers)?;
        assert_eq!(value, serde_json::json!("developers"));
        let decoded: AuthType = serde_json::from_value(serde_json::json!("vendors"))?;
        assert_eq!(decoded, AuthType::Vendors);
        assert!(serde_json::from_value::<AuthType>(serde_json::json!("admins")).is_err());
        Ok(())
    }

    #[test]
    fn auth_type_parses_stored_realm_names() {
        for auth_type in AuthType::all() {
            assert_eq!(auth_type.realm().parse::<AuthType>().ok(), Some(*auth_type));
        }
        assert!("Customers".parse::<AuthType>().is_err());
    }

    #[test]
    fn login_request_uses_camel_case_wire_names() -> Result<()> {
        let request: LoginRequest = serde_json::from_value(serde_json::json!({
            "username": "alice",
            "password": "secret",
            "authType": "customers",
            "otp": "123456",
        }))?;
        assert_eq!(request.auth_type, AuthType::Customers);
        assert_eq!(request.otp.as_deref(), Some("123456"));
        Ok(())
    }

    #[test]
    fn login_request_otp_defaults_to_none() -> Result<()> {
        let request: LoginRequest = serde_json::from_value(serde_json::json!({
            "username": "alice",
            "password": "secret",
            "authType": "vendors",
        }))?;
        assert!(request.otp.is_none());
        Ok(())
    }

    #[test]
    fn csrf_response_serializes_camel_case() -> Result<()> {
        let response = CsrfTokenResponse {
            csrf_token: "abc".to_string(),
        };
        let value = serde_json::to_value(&response)?;
        let token = value
            .get("csrfToken")
            .and_then(serde_json::Value::as_str)
            .context("missing csrfToken")?;
        assert_eq!(token, "abc");
        Ok(())
    }

    #[test]
    fn error_response_omits_absent_otp_flag() -> Result<()> {
        let response = ErrorResponse {
            error: "Authentication failed".to_string(),
            otp_required: None,
        };
        let value = serde_json::to_value(&response)?;
        assert!(value.get("otpRequired").is_none());
        Ok(())
    }
}
