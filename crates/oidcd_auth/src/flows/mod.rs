//! One module per OIDC flow the agent drives. Every entry point takes the [`crate::account::Account`]
//! by mutable reference, the resolved [`crate::discovery::IssuerConfig`], and an [`crate::transport::HttpTransport`];
//! on success it populates tokens directly on the account, mirroring §4.2.

pub mod code;
pub mod device;
pub mod password;
pub mod refresh;
pub mod register;
pub mod revoke;

use serde::Deserialize;

use crate::error::Error;

/// The standard OAuth 2.0 token-endpoint success body, shared by refresh, password, code-exchange,
/// and device-poll responses.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// The standard OAuth 2.0 token-endpoint error body: `{"error": "...", "error_description": "..."}`.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenErrorResponse {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl TokenErrorResponse {
    pub(crate) fn into_error(self) -> Error {
        Error::OidcError {
            error: self.error,
            description: self.error_description.unwrap_or_default(),
        }
    }
}

pub(crate) fn parse_error_body(body: &[u8]) -> Error {
    match serde_json::from_slice::<TokenErrorResponse>(body) {
        Ok(err) => err.into_error(),
        Err(_) => Error::OidcError {
            error: "unknown".into(),
            description: String::from_utf8_lossy(body).into_owned(),
        },
    }
}
