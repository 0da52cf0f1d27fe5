//! The JSON request/response shapes on the agent socket and the Frontend Channel (§4.3, §4.5).
//!
//! `Request` is deliberately flat rather than an enum-per-request: the wire protocol itself is
//! flat (a `request` discriminant plus whichever of the optional fields that request needs), and
//! mirroring that shape here keeps (de)serialization a straight mechanical mapping instead of a
//! second protocol definition to keep in sync with §4.3's table.

use serde::{
    Deserialize,
    Serialize,
};
use serde_json::{
    Map,
    Value,
};

use crate::error::AgentError;

#[derive(Debug, Deserialize)]
pub struct Request {
    pub request: Option<String>,
    #[serde(default)]
    pub config: Option<String>,
    #[serde(default)]
    pub flow: Option<String>,
    #[serde(default)]
    pub flow_list: Option<String>,
    #[serde(default)]
    pub account_name: Option<String>,
    #[serde(default)]
    pub min_valid_period: Option<u64>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub application_hint: Option<String>,
    #[serde(default)]
    pub timeout: Option<String>,
    #[serde(default)]
    pub confirm: Option<bool>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub redirect_uri: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub code_verifier: Option<String>,
    #[serde(default)]
    pub device: Option<Value>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl Request {
    pub fn require_config(&self) -> Result<&str, AgentError> {
        self.config.as_deref().ok_or_else(|| AgentError::BadRequest("missing required field: config".into()))
    }

    pub fn require_account_name(&self) -> Result<&str, AgentError> {
        self.account_name.as_deref().ok_or_else(|| AgentError::BadRequest("missing required field: account_name".into()))
    }

    pub fn require_state(&self) -> Result<&str, AgentError> {
        self.state.as_deref().ok_or_else(|| AgentError::BadRequest("missing required field: state".into()))
    }

    pub fn require_password(&self) -> Result<&str, AgentError> {
        self.password.as_deref().ok_or_else(|| AgentError::BadRequest("missing required field: password".into()))
    }

    pub fn flow_list(&self) -> Vec<&str> {
        self.flow
            .as_deref()
            .or(self.flow_list.as_deref())
            .map(|s| s.split(',').map(str::trim).filter(|s| !s.is_empty()).collect())
            .unwrap_or_default()
    }
}

/// A response under construction: `status` plus whatever fields this particular handler needs to
/// add, assembled with the builder methods below rather than one giant struct with most fields
/// unused on every path.
#[derive(Debug, Serialize)]
pub struct Response {
    pub status: &'static str,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Response {
    pub fn success() -> Self {
        Self {
            status: "success",
            fields: Map::new(),
        }
    }

    pub fn accepted() -> Self {
        Self {
            status: "accepted",
            fields: Map::new(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        let mut response = Self {
            status: "notfound",
            fields: Map::new(),
        };
        response.fields.insert("error".into(), Value::String(message.into()));
        response
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        let mut response = Self {
            status: "badrequest",
            fields: Map::new(),
        };
        response.fields.insert("error".into(), Value::String(message.into()));
        response
    }

    pub fn failure(error: &AgentError) -> Self {
        let mut response = Self {
            status: error.status(),
            fields: Map::new(),
        };
        response.fields.insert("error".into(), Value::String(error.wire_code()));
        response
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }
}

impl From<Result<Response, AgentError>> for Response {
    fn from(result: Result<Response, AgentError>) -> Self {
        match result {
            Ok(response) => response,
            Err(err) => Response::failure(&err),
        }
    }
}
