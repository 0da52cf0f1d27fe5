//! The dispatcher's wire-facing error surface: every handler failure, whatever layer it
//! originated in, is converted to one of these before a response is written (§7).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Auth(#[from] oidcd_auth::Error),
    #[error(transparent)]
    Ipc(#[from] oidcd_ipc::Error),
    #[error("malformed request: {0}")]
    BadRequest(String),
}

impl AgentError {
    pub fn status(&self) -> &'static str {
        match self {
            AgentError::Auth(e) => e.status(),
            AgentError::Ipc(_) => "failure",
            AgentError::BadRequest(_) => "badrequest",
        }
    }

    pub fn wire_code(&self) -> String {
        match self {
            AgentError::Auth(e) => e.wire_code().to_string(),
            AgentError::Ipc(_) => "internal".to_string(),
            AgentError::BadRequest(_) => "bad request".to_string(),
        }
    }
}
