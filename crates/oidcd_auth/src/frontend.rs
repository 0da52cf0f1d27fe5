//! The agent side of the Frontend Channel contract (§4.5): the Flow Engine and the dispatcher's
//! `access_token` handler both round-trip through this trait for autoload, confirmation, and
//! credential prompting. The concrete implementation (a framed pipe to the prompter process) is
//! out of scope for this crate — it's the binary's job to wire one up and hand it in.

use async_trait::async_trait;

use crate::error::Result;

#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[async_trait]
pub trait Frontend: Send + Sync {
    /// `INT_REQUEST_AUTOLOAD`: ask the frontend for a stored config for `shortname`. `Ok(None)`
    /// means the frontend doesn't have one; a `UserCancel` error means the user declined.
    async fn request_autoload(&self, shortname: &str) -> Result<Option<String>>;

    /// `INT_REQUEST_CONFIRM`: ask the frontend whether to proceed, with an optional hint about
    /// which application is asking. `Ok(true)` is accept, `Ok(false)` is an explicit decline.
    async fn request_confirm(&self, shortname: &str, application_hint: Option<&str>) -> Result<bool>;

    /// `INT_REQUEST_CREDENTIALS`: ask the frontend (which may itself prompt the user) for a
    /// username/password pair for the resource-owner password flow.
    async fn request_credentials(&self, shortname: &str) -> Result<Credentials>;
}

/// A scripted frontend for flow-engine unit tests: no pipes, no process, just preprogrammed
/// answers and a record of what was asked.
#[derive(Default)]
pub struct MockFrontend {
    pub autoload_response: parking_lot::Mutex<Option<Result<Option<String>>>>,
    pub confirm_response: parking_lot::Mutex<Option<Result<bool>>>,
    pub credentials_response: parking_lot::Mutex<Option<Result<Credentials>>>,
    pub calls: parking_lot::Mutex<Vec<String>>,
}

impl MockFrontend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Frontend for MockFrontend {
    async fn request_autoload(&self, shortname: &str) -> Result<Option<String>> {
        self.calls.lock().push(format!("autoload:{shortname}"));
        self.autoload_response
            .lock()
            .take()
            .unwrap_or_else(|| Err(crate::error::Error::Internal("no scripted autoload response".into())))
    }

    async fn request_confirm(&self, shortname: &str, _application_hint: Option<&str>) -> Result<bool> {
        self.calls.lock().push(format!("confirm:{shortname}"));
        self.confirm_response
            .lock()
            .take()
            .unwrap_or_else(|| Err(crate::error::Error::Internal("no scripted confirm response".into())))
    }

    async fn request_credentials(&self, shortname: &str) -> Result<Credentials> {
        self.calls.lock().push(format!("credentials:{shortname}"));
        self.credentials_response
            .lock()
            .take()
            .unwrap_or_else(|| Err(crate::error::Error::Internal("no scripted credentials response".into())))
    }
}
