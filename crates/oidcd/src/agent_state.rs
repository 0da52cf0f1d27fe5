//! Process-wide state shared by every connection the dispatcher accepts (§2 item 8): the account
//! registry, the discovery cache, the frontend handle, and the handful of daemon-wide defaults.

use std::sync::Arc;

use oidcd_auth::{
    CachingDiscoveryClient,
    DiscoveryClient,
    Frontend,
    ReqwestTransport,
    Registry,
};

/// Absolute floor under which a cached access token is never handed out, matching the default
/// `min_valid_period` a request omits.
pub const DEFAULT_MIN_VALID_PERIOD: u64 = 30;

pub struct AgentState {
    pub registry: Registry,
    pub discovery: CachingDiscoveryClient<ReqwestTransport>,
    /// Shared across every flow invocation rather than built per-request, so the underlying
    /// `reqwest::Client` keeps its connection pool warm.
    pub transport: ReqwestTransport,
    pub frontend: Arc<dyn Frontend>,
    /// Account lifetime, in seconds, applied when a request omits `timeout`. 0 means never expire.
    pub default_timeout: u64,
    /// When true, `access_token` on an unknown shortname fails immediately instead of asking the
    /// frontend to autoload a stored config.
    pub no_autoload: bool,
    /// Daemon-wide default for `confirmation_required` when a request doesn't set its own.
    pub confirm_default: bool,
}

impl AgentState {
    pub fn new(frontend: Arc<dyn Frontend>, default_timeout: u64, no_autoload: bool, confirm_default: bool) -> Self {
        Self {
            registry: Registry::new(),
            discovery: CachingDiscoveryClient::new(ReqwestTransport::new()),
            transport: ReqwestTransport::new(),
            frontend,
            default_timeout,
            no_autoload,
            confirm_default,
        }
    }

    pub fn death_for_timeout(&self, timeout: Option<&str>, now: u64) -> u64 {
        let seconds: u64 = timeout.and_then(|t| t.parse().ok()).unwrap_or(self.default_timeout);
        if seconds == 0 { 0 } else { now.saturating_add(seconds) }
    }
}

pub fn now() -> u64 {
    std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}
