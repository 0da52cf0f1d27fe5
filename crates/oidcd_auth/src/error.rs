use thiserror::Error;

/// The agent's error taxonomy. Every handler converts whatever it encounters into one of these
/// before it reaches the dispatcher; the dispatcher in turn converts each variant into exactly
/// one wire-facing `{status, error}` pair. Never format a variant's `Display` output into
/// anything that reaches a log target that isn't already scoped to this crate's own `tracing`
/// target filter — see `Error::wire_code` for the string that's actually safe to send.
#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed request: {0}")]
    BadRequest(String),

    #[error("account not loaded")]
    AccountNotLoaded,

    #[error("account already loaded")]
    AccountAlreadyLoaded,

    #[error("agent is locked")]
    AgentLocked,

    #[error("bad password")]
    BadPassword,

    #[error("network error reaching {0}: {1}")]
    NetworkError(String, #[source] reqwest::Error),

    #[error("provider returned {error}: {description}")]
    OidcError { error: String, description: String },

    #[error("no refresh token available")]
    NoRefreshToken,

    #[error("insufficient scope granted")]
    InsufficientScope,

    #[error("unknown flow: {0}")]
    UnknownFlow(String),

    #[error("no redirect_uris configured")]
    NoRedirectUris,

    #[error("user denied the request")]
    UserDenied,

    #[error("user cancelled the request")]
    UserCancel,

    #[error("operation timed out")]
    Timeout,

    #[error("{0} not found")]
    NotFound(String),

    #[error("internal invariant violated: {0}")]
    Internal(String),
}

impl Error {
    /// The stable short code placed in the `error` field of a wire response. Distinct from
    /// `Display`, which may carry provider-supplied text that's fine to log but not to key logic
    /// on.
    pub fn wire_code(&self) -> &'static str {
        match self {
            Error::BadRequest(_) => "bad request",
            Error::AccountNotLoaded => "account not loaded",
            Error::AccountAlreadyLoaded => "account already loaded",
            Error::AgentLocked => "agent locked",
            Error::BadPassword => "bad password",
            Error::NetworkError(..) => "network error",
            Error::OidcError { .. } => "oidc error",
            Error::NoRefreshToken => "no refresh token",
            Error::InsufficientScope => "insufficient scope",
            Error::UnknownFlow(_) => "unknown flow",
            Error::NoRedirectUris => "no redirect uris",
            Error::UserDenied => "access denied by user",
            Error::UserCancel => "cancelled by user",
            Error::Timeout => "timeout",
            Error::NotFound(_) => "not found",
            Error::Internal(_) => "internal",
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "notfound",
            Error::BadRequest(_) => "badrequest",
            _ => "failure",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
