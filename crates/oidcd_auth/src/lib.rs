//! Account state, discovery caching, and the OIDC flow engine that drive a single agent
//! session: everything `oidcd` needs that isn't IPC framing.

pub mod account;
pub mod discovery;
pub mod error;
pub mod flows;
pub mod frontend;
pub mod pkce;
pub mod registry;
pub mod secret;
pub mod transport;

pub use account::Account;
pub use discovery::{
    CachingDiscoveryClient,
    DiscoveryClient,
    IssuerConfig,
};
pub use error::{
    Error,
    Result,
};
pub use frontend::{
    Credentials,
    Frontend,
};
pub use registry::Registry;
pub use secret::SecretBuffer;
pub use transport::{
    HttpResponse,
    HttpTransport,
    ReqwestTransport,
};
