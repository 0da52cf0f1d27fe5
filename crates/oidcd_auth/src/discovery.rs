//! Fetches and memoizes OIDC discovery documents (`.well-known/openid-configuration`) per issuer.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{
    Deserialize,
    Serialize,
};

use crate::error::{
    Error,
    Result,
};
use crate::transport::HttpTransport;

const DEFAULT_TTL: Duration = Duration::from_secs(3600);

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct IssuerConfig {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    #[serde(default)]
    pub device_authorization_endpoint: Option<String>,
    #[serde(default)]
    pub registration_endpoint: Option<String>,
    #[serde(default)]
    pub revocation_endpoint: Option<String>,
    #[serde(default)]
    pub scopes_supported: Vec<String>,
    #[serde(default)]
    pub grant_types_supported: Vec<String>,
}

struct CacheEntry {
    config: IssuerConfig,
    fetched_at: std::time::Instant,
}

/// Fetches and memoizes discovery documents. Cache entries are immutable once stored — a refresh
/// replaces the whole entry, it never patches a field in place (§3).
#[async_trait]
pub trait DiscoveryClient: Send + Sync {
    async fn get(&self, issuer_url: &str) -> Result<IssuerConfig>;
    fn invalidate(&self, issuer_url: &str);
}

pub struct CachingDiscoveryClient<T: HttpTransport> {
    transport: T,
    ttl: Duration,
    cache: Mutex<HashMap<String, CacheEntry>>,
}

impl<T: HttpTransport> CachingDiscoveryClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            ttl: DEFAULT_TTL,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_ttl(transport: T, ttl: Duration) -> Self {
        Self {
            transport,
            ttl,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn normalize(issuer_url: &str) -> String {
        issuer_url.trim_end_matches('/').to_string()
    }

    fn cached(&self, issuer: &str) -> Option<IssuerConfig> {
        let cache = self.cache.lock();
        cache.get(issuer).and_then(|entry| {
            if entry.fetched_at.elapsed() < self.ttl {
                Some(entry.config.clone())
            } else {
                None
            }
        })
    }

    async fn fetch(&self, issuer: &str) -> Result<IssuerConfig> {
        let url = format!("{issuer}/.well-known/openid-configuration");
        let body = self.transport.get_json(&url).await?;
        let config: IssuerConfig = serde_json::from_slice(&body).map_err(|e| Error::Internal(format!("invalid discovery document: {e}")))?;

        if config.authorization_endpoint.is_empty() || config.token_endpoint.is_empty() {
            return Err(Error::Internal("discovery document missing required endpoints".into()));
        }
        if Self::normalize(&config.issuer) != issuer {
            return Err(Error::Internal("discovery document issuer mismatch".into()));
        }

        self.cache.lock().insert(issuer.to_string(), CacheEntry {
            config: config.clone(),
            fetched_at: std::time::Instant::now(),
        });
        Ok(config)
    }
}

#[async_trait]
impl<T: HttpTransport> DiscoveryClient for CachingDiscoveryClient<T> {
    async fn get(&self, issuer_url: &str) -> Result<IssuerConfig> {
        let issuer = Self::normalize(issuer_url);
        if let Some(config) = self.cached(&issuer) {
            return Ok(config);
        }
        self.fetch(&issuer).await
    }

    fn invalidate(&self, issuer_url: &str) {
        self.cache.lock().remove(&Self::normalize(issuer_url));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockHttpTransport;

    fn mock_document(issuer: &str) -> Vec<u8> {
        serde_json::to_vec(&IssuerConfig {
            issuer: issuer.to_string(),
            authorization_endpoint: format!("{issuer}/authorize"),
            token_endpoint: format!("{issuer}/token"),
            device_authorization_endpoint: Some(format!("{issuer}/device")),
            registration_endpoint: Some(format!("{issuer}/register")),
            revocation_endpoint: Some(format!("{issuer}/revoke")),
            scopes_supported: vec!["openid".into(), "offline_access".into()],
            grant_types_supported: vec!["refresh_token".into()],
        })
        .unwrap()
    }

    #[tokio::test]
    async fn fetches_and_caches() {
        let transport = MockHttpTransport::new();
        transport.queue_get_json(Ok(mock_document("https://issuer.example")));
        let client = CachingDiscoveryClient::new(transport);

        let first = client.get("https://issuer.example/").await.unwrap();
        assert_eq!(first.token_endpoint, "https://issuer.example/token");

        // second call hits the cache; no further response was queued so a real fetch would fail.
        let second = client.get("https://issuer.example").await.unwrap();
        assert_eq!(second, first);
    }

    #[tokio::test]
    async fn invalidate_forces_refetch() {
        let transport = MockHttpTransport::new();
        transport.queue_get_json(Ok(mock_document("https://issuer.example")));
        transport.queue_get_json(Ok(mock_document("https://issuer.example")));
        let client = CachingDiscoveryClient::new(transport);

        client.get("https://issuer.example").await.unwrap();
        client.invalidate("https://issuer.example");
        client.get("https://issuer.example").await.unwrap();
        assert_eq!(client.transport.get_json_call_count(), 2);
    }
}
