//! Device authorization grant (RFC 8628), exposed as §4.2's `device` flow.

use std::time::Duration;

use serde::Deserialize;

use crate::account::Account;
use crate::discovery::IssuerConfig;
use crate::error::{
    Error,
    Result,
};
use crate::flows::parse_error_body;
use crate::transport::HttpTransport;

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceAuthorization {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    #[serde(default)]
    pub verification_uri_complete: Option<String>,
    pub expires_in: u64,
    #[serde(default = "default_interval")]
    pub interval: u64,
}

fn default_interval() -> u64 {
    5
}

#[derive(Deserialize)]
struct DeviceTokenError {
    error: String,
}

/// Starts the flow: obtains a `device_code`/`user_code` pair the caller displays to the user.
/// Nothing is recorded on the account yet — the caller drives the rest via [`poll_until_complete`].
pub async fn request_device_authorization(account: &Account, issuer: &IssuerConfig, transport: &impl HttpTransport) -> Result<DeviceAuthorization> {
    let endpoint = issuer.device_authorization_endpoint.as_deref().ok_or_else(|| Error::UnknownFlow("device".into()))?;

    let mut form = vec![("client_id", account.client_id.as_str())];
    if !account.scopes.is_empty() {
        form.push(("scope", account.scopes.as_str()));
    }

    let response = transport.post_form(endpoint, &form).await?;
    if !response.is_success() {
        return Err(parse_error_body(&response.body));
    }
    response.json()
}

/// Polls `token_endpoint` at `device.interval`, honoring `authorization_pending` (keep waiting)
/// and `slow_down` (add 5s to the interval), until the user completes the flow, is denied, the
/// grant expires, or `device.expires_in` elapses.
pub async fn poll_until_complete(account: &mut Account, issuer: &IssuerConfig, transport: &impl HttpTransport, device: &DeviceAuthorization) -> Result<()> {
    let mut interval = device.interval.max(1);
    let deadline = Duration::from_secs(device.expires_in);
    let started = tokio::time::Instant::now();

    loop {
        if started.elapsed() >= deadline {
            return Err(Error::Timeout);
        }
        tokio::time::sleep(Duration::from_secs(interval)).await;

        let client_id = account.client_id.clone();
        let form = vec![
            ("grant_type", "urn:ietf:params:oauth:grant-type:device_code"),
            ("device_code", device.device_code.as_str()),
            ("client_id", client_id.as_str()),
        ];
        let response = transport.post_form(&issuer.token_endpoint, &form).await?;

        if response.is_success() {
            let token: crate::flows::TokenResponse = response.json()?;
            let granted_scopes = token.scope.clone().unwrap_or_else(|| account.scopes.clone());
            account.set_tokens(token.access_token, token.expires_in.unwrap_or(3600), &granted_scopes, token.refresh_token);
            return Ok(());
        }

        let body: DeviceTokenError = response.json().unwrap_or(DeviceTokenError {
            error: "unknown".into(),
        });
        match body.error.as_str() {
            "authorization_pending" => continue,
            "slow_down" => {
                interval += 5;
                continue;
            },
            "access_denied" => return Err(Error::UserDenied),
            "expired_token" => return Err(Error::Timeout),
            _ => return Err(parse_error_body(&response.body)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{
        HttpResponse,
        MockHttpTransport,
    };

    fn issuer() -> IssuerConfig {
        IssuerConfig {
            issuer: "https://issuer.example".into(),
            authorization_endpoint: "https://issuer.example/authorize".into(),
            token_endpoint: "https://issuer.example/token".into(),
            device_authorization_endpoint: Some("https://issuer.example/device".into()),
            registration_endpoint: None,
            revocation_endpoint: None,
            scopes_supported: vec![],
            grant_types_supported: vec![],
        }
    }

    fn pending() -> HttpResponse {
        HttpResponse {
            status: 400,
            body: serde_json::to_vec(&serde_json::json!({"error": "authorization_pending"})).unwrap(),
        }
    }

    #[tokio::test]
    async fn request_fails_when_issuer_has_no_device_endpoint() {
        let account = Account::new("s1", "https://issuer.example");
        let mut no_device = issuer();
        no_device.device_authorization_endpoint = None;
        let transport = MockHttpTransport::new();
        let err = request_device_authorization(&account, &no_device, &transport).await.unwrap_err();
        assert!(matches!(err, Error::UnknownFlow(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn pending_then_success_sets_tokens() {
        let mut account = Account::new("s1", "https://issuer.example");
        let transport = MockHttpTransport::new();
        transport.queue_post_form(Ok(pending()));
        transport.queue_post_form(Ok(HttpResponse {
            status: 200,
            body: serde_json::to_vec(&serde_json::json!({"access_token": "A", "expires_in": 3600})).unwrap(),
        }));
        let device = DeviceAuthorization {
            device_code: "D".into(),
            user_code: "ABCD-EFGH".into(),
            verification_uri: "https://issuer.example/device".into(),
            verification_uri_complete: None,
            expires_in: 600,
            interval: 1,
        };

        poll_until_complete(&mut account, &issuer(), &transport, &device).await.unwrap();
        assert_eq!(account.access_token.expose_str(), "A");
    }

    #[tokio::test(start_paused = true)]
    async fn slow_down_increments_the_interval() {
        let mut account = Account::new("s1", "https://issuer.example");
        let transport = MockHttpTransport::new();
        transport.queue_post_form(Ok(HttpResponse {
            status: 400,
            body: serde_json::to_vec(&serde_json::json!({"error": "slow_down"})).unwrap(),
        }));
        transport.queue_post_form(Ok(HttpResponse {
            status: 200,
            body: serde_json::to_vec(&serde_json::json!({"access_token": "A", "expires_in": 3600})).unwrap(),
        }));
        let device = DeviceAuthorization {
            device_code: "D".into(),
            user_code: "ABCD-EFGH".into(),
            verification_uri: "https://issuer.example/device".into(),
            verification_uri_complete: None,
            expires_in: 600,
            interval: 1,
        };

        poll_until_complete(&mut account, &issuer(), &transport, &device).await.unwrap();
        assert_eq!(transport.post_form_calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn access_denied_is_terminal() {
        let mut account = Account::new("s1", "https://issuer.example");
        let transport = MockHttpTransport::new();
        transport.queue_post_form(Ok(HttpResponse {
            status: 400,
            body: serde_json::to_vec(&serde_json::json!({"error": "access_denied"})).unwrap(),
        }));
        let device = DeviceAuthorization {
            device_code: "D".into(),
            user_code: "ABCD-EFGH".into(),
            verification_uri: "https://issuer.example/device".into(),
            verification_uri_complete: None,
            expires_in: 600,
            interval: 1,
        };

        let err = poll_until_complete(&mut account, &issuer(), &transport, &device).await.unwrap_err();
        assert!(matches!(err, Error::UserDenied));
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_before_a_response_times_out() {
        let mut account = Account::new("s1", "https://issuer.example");
        let transport = MockHttpTransport::new();
        let device = DeviceAuthorization {
            device_code: "D".into(),
            user_code: "ABCD-EFGH".into(),
            verification_uri: "https://issuer.example/device".into(),
            verification_uri_complete: None,
            expires_in: 0,
            interval: 1,
        };

        let err = poll_until_complete(&mut account, &issuer(), &transport, &device).await.unwrap_err();
        assert!(matches!(err, Error::Timeout));
    }
}
