//! Resource-owner password flow (§4.2).

use crate::account::Account;
use crate::discovery::IssuerConfig;
use crate::error::Result;
use crate::flows::{
    TokenResponse,
    parse_error_body,
};
use crate::frontend::Frontend;
use crate::transport::HttpTransport;

/// Prompts for credentials via the frontend if the account doesn't already carry them, makes a
/// single `grant_type=password` attempt, and wipes whatever credentials were used regardless of
/// outcome.
pub async fn password(
    account: &mut Account,
    issuer: &IssuerConfig,
    transport: &impl HttpTransport,
    frontend: &dyn Frontend,
) -> Result<()> {
    if account.username.is_empty() || account.password.is_empty() {
        let credentials = frontend.request_credentials(&account.shortname).await?;
        account.username.set(credentials.username);
        account.password.set(credentials.password);
    }

    let result = attempt(account, issuer, transport).await;
    account.clear_password_scratch();
    result
}

async fn attempt(account: &mut Account, issuer: &IssuerConfig, transport: &impl HttpTransport) -> Result<()> {
    let username = account.username.expose_str().to_string();
    let password = account.password.expose_str().to_string();
    let client_id = account.client_id.clone();
    let client_secret = account.client_secret.expose_str().to_string();
    let scopes = account.scopes.clone();

    let mut form = vec![
        ("grant_type", "password"),
        ("username", username.as_str()),
        ("password", password.as_str()),
        ("client_id", client_id.as_str()),
    ];
    if !client_secret.is_empty() {
        form.push(("client_secret", client_secret.as_str()));
    }
    if !scopes.is_empty() {
        form.push(("scope", scopes.as_str()));
    }

    let response = transport.post_form(&issuer.token_endpoint, &form).await?;
    if !response.is_success() {
        return Err(parse_error_body(&response.body));
    }

    let token: TokenResponse = response.json()?;
    let granted_scopes = token.scope.clone().unwrap_or_else(|| account.scopes.clone());
    account.set_tokens(token.access_token, token.expires_in.unwrap_or(3600), &granted_scopes, token.refresh_token);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::frontend::MockFrontend;
    use crate::transport::{
        HttpResponse,
        MockHttpTransport,
    };

    fn issuer() -> IssuerConfig {
        IssuerConfig {
            issuer: "https://issuer.example".into(),
            authorization_endpoint: "https://issuer.example/authorize".into(),
            token_endpoint: "https://issuer.example/token".into(),
            device_authorization_endpoint: None,
            registration_endpoint: None,
            revocation_endpoint: None,
            scopes_supported: vec![],
            grant_types_supported: vec![],
        }
    }

    #[tokio::test]
    async fn missing_credentials_are_prompted_and_wiped_after_use() {
        let mut account = Account::new("s1", "https://issuer.example");
        account.client_id = "client-1".into();
        let transport = MockHttpTransport::new();
        transport.queue_post_form(Ok(HttpResponse {
            status: 200,
            body: serde_json::to_vec(&serde_json::json!({"access_token": "A", "expires_in": 3600})).unwrap(),
        }));
        let frontend = MockFrontend::new();
        *frontend.credentials_response.lock() = Some(Ok(crate::frontend::Credentials {
            username: "alice".into(),
            password: "hunter2".into(),
        }));

        password(&mut account, &issuer(), &transport, &frontend).await.unwrap();

        assert_eq!(account.access_token.expose_str(), "A");
        assert!(account.username.is_empty());
        assert!(account.password.is_empty());
        assert_eq!(frontend.calls.lock().as_slice(), &["credentials:s1".to_string()]);
    }

    #[tokio::test]
    async fn existing_credentials_skip_the_prompt() {
        let mut account = Account::new("s1", "https://issuer.example");
        account.username.set("alice");
        account.password.set("hunter2");
        let transport = MockHttpTransport::new();
        transport.queue_post_form(Ok(HttpResponse {
            status: 200,
            body: serde_json::to_vec(&serde_json::json!({"access_token": "A", "expires_in": 3600})).unwrap(),
        }));
        let frontend = MockFrontend::new();

        password(&mut account, &issuer(), &transport, &frontend).await.unwrap();
        assert!(frontend.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn credentials_are_wiped_even_on_provider_failure() {
        let mut account = Account::new("s1", "https://issuer.example");
        account.username.set("alice");
        account.password.set("wrong");
        let transport = MockHttpTransport::new();
        transport.queue_post_form(Ok(HttpResponse {
            status: 400,
            body: serde_json::to_vec(&serde_json::json!({"error": "invalid_grant"})).unwrap(),
        }));
        let frontend = MockFrontend::new();

        let err = password(&mut account, &issuer(), &transport, &frontend).await.unwrap_err();
        assert!(matches!(err, Error::OidcError { .. }));
        assert!(account.username.is_empty());
        assert!(account.password.is_empty());
    }
}
