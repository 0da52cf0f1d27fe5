//! Token revocation (§4.2). Best-effort against the provider, but `delete` (§3) surfaces failures
//! rather than swallowing them, so this returns a `Result` rather than logging and moving on.

use crate::account::Account;
use crate::discovery::IssuerConfig;
use crate::error::{
    Error,
    Result,
};
use crate::flows::parse_error_body;
use crate::transport::HttpTransport;

/// Revokes `refresh_token`, falling back to `access_token` when there's no refresh token to
/// revoke. A no-op returning `Ok(())` if neither is present.
pub async fn revoke(account: &Account, issuer: &IssuerConfig, transport: &impl HttpTransport) -> Result<()> {
    let (token, hint) = if !account.refresh_token.is_empty() {
        (account.refresh_token.expose_str().to_string(), "refresh_token")
    } else if !account.access_token.is_empty() {
        (account.access_token.expose_str().to_string(), "access_token")
    } else {
        return Ok(());
    };

    let endpoint = issuer.revocation_endpoint.as_deref().ok_or_else(|| Error::UnknownFlow("revoke".into()))?;

    let client_id = account.client_id.clone();
    let client_secret = account.client_secret.expose_str().to_string();
    let mut form = vec![("token", token.as_str()), ("token_type_hint", hint), ("client_id", client_id.as_str())];
    if !client_secret.is_empty() {
        form.push(("client_secret", client_secret.as_str()));
    }

    let response = transport.post_form(endpoint, &form).await?;
    if !response.is_success() {
        return Err(parse_error_body(&response.body));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secret::SecretBuffer;
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
            revocation_endpoint: Some("https://issuer.example/revoke".into()),
            scopes_supported: vec![],
            grant_types_supported: vec![],
        }
    }

    #[tokio::test]
    async fn no_tokens_is_a_silent_no_op() {
        let account = Account::new("s1", "https://issuer.example");
        let transport = MockHttpTransport::new();
        revoke(&account, &issuer(), &transport).await.unwrap();
        assert_eq!(transport.post_form_calls().len(), 0);
    }

    #[tokio::test]
    async fn prefers_refresh_token_over_access_token() {
        let mut account = Account::new("s1", "https://issuer.example");
        account.refresh_token = SecretBuffer::from("R");
        account.access_token = SecretBuffer::from("A");
        let transport = MockHttpTransport::new();
        transport.queue_post_form(Ok(HttpResponse { status: 200, body: vec![] }));

        revoke(&account, &issuer(), &transport).await.unwrap();
        let calls = transport.post_form_calls();
        assert!(calls[0].1.contains(&("token".to_string(), "R".to_string())));
    }

    #[tokio::test]
    async fn provider_failure_is_surfaced() {
        let mut account = Account::new("s1", "https://issuer.example");
        account.refresh_token = SecretBuffer::from("R-revoked-already");
        let transport = MockHttpTransport::new();
        transport.queue_post_form(Ok(HttpResponse {
            status: 400,
            body: serde_json::to_vec(&serde_json::json!({"error": "invalid_request"})).unwrap(),
        }));

        let err = revoke(&account, &issuer(), &transport).await.unwrap_err();
        assert!(matches!(err, Error::OidcError { .. }));
    }
}
