//! Dynamic client registration (§4.2, RFC 7591-shaped). Per §9's first open question, a
//! successful registration does NOT insert the account into the registry — the caller follows up
//! with `add` if it wants the new client persisted.

use crate::account::Account;
use crate::discovery::IssuerConfig;
use crate::error::{
    Error,
    Result,
};
use crate::flows::parse_error_body;
use crate::transport::HttpTransport;

pub struct RegistrationOutcome {
    pub client_id: String,
    pub client_secret: String,
    pub scopes: String,
    /// Set when the password grant was dropped and the registration retried without it.
    pub note: Option<String>,
    /// Set when the granted `scope` is missing `openid` or `offline_access`; the caller decides
    /// whether that's fatal.
    pub insufficient_scope: bool,
}

#[derive(serde::Deserialize)]
struct RegistrationResponse {
    client_id: String,
    #[serde(default)]
    client_secret: String,
    #[serde(default)]
    scope: Option<String>,
}

/// Registers a new client for `account.scopes` and `requested_flows`. If the provider rejects the
/// request and `requested_flows` included `password`, retries once with it removed.
pub async fn register(account: &mut Account, issuer: &IssuerConfig, transport: &impl HttpTransport, requested_flows: &[&str]) -> Result<RegistrationOutcome> {
    let endpoint = issuer.registration_endpoint.as_deref().ok_or_else(|| Error::UnknownFlow("register".into()))?;

    match attempt(account, endpoint, transport, requested_flows).await {
        Ok(mut outcome) => {
            finish(account, &mut outcome);
            Ok(outcome)
        },
        Err(_) if requested_flows.contains(&"password") => {
            let reduced: Vec<&str> = requested_flows.iter().copied().filter(|f| *f != "password").collect();
            let mut outcome = attempt(account, endpoint, transport, &reduced).await?;
            outcome.note = Some("provider does not support the password grant for this client".to_string());
            finish(account, &mut outcome);
            Ok(outcome)
        },
        Err(e) => Err(e),
    }
}

fn finish(account: &mut Account, outcome: &mut RegistrationOutcome) {
    account.client_id = outcome.client_id.clone();
    account.client_secret.set(outcome.client_secret.clone());
    account.scopes = outcome.scopes.clone();
    let granted = account.scope_list();
    outcome.insufficient_scope = !(granted.contains(&"openid") && granted.contains(&"offline_access"));
}

async fn attempt(account: &Account, endpoint: &str, transport: &impl HttpTransport, flows: &[&str]) -> Result<RegistrationOutcome> {
    let grant_types = flow_grant_types(flows).join(",");
    let redirect_uris = account.redirect_uris.join(",");

    let mut form = vec![("grant_types", grant_types.as_str()), ("scope", account.scopes.as_str())];
    if !redirect_uris.is_empty() {
        form.push(("redirect_uris", redirect_uris.as_str()));
    }

    let response = transport.post_form(endpoint, &form).await?;
    if !response.is_success() {
        return Err(parse_error_body(&response.body));
    }

    let parsed: RegistrationResponse = response.json()?;
    Ok(RegistrationOutcome {
        client_id: parsed.client_id,
        client_secret: parsed.client_secret,
        scopes: parsed.scope.unwrap_or_else(|| account.scopes.clone()),
        note: None,
        insufficient_scope: false,
    })
}

fn flow_grant_types(flows: &[&str]) -> Vec<&'static str> {
    flows
        .iter()
        .filter_map(|f| match *f {
            "refresh" => Some("refresh_token"),
            "password" => Some("password"),
            "code" => Some("authorization_code"),
            "device" => Some("urn:ietf:params:oauth:grant-type:device_code"),
            _ => None,
        })
        .collect()
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
            device_authorization_endpoint: None,
            registration_endpoint: Some("https://issuer.example/register".into()),
            revocation_endpoint: None,
            scopes_supported: vec![],
            grant_types_supported: vec![],
        }
    }

    #[tokio::test]
    async fn successful_registration_sets_account_fields_and_does_not_touch_registry() {
        let mut account = Account::new("s1", "https://issuer.example");
        let transport = MockHttpTransport::new();
        transport.queue_post_form(Ok(HttpResponse {
            status: 201,
            body: serde_json::to_vec(&serde_json::json!({
                "client_id": "c1",
                "client_secret": "cs1",
                "scope": "openid offline_access"
            }))
            .unwrap(),
        }));

        let outcome = register(&mut account, &issuer(), &transport, &["refresh"]).await.unwrap();
        assert_eq!(outcome.client_id, "c1");
        assert!(outcome.note.is_none());
        assert!(!outcome.insufficient_scope);
        assert_eq!(account.client_id, "c1");
    }

    #[tokio::test]
    async fn rejected_password_grant_retries_without_it() {
        let mut account = Account::new("s1", "https://issuer.example");
        let transport = MockHttpTransport::new();
        transport.queue_post_form(Ok(HttpResponse {
            status: 400,
            body: serde_json::to_vec(&serde_json::json!({"error": "invalid_client_metadata"})).unwrap(),
        }));
        transport.queue_post_form(Ok(HttpResponse {
            status: 201,
            body: serde_json::to_vec(&serde_json::json!({"client_id": "c1", "scope": "openid offline_access"})).unwrap(),
        }));

        let outcome = register(&mut account, &issuer(), &transport, &["password", "refresh"]).await.unwrap();
        assert_eq!(outcome.note.as_deref(), Some("provider does not support the password grant for this client"));
        assert_eq!(transport.post_form_calls().len(), 2);
    }

    #[tokio::test]
    async fn missing_required_scope_is_flagged_not_failed() {
        let mut account = Account::new("s1", "https://issuer.example");
        let transport = MockHttpTransport::new();
        transport.queue_post_form(Ok(HttpResponse {
            status: 201,
            body: serde_json::to_vec(&serde_json::json!({"client_id": "c1", "scope": "openid"})).unwrap(),
        }));

        let outcome = register(&mut account, &issuer(), &transport, &["refresh"]).await.unwrap();
        assert!(outcome.insufficient_scope);
    }
}
