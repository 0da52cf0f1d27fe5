//! `getAccessTokenUsingRefreshFlow` (§4.2).

use crate::account::Account;
use crate::discovery::IssuerConfig;
use crate::error::{
    Error,
    Result,
};
use crate::flows::{
    TokenResponse,
    parse_error_body,
};
use crate::transport::HttpTransport;

/// Serves the cached access token when it's still fresh, otherwise exchanges the refresh token
/// for a new one. Rotates the refresh token in place if the provider issues a new one.
pub async fn refresh(
    account: &mut Account,
    issuer: &IssuerConfig,
    transport: &impl HttpTransport,
    min_valid_period: u64,
    scope: Option<&str>,
) -> Result<()> {
    if account.access_token_is_fresh(min_valid_period, scope) {
        return Ok(());
    }

    if !account.refresh_token_is_valid() {
        return Err(Error::NoRefreshToken);
    }

    let refresh_token = account.refresh_token.expose_str().to_string();
    let client_id = account.client_id.clone();
    let client_secret = account.client_secret.expose_str().to_string();

    let mut form = vec![
        ("grant_type", "refresh_token"),
        ("refresh_token", refresh_token.as_str()),
        ("client_id", client_id.as_str()),
    ];
    if !client_secret.is_empty() {
        form.push(("client_secret", client_secret.as_str()));
    }
    if let Some(scope) = scope {
        form.push(("scope", scope));
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
