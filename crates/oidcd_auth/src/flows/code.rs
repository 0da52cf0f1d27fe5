//! Authorization-code + PKCE flow (§4.2). `initiate` never touches the network: it hands back an
//! authorization URL for the caller to open in a browser. The Callback Receiver is driven by
//! whatever starts listening for `state`; this module only knows how to finalize or abandon the
//! in-flight attempt once a `code_exchange` or a timeout arrives.

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
use crate::pkce;
use crate::transport::HttpTransport;

#[derive(Debug)]
pub struct AuthorizationRequest {
    pub url: String,
    pub state: String,
}

/// Generates `state` and `code_verifier`, records them as scratch on the account (transitioning
/// it into `Initiated`), and builds the authorization URL. Fails fast if no `redirect_uri` is
/// configured.
pub fn initiate(account: &mut Account, issuer: &IssuerConfig) -> Result<AuthorizationRequest> {
    let redirect_uri = account.redirect_uris.first().ok_or(Error::NoRedirectUris)?.clone();

    let state = pkce::generate_state();
    let verifier = pkce::generate_code_verifier();
    let challenge = pkce::code_challenge_s256(&verifier);

    account.used_state = Some(state.clone());
    account.pkce_code_verifier.set(verifier);

    let url = format!(
        "{}?response_type=code&client_id={}&state={}&code_challenge={}&code_challenge_method=S256&redirect_uri={}&scope={}",
        issuer.authorization_endpoint,
        urlencoding_encode(&account.client_id),
        urlencoding_encode(&state),
        urlencoding_encode(&challenge),
        urlencoding_encode(&redirect_uri),
        urlencoding_encode(&account.scopes),
    );

    Ok(AuthorizationRequest { url, state })
}

/// `Initiated -> Exchanged`: validates `state` against the scratch recorded by `initiate`, then
/// redeems `code` at the token endpoint using the matching `code_verifier`. Clears the scratch
/// whether the exchange succeeds or fails, per §4.2's transition rule.
pub async fn exchange(
    account: &mut Account,
    issuer: &IssuerConfig,
    transport: &impl HttpTransport,
    code: &str,
    redirect_uri: &str,
    state: &str,
    code_verifier: &str,
) -> Result<()> {
    if account.used_state.as_deref() != Some(state) {
        return Err(Error::BadRequest("state does not match a pending code flow".into()));
    }
    if account.pkce_code_verifier.expose_str() != code_verifier {
        account.clear_code_flow_scratch();
        return Err(Error::BadRequest("code_verifier does not match the pending code flow".into()));
    }

    let result = redeem(account, issuer, transport, code, redirect_uri, code_verifier).await;
    account.clear_code_flow_scratch();
    result
}

/// `Initiated -> TimedOut | Cancelled`: abandons the in-flight attempt without contacting the
/// provider. Called when the Callback Receiver is torn down via `term_http` without a matching
/// exchange.
pub fn abandon(account: &mut Account) {
    account.clear_code_flow_scratch();
}

async fn redeem(
    account: &mut Account,
    issuer: &IssuerConfig,
    transport: &impl HttpTransport,
    code: &str,
    redirect_uri: &str,
    code_verifier: &str,
) -> Result<()> {
    let client_id = account.client_id.clone();
    let client_secret = account.client_secret.expose_str().to_string();

    let mut form = vec![
        ("grant_type", "authorization_code"),
        ("code", code),
        ("redirect_uri", redirect_uri),
        ("code_verifier", code_verifier),
        ("client_id", client_id.as_str()),
    ];
    if !client_secret.is_empty() {
        form.push(("client_secret", client_secret.as_str()));
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

/// Percent-encodes the handful of characters that show up in the values we interpolate into the
/// authorization URL. Not a general-purpose encoder: callers only ever pass query-value text.
fn urlencoding_encode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(byte as char),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}
