use serde::{
    Deserialize,
    Serialize,
};

use crate::secret::SecretBuffer;

fn now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// One configured identity: an issuer, a client registered against it, and whatever tokens have
/// been obtained so far. Any field that can hold a credential is a [`SecretBuffer`]; everything
/// else is plain data that is safe to echo back in a log line.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Account {
    pub shortname: String,
    pub issuer_url: String,
    pub client_id: String,
    #[serde(default)]
    pub client_secret: SecretBuffer,
    /// Whitespace-separated, matching the wire format; helpers below split/join it.
    #[serde(default)]
    pub scopes: String,
    #[serde(default)]
    pub redirect_uris: Vec<String>,

    #[serde(default)]
    pub refresh_token: SecretBuffer,
    #[serde(default)]
    pub access_token: SecretBuffer,
    #[serde(default)]
    pub access_token_expires_at: u64,
    /// Scopes actually granted with the cached `access_token`, used for the subset check in the
    /// refresh flow's cache-hit path.
    #[serde(default)]
    pub access_token_scopes: String,

    #[serde(default)]
    pub username: SecretBuffer,
    #[serde(default)]
    pub password: SecretBuffer,

    #[serde(default)]
    pub pkce_code_verifier: SecretBuffer,
    #[serde(default)]
    pub used_state: Option<String>,

    /// 0 = never expires; otherwise an absolute UNIX time the Reaper evicts this record at.
    #[serde(default)]
    pub death: u64,
    #[serde(default)]
    pub confirmation_required: bool,

    /// True once every secret field above has been replaced with its encrypted form by a
    /// registry `lock()`. Checked defensively by account-level helpers so a bug in the caller
    /// can't accidentally hand out a "fresh" token computed against ciphertext.
    #[serde(default)]
    pub locked: bool,
}

impl Account {
    pub fn new(shortname: impl Into<String>, issuer_url: impl Into<String>) -> Self {
        Self {
            shortname: shortname.into(),
            issuer_url: issuer_url.into(),
            client_id: String::new(),
            client_secret: SecretBuffer::default(),
            scopes: String::new(),
            redirect_uris: Vec::new(),
            refresh_token: SecretBuffer::default(),
            access_token: SecretBuffer::default(),
            access_token_expires_at: 0,
            access_token_scopes: String::new(),
            username: SecretBuffer::default(),
            password: SecretBuffer::default(),
            pkce_code_verifier: SecretBuffer::default(),
            used_state: None,
            death: 0,
            confirmation_required: false,
            locked: false,
        }
    }

    pub fn scope_list(&self) -> Vec<&str> {
        self.scopes.split_whitespace().collect()
    }

    pub fn has_required_scopes(&self) -> bool {
        let scopes = self.scope_list();
        scopes.contains(&"openid") && scopes.contains(&"offline_access")
    }

    /// Non-empty and not known-revoked. Revocation clears the buffer outright, so "non-empty" is
    /// the whole predicate; kept as a named method because the invariant in §8 is phrased in
    /// terms of it.
    pub fn refresh_token_is_valid(&self) -> bool {
        !self.refresh_token.is_empty()
    }

    /// Is the cached access token still usable for a request that needs at least
    /// `min_valid_period` seconds of remaining lifetime and a scope that's a subset of what was
    /// actually granted?
    pub fn access_token_is_fresh(&self, min_valid_period: u64, requested_scope: Option<&str>) -> bool {
        if self.access_token.is_empty() || self.locked {
            return false;
        }
        let remaining = self.access_token_expires_at.saturating_sub(now());
        if remaining < min_valid_period {
            return false;
        }
        match requested_scope {
            Some(requested) => {
                let granted = self.access_token_scopes.split_whitespace().collect::<Vec<_>>();
                requested.split_whitespace().all(|s| granted.contains(&s))
            },
            None => true,
        }
    }

    pub fn set_tokens(&mut self, access_token: String, expires_in: u64, scopes: &str, refresh_token: Option<String>) {
        self.access_token.set(access_token);
        self.access_token_expires_at = now().saturating_add(expires_in);
        self.access_token_scopes = scopes.to_string();
        if let Some(rt) = refresh_token {
            self.refresh_token.set(rt);
        }
    }

    /// Clears the scratch state for an in-flight code flow. Called on `Exchanged`, `TimedOut`,
    /// and `Cancelled` transitions alike — §4.2 requires every exit from `Initiated` to clear
    /// `pkce_code_verifier`.
    pub fn clear_code_flow_scratch(&mut self) {
        self.pkce_code_verifier.clear();
        self.used_state = None;
    }

    /// Wipes the password-flow credentials. Called unconditionally after a single POST attempt,
    /// success or failure.
    pub fn clear_password_scratch(&mut self) {
        self.username.clear();
        self.password.clear();
    }

    pub fn is_dead(&self, at: u64) -> bool {
        self.death > 0 && self.death <= at
    }

    /// Wipes every secret field in place. Used on unload, `remove_all`, and shutdown so that no
    /// plaintext copy survives the record itself going out of scope.
    pub fn wipe(&mut self) {
        self.client_secret.clear();
        self.refresh_token.clear();
        self.access_token.clear();
        self.username.clear();
        self.password.clear();
        self.pkce_code_verifier.clear();
    }
}

impl Drop for Account {
    fn drop(&mut self) {
        self.wipe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_token_requires_min_valid_period_and_scope_subset() {
        let mut acct = Account::new("s1", "https://issuer.example");
        acct.set_tokens("A".into(), 3600, "openid profile", None);
        assert!(acct.access_token_is_fresh(300, Some("openid")));
        assert!(!acct.access_token_is_fresh(300, Some("admin")));
        assert!(!acct.access_token_is_fresh(10_000, Some("openid")));
    }

    #[test]
    fn wipe_clears_every_secret_field() {
        let mut acct = Account::new("s1", "https://issuer.example");
        acct.refresh_token = SecretBuffer::from("R");
        acct.wipe();
        assert!(acct.refresh_token.is_empty());
    }

    #[test]
    fn required_scopes_checked_after_registration() {
        let mut acct = Account::new("s1", "https://issuer.example");
        assert!(!acct.has_required_scopes());
        acct.scopes = "openid offline_access profile".to_string();
        assert!(acct.has_required_scopes());
    }
}
