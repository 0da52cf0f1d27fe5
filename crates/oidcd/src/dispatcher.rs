//! IPC Dispatcher (§4.3): accepts connections on the agent socket, reads one request, dispatches
//! to a handler, writes one response. Every connection gets its own task so a slow provider
//! round-trip on one client never blocks another; a handler panic is caught so the connection
//! still gets a response instead of hanging.

use std::sync::Arc;

use oidcd_auth::{
    Account,
    DiscoveryClient,
    IssuerConfig,
};
use oidcd_ipc::{
    BufferedReader,
    RecvMessage,
    SendMessage,
};
use tokio::net::{
    UnixListener,
    UnixStream,
};
use tracing::{
    debug,
    warn,
};

use crate::agent_state::{
    AgentState,
    DEFAULT_MIN_VALID_PERIOD,
    now,
};
use crate::callback::{
    CallbackCoordinator,
    PendingOutcome,
};
use crate::error::AgentError;
use crate::wire::{
    Request,
    Response,
};

pub struct Dispatcher {
    state: Arc<AgentState>,
    callbacks: Arc<CallbackCoordinator>,
}

impl Dispatcher {
    pub fn new(state: Arc<AgentState>, callbacks: Arc<CallbackCoordinator>) -> Self {
        Self { state, callbacks }
    }

    pub async fn run(self: Arc<Self>, listener: UnixListener, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, _addr)) => {
                            let dispatcher = self.clone();
                            tokio::spawn(async move { dispatcher.handle_connection(stream).await; });
                        },
                        Err(e) => warn!(error = %e, "accept failed"),
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }

    async fn handle_connection(self: Arc<Self>, stream: UnixStream) {
        let mut conn = BufferedReader::new(stream);
        let request: Request = match conn.recv_message().await {
            Ok(Some(request)) => request,
            Ok(None) => return,
            Err(e) => {
                debug!(error = %e, "failed to read request frame");
                return;
            },
        };

        // A handler panic is caught by running it on its own task: the loop itself must never go
        // down over one bad request, and the connection still gets exactly one response (§7).
        let dispatcher = self.clone();
        let response = match tokio::spawn(async move { dispatcher.dispatch(request).await }).await {
            Ok(response) => response,
            Err(e) => {
                warn!(panic = %e, "handler panicked");
                Response::failure(&AgentError::Auth(oidcd_auth::Error::Internal("handler panicked".into())))
            },
        };

        if let Err(e) = conn.send_message(&response).await {
            debug!(error = %e, "failed to write response frame");
        }
    }

    async fn dispatch(&self, request: Request) -> Response {
        let Some(kind) = request.request.as_deref() else {
            return Response::bad_request("missing required field: request");
        };

        if self.state.registry.is_locked() && kind != "unlock" {
            return Response::failure(&AgentError::Auth(oidcd_auth::Error::AgentLocked));
        }

        let result = match kind {
            "gen" => self.handle_gen(&request).await,
            "add" => self.handle_add(&request).await,
            "remove" => self.handle_remove(&request),
            "delete" => self.handle_delete(&request).await,
            "remove_all" => self.handle_remove_all(),
            "access_token" => self.handle_access_token(&request).await,
            "register" => self.handle_register(&request).await,
            "code_exchange" => self.handle_code_exchange(&request).await,
            "state_lookup" => self.handle_state_lookup(&request),
            "device_lookup" => self.handle_device_lookup(&request).await,
            "term_http" => self.handle_term_http(&request),
            "lock" => self.handle_lock(&request),
            "unlock" => self.handle_unlock(&request),
            other => return Response::bad_request(format!("unknown request {other:?}")),
        };

        result.into()
    }

    async fn issuer_for(&self, issuer_url: &str) -> Result<IssuerConfig, AgentError> {
        self.state.discovery.get(issuer_url).await.map_err(Into::into)
    }

    fn parse_account(config: &str) -> Result<Account, AgentError> {
        serde_json::from_str(config).map_err(|e| AgentError::BadRequest(format!("invalid config: {e}")))
    }

    async fn handle_gen(&self, request: &Request) -> Result<Response, AgentError> {
        let mut account = Self::parse_account(request.require_config()?)?;
        let issuer = self.issuer_for(&account.issuer_url).await?;

        let mut last_err = None;
        for flow in request.flow_list() {
            let outcome = match flow {
                "refresh" => oidcd_auth::flows::refresh::refresh(&mut account, &issuer, &self.state.transport, DEFAULT_MIN_VALID_PERIOD, None)
                    .await
                    .map(|_| None),
                "password" => oidcd_auth::flows::password::password(&mut account, &issuer, &self.state.transport, self.state.frontend.as_ref())
                    .await
                    .map(|_| None),
                // The code flow's state lives on past this call: the browser redirect lands on
                // the out-of-process Callback Receiver, which only ever hands `code_exchange`
                // the bare code/state/verifier, not the original config. So the mutated account
                // (carrying `used_state`/`pkce_code_verifier`) has to be resolvable by `state`
                // from the registry rather than dropped at the end of this function.
                "code" => match oidcd_auth::flows::code::initiate(&mut account, &issuer) {
                    Ok(req) => {
                        let response = Response::accepted().with("codeuri", req.url).with("state", req.state);
                        self.state.registry.insert(account);
                        return Ok(response);
                    },
                    Err(e) => Err(e),
                },
                "device" => oidcd_auth::flows::device::request_device_authorization(&account, &issuer, &self.state.transport).await.map(|device| {
                    Some(
                        Response::accepted()
                            .with("device_code", device.device_code)
                            .with("user_code", device.user_code)
                            .with("verification_uri", device.verification_uri)
                            .with("verification_uri_complete", device.verification_uri_complete)
                            .with("expires_in", device.expires_in)
                            .with("interval", device.interval),
                    )
                }),
                other => Err(oidcd_auth::Error::UnknownFlow(other.to_string())),
            };

            match outcome {
                Ok(Some(response)) => return Ok(response),
                Ok(None) => {
                    let config = serde_json::to_string(&account).map_err(|e| AgentError::BadRequest(e.to_string()))?;
                    return Ok(Response::success().with("config", config));
                },
                Err(e) => last_err = Some(e),
            }
        }

        Err(last_err.unwrap_or(oidcd_auth::Error::BadRequest("no flow succeeded".into())).into())
    }

    async fn handle_add(&self, request: &Request) -> Result<Response, AgentError> {
        let account = Self::parse_account(request.require_config()?)?;
        if self.state.registry.contains(&account.shortname) {
            return Ok(Response::success().with("info", "account already loaded."));
        }

        let issuer = self.issuer_for(&account.issuer_url).await?;
        let mut account = account;
        oidcd_auth::flows::refresh::refresh(&mut account, &issuer, &self.state.transport, DEFAULT_MIN_VALID_PERIOD, None).await?;

        account.death = self.state.death_for_timeout(request.timeout.as_deref(), now());
        account.confirmation_required = request.confirm.unwrap_or(self.state.confirm_default);
        let timeout_seconds = request.timeout.as_deref().unwrap_or(&self.state.default_timeout.to_string()).to_string();
        self.state.registry.insert(account);

        Ok(Response::success().with("info", format!("Lifetime set to {timeout_seconds} seconds")))
    }

    fn handle_remove(&self, request: &Request) -> Result<Response, AgentError> {
        let shortname = request.require_account_name()?;
        if self.state.registry.remove_by_shortname(shortname) {
            Ok(Response::success())
        } else {
            Ok(Response::not_found(format!("{shortname} not loaded")))
        }
    }

    async fn handle_delete(&self, request: &Request) -> Result<Response, AgentError> {
        let account = Self::parse_account(request.require_config()?)?;
        let loaded = self
            .state
            .registry
            .with(&account.shortname, |a| (a.refresh_token.expose_str().to_string(), a.access_token.expose_str().to_string(), a.client_id.clone(), a.client_secret.expose_str().to_string()));
        let Some((refresh_token, access_token, client_id, client_secret)) = loaded else {
            return Ok(Response::not_found(format!("{} not loaded", account.shortname)));
        };

        let issuer = self.issuer_for(&account.issuer_url).await?;
        let mut scratch = Account::new(&account.shortname, &account.issuer_url);
        scratch.refresh_token.set(refresh_token);
        scratch.access_token.set(access_token);
        scratch.client_id = client_id;
        scratch.client_secret.set(client_secret);

        oidcd_auth::flows::revoke::revoke(&scratch, &issuer, &self.state.transport).await?;
        self.state.registry.remove_by_shortname(&account.shortname);
        Ok(Response::success())
    }

    fn handle_remove_all(&self) -> Result<Response, AgentError> {
        self.state.registry.remove_all();
        Ok(Response::success())
    }

    async fn handle_access_token(&self, request: &Request) -> Result<Response, AgentError> {
        let shortname = request.require_account_name()?.to_string();
        let min_valid_period = request.min_valid_period.unwrap_or(DEFAULT_MIN_VALID_PERIOD);

        if !self.state.registry.contains(&shortname) {
            if self.state.no_autoload {
                return Err(oidcd_auth::Error::AccountNotLoaded.into());
            }
            match self.state.frontend.request_autoload(&shortname).await {
                Ok(Some(config)) => {
                    let mut add_request = Request {
                        request: Some("add".into()),
                        config: Some(config),
                        flow: None,
                        flow_list: None,
                        account_name: None,
                        min_valid_period: None,
                        scope: None,
                        application_hint: None,
                        timeout: None,
                        confirm: None,
                        code: None,
                        redirect_uri: None,
                        state: None,
                        code_verifier: None,
                        device: None,
                        access_token: None,
                        password: None,
                    };
                    add_request.timeout = Some(self.state.default_timeout.to_string());
                    self.handle_add(&add_request).await?;
                },
                Ok(None) | Err(oidcd_auth::Error::UserCancel) => return Err(oidcd_auth::Error::AccountNotLoaded.into()),
                Err(e) => return Err(e.into()),
            }
        }

        let (confirmation_required, issuer_url) = self
            .state
            .registry
            .with(&shortname, |a| (a.confirmation_required, a.issuer_url.clone()))
            .ok_or(oidcd_auth::Error::AccountNotLoaded)?;

        if confirmation_required || self.state.confirm_default {
            let accepted = self.state.frontend.request_confirm(&shortname, request.application_hint.as_deref()).await?;
            if !accepted {
                return Err(oidcd_auth::Error::UserDenied.into());
            }
        }

        let issuer = self.issuer_for(&issuer_url).await?;
        let scope = request.scope.clone();

        let mut account = self.state.registry.with(&shortname, Clone::clone).ok_or(oidcd_auth::Error::AccountNotLoaded)?;
        oidcd_auth::flows::refresh::refresh(&mut account, &issuer, &self.state.transport, min_valid_period, scope.as_deref()).await?;
        let access_token = account.access_token.expose_str().to_string();
        let expires_at = account.access_token_expires_at;
        self.state.registry.insert(account);

        Ok(Response::success().with("access_token", access_token).with("issuer_url", issuer_url).with("expires_at", expires_at))
    }

    async fn handle_register(&self, request: &Request) -> Result<Response, AgentError> {
        let mut account = Self::parse_account(request.require_config()?)?;
        let issuer = self.issuer_for(&account.issuer_url).await?;
        let flows: Vec<&str> = request.flow_list.as_deref().map(|s| s.split(',').map(str::trim).filter(|s| !s.is_empty()).collect()).unwrap_or_default();

        let outcome = oidcd_auth::flows::register::register(&mut account, &issuer, &self.state.transport, &flows).await?;
        let config = serde_json::to_string(&account).map_err(|e| AgentError::BadRequest(e.to_string()))?;

        let mut response = Response::success().with("config", config);
        if let Some(note) = outcome.note {
            response = response.with("info", note);
        }
        if outcome.insufficient_scope {
            response = response.with("error", "insufficient scope");
        }
        Ok(response)
    }

    async fn handle_code_exchange(&self, request: &Request) -> Result<Response, AgentError> {
        let code = request.code.as_deref().ok_or_else(|| AgentError::BadRequest("missing required field: code".into()))?;
        let redirect_uri = request.redirect_uri.as_deref().ok_or_else(|| AgentError::BadRequest("missing required field: redirect_uri".into()))?;
        let state = request.require_state()?;
        let code_verifier = request.code_verifier.as_deref().ok_or_else(|| AgentError::BadRequest("missing required field: code_verifier".into()))?;

        // The account carrying this `used_state`/`pkce_code_verifier` was inserted by `gen`'s
        // code branch, not handed to us by the caller — the same lookup `handle_term_http` uses.
        let mut account = self
            .state
            .registry
            .with_by_state(state, |account| account.clone())
            .ok_or_else(|| AgentError::Auth(oidcd_auth::Error::NotFound(format!("no pending code flow for state {state:?}"))))?;

        let issuer = self.issuer_for(&account.issuer_url).await?;
        oidcd_auth::flows::code::exchange(&mut account, &issuer, &self.state.transport, code, redirect_uri, state, code_verifier).await?;

        let config = serde_json::to_string(&account).map_err(|e| AgentError::BadRequest(e.to_string()))?;
        self.callbacks.record_exchanged(state, config);
        self.state.registry.insert(account);
        Ok(Response::accepted())
    }

    fn handle_state_lookup(&self, request: &Request) -> Result<Response, AgentError> {
        let state = request.require_state()?;
        match self.callbacks.drain(state) {
            Some(PendingOutcome::Exchanged { account_config }) => Ok(Response::success().with("config", account_config)),
            Some(PendingOutcome::TimedOut) => Err(oidcd_auth::Error::Timeout.into()),
            None => Ok(Response::not_found(format!("no pending code flow for state {state:?}"))),
        }
    }

    async fn handle_device_lookup(&self, request: &Request) -> Result<Response, AgentError> {
        let mut account = Self::parse_account(request.require_config()?)?;
        let device_value = request.device.clone().ok_or_else(|| AgentError::BadRequest("missing required field: device".into()))?;
        let device: oidcd_auth::flows::device::DeviceAuthorization =
            serde_json::from_value(device_value).map_err(|e| AgentError::BadRequest(format!("invalid device: {e}")))?;

        let issuer = self.issuer_for(&account.issuer_url).await?;
        oidcd_auth::flows::device::poll_until_complete(&mut account, &issuer, &self.state.transport, &device).await?;

        let config = serde_json::to_string(&account).map_err(|e| AgentError::BadRequest(e.to_string()))?;
        Ok(Response::success().with("config", config))
    }

    fn handle_term_http(&self, request: &Request) -> Result<Response, AgentError> {
        let state = request.require_state()?;
        self.state.registry.with_by_state(state, |account| oidcd_auth::flows::code::abandon(account));
        self.callbacks.record_timed_out(state);
        Ok(Response::success())
    }

    fn handle_lock(&self, request: &Request) -> Result<Response, AgentError> {
        let password = request.require_password()?;
        self.state.registry.lock(password)?;
        Ok(Response::success())
    }

    fn handle_unlock(&self, request: &Request) -> Result<Response, AgentError> {
        let password = request.require_password()?;
        self.state.registry.unlock(password)?;
        Ok(Response::success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oidcd_auth::frontend::MockFrontend;

    fn make_dispatcher() -> Arc<Dispatcher> {
        let frontend = Arc::new(MockFrontend::new());
        let state = Arc::new(AgentState::new(frontend, 3600, true, false));
        Arc::new(Dispatcher::new(state, Arc::new(CallbackCoordinator::new())))
    }

    #[tokio::test]
    async fn unknown_request_is_badrequest() {
        let dispatcher = make_dispatcher();
        let request = Request {
            request: Some("bogus".into()),
            config: None,
            flow: None,
            flow_list: None,
            account_name: None,
            min_valid_period: None,
            scope: None,
            application_hint: None,
            timeout: None,
            confirm: None,
            code: None,
            redirect_uri: None,
            state: None,
            code_verifier: None,
            device: None,
            access_token: None,
            password: None,
        };
        let response = dispatcher.dispatch(request).await;
        assert_eq!(response.status, "badrequest");
    }

    #[tokio::test]
    async fn access_token_on_unknown_account_with_no_autoload_fails() {
        let frontend = Arc::new(MockFrontend::new());
        let state = Arc::new(AgentState::new(frontend, 3600, true, false));
        let dispatcher = Dispatcher::new(state, Arc::new(CallbackCoordinator::new()));
        let request = Request {
            request: Some("access_token".into()),
            config: None,
            flow: None,
            flow_list: None,
            account_name: Some("unknown".into()),
            min_valid_period: None,
            scope: None,
            application_hint: None,
            timeout: None,
            confirm: None,
            code: None,
            redirect_uri: None,
            state: None,
            code_verifier: None,
            device: None,
            access_token: None,
            password: None,
        };
        let response = dispatcher.dispatch(request).await;
        assert_eq!(response.status, "failure");
        assert_eq!(response.fields.get("error").and_then(|v| v.as_str()), Some("account not loaded"));
    }

    #[tokio::test]
    async fn lock_rejects_every_other_request() {
        let dispatcher = make_dispatcher();
        dispatcher.state.registry.lock("pw").unwrap();

        let request = Request {
            request: Some("remove_all".into()),
            config: None,
            flow: None,
            flow_list: None,
            account_name: None,
            min_valid_period: None,
            scope: None,
            application_hint: None,
            timeout: None,
            confirm: None,
            code: None,
            redirect_uri: None,
            state: None,
            code_verifier: None,
            device: None,
            access_token: None,
            password: None,
        };
        let response = dispatcher.dispatch(request).await;
        assert_eq!(response.fields.get("error").and_then(|v| v.as_str()), Some("agent locked"));
    }
}
