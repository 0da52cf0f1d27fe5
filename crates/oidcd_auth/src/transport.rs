//! The HTTP boundary between the Flow Engine and an OIDC provider, abstracted behind a trait so
//! every flow can be exercised in tests without a live network call.

use std::collections::VecDeque;
use std::sync::atomic::{
    AtomicUsize,
    Ordering,
};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{
    Error,
    Result,
};

pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| Error::Internal(format!("invalid json response: {e}")))
    }
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get_json(&self, url: &str) -> Result<Vec<u8>>;
    async fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<HttpResponse>;
}

pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .expect("reqwest client builds with default TLS config"),
        }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get_json(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .header("accept", "application/json")
            .send()
            .await
            .map_err(|e| Error::NetworkError(url.to_string(), e))?;
        if !response.status().is_success() {
            return Err(Error::Internal(format!("{url} returned HTTP {}", response.status())));
        }
        let bytes = response.bytes().await.map_err(|e| Error::NetworkError(url.to_string(), e))?;
        Ok(bytes.to_vec())
    }

    async fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<HttpResponse> {
        let response = self
            .client
            .post(url)
            .header("accept", "application/json")
            .form(form)
            .send()
            .await
            .map_err(|e| Error::NetworkError(url.to_string(), e))?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(|e| Error::NetworkError(url.to_string(), e))?.to_vec();
        Ok(HttpResponse { status, body })
    }
}

/// Records every call it receives and replays queued responses in FIFO order, so a flow test can
/// assert both on outcome and on exactly what was sent.
#[derive(Default)]
pub struct MockHttpTransport {
    get_json_queue: Mutex<VecDeque<Result<Vec<u8>>>>,
    post_form_queue: Mutex<VecDeque<Result<HttpResponse>>>,
    get_json_calls: AtomicUsize,
    post_form_calls: Mutex<Vec<(String, Vec<(String, String)>)>>,
}

impl MockHttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_get_json(&self, result: Result<Vec<u8>>) {
        self.get_json_queue.lock().push_back(result);
    }

    pub fn queue_post_form(&self, result: Result<HttpResponse>) {
        self.post_form_queue.lock().push_back(result);
    }

    pub fn get_json_call_count(&self) -> usize {
        self.get_json_calls.load(Ordering::SeqCst)
    }

    pub fn post_form_calls(&self) -> Vec<(String, Vec<(String, String)>)> {
        self.post_form_calls.lock().clone()
    }
}

#[async_trait]
impl HttpTransport for MockHttpTransport {
    async fn get_json(&self, _url: &str) -> Result<Vec<u8>> {
        self.get_json_calls.fetch_add(1, Ordering::SeqCst);
        self.get_json_queue
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(Error::Internal("no queued mock response".into())))
    }

    async fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<HttpResponse> {
        self.post_form_calls
            .lock()
            .push((url.to_string(), form.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()));
        self.post_form_queue
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(Error::Internal("no queued mock response".into())))
    }
}
