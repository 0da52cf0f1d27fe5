//! The concrete [`oidcd_auth::Frontend`] implementation: a full-duplex pair of anonymous pipes
//! inherited by the prompter process (§4.5, §6), framed with the same NUL-terminated JSON codec
//! as the agent socket. Only one agent-initiated request may be outstanding at a time, enforced
//! by holding the whole channel behind a single async mutex for the duration of a round trip.

use std::pin::Pin;
use std::task::{
    Context,
    Poll,
};

use async_trait::async_trait;
use oidcd_auth::error::{
    Error,
    Result,
};
use oidcd_auth::{
    Credentials,
    Frontend,
};
use oidcd_ipc::{
    BufferedReader,
    SendRecvMessage,
};
use serde::{
    Deserialize,
    Serialize,
};
use tokio::io::{
    AsyncRead,
    AsyncWrite,
    ReadBuf,
};
use tokio::net::unix::pipe;
use tokio::sync::Mutex;

/// Joins a pipe read half and a pipe write half into one `AsyncRead + AsyncWrite` stream, the
/// shape `BufferedReader` and `SendRecvMessage` expect.
pub struct DuplexPipe {
    reader: pipe::Receiver,
    writer: pipe::Sender,
}

impl DuplexPipe {
    pub fn new(reader: pipe::Receiver, writer: pipe::Sender) -> Self {
        Self { reader, writer }
    }
}

impl AsyncRead for DuplexPipe {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        Pin::new(&mut this.reader).poll_read(cx, buf)
    }
}

impl AsyncWrite for DuplexPipe {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<std::io::Result<usize>> {
        let this = self.get_mut();
        Pin::new(&mut this.writer).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        Pin::new(&mut this.writer).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        Pin::new(&mut this.writer).poll_shutdown(cx)
    }
}

#[derive(Serialize)]
#[serde(tag = "request")]
enum FrontendRequest<'a> {
    #[serde(rename = "INT_REQUEST_AUTOLOAD")]
    Autoload { shortname: &'a str },
    #[serde(rename = "INT_REQUEST_CONFIRM")]
    Confirm {
        shortname: &'a str,
        application_hint: Option<&'a str>,
    },
    #[serde(rename = "INT_REQUEST_CREDENTIALS")]
    Credentials { shortname: &'a str },
}

#[derive(Deserialize)]
struct FrontendResponse {
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    config: Option<String>,
    #[serde(default)]
    accept: Option<bool>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

pub struct PipeFrontend {
    channel: Mutex<BufferedReader<DuplexPipe>>,
}

impl PipeFrontend {
    pub fn new(pipe: DuplexPipe) -> Self {
        Self {
            channel: Mutex::new(BufferedReader::new(pipe)),
        }
    }
}

#[async_trait]
impl Frontend for PipeFrontend {
    async fn request_autoload(&self, shortname: &str) -> Result<Option<String>> {
        let response = self.channel_roundtrip_autoload(shortname).await?;
        if let Some(err) = response.into_error_checked() {
            return Err(err);
        }
        Ok(response.config)
    }

    async fn request_confirm(&self, shortname: &str, application_hint: Option<&str>) -> Result<bool> {
        let response = self.channel_roundtrip_confirm(shortname, application_hint).await?;
        if let Some(err) = response.into_error_checked() {
            return Err(err);
        }
        Ok(response.accept.unwrap_or(false))
    }

    async fn request_credentials(&self, shortname: &str) -> Result<Credentials> {
        let response = self.channel_roundtrip_credentials(shortname).await?;
        if let Some(err) = response.into_error_checked() {
            return Err(err);
        }
        Ok(Credentials {
            username: response.username.unwrap_or_default(),
            password: response.password.unwrap_or_default(),
        })
    }
}

/// Small helpers so the three `Frontend` methods above don't each repeat the lock/send/recv/
/// error-translation dance inline.
impl PipeFrontend {
    async fn channel_roundtrip_autoload(&self, shortname: &str) -> Result<FrontendResponse> {
        self.roundtrip_inner(FrontendRequest::Autoload { shortname }).await
    }

    async fn channel_roundtrip_confirm(&self, shortname: &str, application_hint: Option<&str>) -> Result<FrontendResponse> {
        self.roundtrip_inner(FrontendRequest::Confirm { shortname, application_hint }).await
    }

    async fn channel_roundtrip_credentials(&self, shortname: &str) -> Result<FrontendResponse> {
        self.roundtrip_inner(FrontendRequest::Credentials { shortname }).await
    }

    async fn roundtrip_inner(&self, request: FrontendRequest<'_>) -> Result<FrontendResponse> {
        let mut channel = self.channel.lock().await;
        channel.send_recv_message(&request).await.map_err(|e| Error::Internal(format!("frontend channel: {e}")))
    }
}

impl FrontendResponse {
    fn into_error_checked(&self) -> Option<Error> {
        self.error_code.clone().map(|code| match code.as_str() {
            "user_cancel" => Error::UserCancel,
            "user_denied" => Error::UserDenied,
            other => Error::Internal(format!("frontend returned unknown error_code {other:?}")),
        })
    }
}
