use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{
    AsyncRead,
    AsyncWrite,
};

use crate::buffered_reader::BufferedReader;
use crate::error::{
    RecvError,
    SendError,
};
use crate::recv_message::RecvMessage;
use crate::send_message::SendMessage;

#[derive(Debug, thiserror::Error)]
pub enum SendRecvError {
    #[error(transparent)]
    Send(#[from] SendError),
    #[error(transparent)]
    Recv(#[from] RecvError),
    #[error("timed out waiting for a response")]
    Timeout,
    #[error("peer closed the connection without responding")]
    NoResponse,
}

/// Sends one frame and waits for exactly one reply frame — the shape every agent-initiated
/// Frontend Channel request takes.
#[async_trait]
pub trait SendRecvMessage {
    async fn send_recv_message<S, R>(&mut self, message: &S) -> Result<R, SendRecvError>
    where
        S: Serialize + Sync,
        R: DeserializeOwned;

    async fn send_recv_message_timeout<S, R>(&mut self, message: &S, timeout: Duration) -> Result<R, SendRecvError>
    where
        S: Serialize + Sync,
        R: DeserializeOwned;
}

#[async_trait]
impl<T> SendRecvMessage for BufferedReader<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send_recv_message<S, R>(&mut self, message: &S) -> Result<R, SendRecvError>
    where
        S: Serialize + Sync,
        R: DeserializeOwned,
    {
        self.send_message(message).await?;
        self.recv_message::<R>().await?.ok_or(SendRecvError::NoResponse)
    }

    async fn send_recv_message_timeout<S, R>(&mut self, message: &S, timeout: Duration) -> Result<R, SendRecvError>
    where
        S: Serialize + Sync,
        R: DeserializeOwned,
    {
        match tokio::time::timeout(timeout, self.send_recv_message(message)).await {
            Ok(res) => res,
            Err(_) => Err(SendRecvError::Timeout),
        }
    }
}
