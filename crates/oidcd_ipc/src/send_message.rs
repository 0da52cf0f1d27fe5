use async_trait::async_trait;
use serde::Serialize;
use tokio::io::{
    AsyncWrite,
    AsyncWriteExt,
};

use crate::MAX_FRAME_LEN;
use crate::error::SendError;

/// Writes one NUL-terminated JSON frame to an async byte sink.
#[async_trait]
pub trait SendMessage {
    async fn send_message<M>(&mut self, message: &M) -> Result<(), SendError>
    where
        M: Serialize + Sync;
}

#[async_trait]
impl<T> SendMessage for T
where
    T: AsyncWrite + Unpin + Send,
{
    async fn send_message<M>(&mut self, message: &M) -> Result<(), SendError>
    where
        M: Serialize + Sync,
    {
        let mut encoded = serde_json::to_vec(message)?;
        if encoded.len() > MAX_FRAME_LEN {
            return Err(SendError::TooLarge(encoded.len(), MAX_FRAME_LEN));
        }
        encoded.push(0);
        self.write_all(&encoded).await?;
        self.flush().await?;
        tracing::trace!(bytes = encoded.len(), "sent ipc frame");
        Ok(())
    }
}
