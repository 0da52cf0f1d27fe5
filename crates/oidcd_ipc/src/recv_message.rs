use async_trait::async_trait;
use bytes::Buf;
use serde::de::DeserializeOwned;
use tokio::io::{
    AsyncRead,
    AsyncReadExt,
};

use crate::MAX_FRAME_LEN;
use crate::buffered_reader::BufferedReader;
use crate::error::RecvError;

/// Reads one NUL-terminated JSON frame at a time off an async byte stream.
#[async_trait]
pub trait RecvMessage {
    async fn recv_message<M>(&mut self) -> Result<Option<M>, RecvError>
    where
        M: DeserializeOwned;
}

#[async_trait]
impl<T> RecvMessage for BufferedReader<T>
where
    T: AsyncRead + Unpin + Send,
{
    async fn recv_message<M>(&mut self) -> Result<Option<M>, RecvError>
    where
        M: DeserializeOwned,
    {
        loop {
            if let Some(pos) = self.buffer.iter().position(|&b| b == 0) {
                if pos > MAX_FRAME_LEN {
                    self.buffer.advance(pos + 1);
                    return Err(RecvError::TooLarge(pos, MAX_FRAME_LEN));
                }
                let frame = self.buffer.split_to(pos);
                self.buffer.advance(1); // drop the NUL terminator
                let message = serde_json::from_slice(&frame)?;
                return Ok(Some(message));
            }

            if self.buffer.len() > MAX_FRAME_LEN {
                let len = self.buffer.len();
                self.buffer.clear();
                return Err(RecvError::TooLarge(len, MAX_FRAME_LEN));
            }

            let bytes = self.inner.read_buf(&mut self.buffer).await?;
            if bytes == 0 {
                return if self.buffer.is_empty() {
                    Ok(None)
                } else {
                    Err(RecvError::UnterminatedFrame)
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use serde::{
        Deserialize,
        Serialize,
    };

    use super::*;
    use crate::SendMessage;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Ping {
        n: u32,
    }

    fn mock(initial: Vec<u8>) -> BufferedReader<Cursor<Vec<u8>>> {
        BufferedReader::new(Cursor::new(initial))
    }

    #[tokio::test]
    async fn single_message() {
        let mut writer = Cursor::new(Vec::new());
        writer.send_message(&Ping { n: 1 }).await.unwrap();
        let mut mock = mock(writer.into_inner());
        assert_eq!(mock.recv_message::<Ping>().await.unwrap(), Some(Ping { n: 1 }));
        assert_eq!(mock.recv_message::<Ping>().await.unwrap(), None);
    }

    #[tokio::test]
    async fn multiple_messages_split_across_reads() {
        let mut writer = Cursor::new(Vec::new());
        for i in 0..50 {
            writer.send_message(&Ping { n: i }).await.unwrap();
        }
        let mut mock = mock(writer.into_inner());
        for i in 0..50 {
            assert_eq!(mock.recv_message::<Ping>().await.unwrap(), Some(Ping { n: i }));
        }
        assert_eq!(mock.recv_message::<Ping>().await.unwrap(), None);
    }

    #[tokio::test]
    async fn oversized_frame_is_rejected() {
        let mut oversized = vec![b'['];
        oversized.extend(std::iter::repeat(b'0').take(MAX_FRAME_LEN + 16));
        oversized.push(b']');
        oversized.push(0);
        let mut mock = mock(oversized);
        assert!(matches!(
            mock.recv_message::<serde_json::Value>().await,
            Err(RecvError::TooLarge(_, _))
        ));
    }

    #[tokio::test]
    async fn unterminated_frame_is_an_error() {
        let mut mock = mock(br#"{"n":1}"#.to_vec());
        assert!(matches!(
            mock.recv_message::<Ping>().await,
            Err(RecvError::UnterminatedFrame)
        ));
    }
}
