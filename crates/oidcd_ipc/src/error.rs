use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Connect(#[from] ConnectError),
    #[error(transparent)]
    Send(#[from] SendError),
    #[error(transparent)]
    Recv(#[from] RecvError),
    #[error("timeout")]
    Timeout,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[cfg(unix)]
    #[error(transparent)]
    Nix(#[from] nix::Error),
}

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("timeout connecting to socket")]
    Timeout,
    #[error("invalid permissions on socket or its parent directory")]
    IncorrectSocketPermissions,
}

#[derive(Debug, Error)]
pub enum SendError {
    #[error(transparent)]
    Encode(#[from] serde_json::Error),
    #[error("message of {0} bytes exceeds the {1} byte frame limit")]
    TooLarge(usize, usize),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum RecvError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Decode(#[from] serde_json::Error),
    #[error("frame of {0} bytes exceeds the {1} byte frame limit")]
    TooLarge(usize, usize),
    #[error("connection closed with an unterminated frame")]
    UnterminatedFrame,
}

impl RecvError {
    /// Whether this failure represents the peer simply hanging up rather than a protocol error.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, RecvError::Io(io) if io.kind() == std::io::ErrorKind::ConnectionAborted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_disconnect() {
        assert!(!RecvError::TooLarge(1, 2).is_disconnect());
        assert!(RecvError::Io(std::io::Error::new(std::io::ErrorKind::ConnectionAborted, "x")).is_disconnect());
        assert!(!RecvError::Io(std::io::Error::new(std::io::ErrorKind::WouldBlock, "x")).is_disconnect());
    }
}
