use std::path::Path;
use std::time::Duration;

use tokio::net::UnixStream;

use crate::buffered_reader::BufferedReader;
use crate::error::ConnectError;

/// A connected unix socket, wrapped in the buffer `recv_message`/`send_message` need.
pub type BufferedUnixStream = BufferedReader<UnixStream>;

impl BufferedUnixStream {
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self, ConnectError> {
        let conn = UnixStream::connect(path).await?;
        Ok(BufferedReader::new(conn))
    }

    pub async fn connect_timeout(path: impl AsRef<Path>, timeout: Duration) -> Result<Self, ConnectError> {
        match tokio::time::timeout(timeout, Self::connect(path)).await {
            Ok(res) => res,
            Err(_) => Err(ConnectError::Timeout),
        }
    }
}

/// Validates that `path`'s parent directory is `0700` and the socket itself is `0600`, refusing
/// to connect to a socket some other local user could have staged.
#[cfg(unix)]
pub fn validate_socket(path: impl AsRef<Path>) -> Result<(), ConnectError> {
    use std::os::unix::fs::PermissionsExt;

    let path = path.as_ref();
    let meta = std::fs::metadata(path)?;
    if meta.permissions().mode() & 0o777 != 0o600 {
        return Err(ConnectError::IncorrectSocketPermissions);
    }
    if let Some(parent) = path.parent() {
        let parent_meta = std::fs::metadata(parent)?;
        if parent_meta.permissions().mode() & 0o777 != 0o700 {
            return Err(ConnectError::IncorrectSocketPermissions);
        }
    }
    Ok(())
}

#[cfg(not(unix))]
pub fn validate_socket(_path: impl AsRef<Path>) -> Result<(), ConnectError> {
    Ok(())
}

/// Creates `path`'s parent directory with `0700` permissions if it doesn't already exist, and
/// removes a stale socket file left behind by a prior, uncleanly terminated agent.
#[cfg(unix)]
pub fn prepare_socket_dir(path: impl AsRef<Path>) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
        std::fs::set_permissions(parent, std::fs::Permissions::from_mode(0o700))?;
    }
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepares_dir_with_owner_only_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let sock_path = tmp.path().join("nested").join("oidcd.sock");
        prepare_socket_dir(&sock_path).unwrap();
        let meta = std::fs::metadata(sock_path.parent().unwrap()).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o700);
    }
}
