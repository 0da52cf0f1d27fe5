//! Framed unix-domain-socket IPC primitives shared by the agent socket and the Frontend Channel.
//!
//! Every message on either channel is a JSON object terminated by a single NUL byte, capped at
//! [`MAX_FRAME_LEN`] bytes.

mod buffered_reader;
mod error;
mod recv_message;
mod send_message;
mod send_recv_message;
mod unix_socket;

/// Maximum size, in bytes, of a single JSON frame (excluding the NUL terminator).
pub const MAX_FRAME_LEN: usize = 256 * 1024;

pub use buffered_reader::BufferedReader;
pub use error::{
    ConnectError,
    Error,
    RecvError,
    SendError,
};
pub use recv_message::RecvMessage;
pub use send_message::SendMessage;
pub use send_recv_message::{
    SendRecvError,
    SendRecvMessage,
};
pub use unix_socket::{
    BufferedUnixStream,
    prepare_socket_dir,
    validate_socket,
};
