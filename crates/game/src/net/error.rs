use std::io;

use super::connection::ConnectionState;

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("buffer error: {0}")]
    Io(#[from] io::Error),
    #[error("string of {len} bytes exceeds limit of {max}")]
    StringTooLong { len: usize, max: usize },
    #[error("unknown message type code {0}")]
    UnknownMessageType(u8),
    #[error("invalid {field} value {value}")]
    InvalidValue { field: &'static str, value: u8 },
    #[error("message of {len} bytes can never fit a {max} byte packet")]
    MessageTooLarge { len: usize, max: usize },
}

impl WireError {
    pub fn is_truncated(&self) -> bool {
        matches!(self, Self::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NetError {
    #[error("socket error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error("connection is {0:?}")]
    NotConnected(ConnectionState),
    #[error("could not resolve {0}")]
    NoAddress(String),
}
