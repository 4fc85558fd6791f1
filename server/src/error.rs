//! Server-side error types.

use reversi_shared::ProtocolError;
use std::io;
use std::net::SocketAddr;

/// A registry refused to hold another record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("session registry is full ({0} sessions)")]
    SessionsFull(usize),
    #[error("connection {0} is already registered")]
    AlreadyRegistered(SocketAddr),
    #[error("match registry is full ({0} games)")]
    GamesFull(usize),
}

/// A line could not be read off the wire.
#[derive(Debug, thiserror::Error)]
pub enum LineError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Why a connection never made it past the login handshake.
#[derive(Debug, thiserror::Error)]
pub enum LoginError {
    #[error("connection closed before login")]
    Closed,
    #[error("no login within {0:?}")]
    Timeout(std::time::Duration),
    #[error("expected LOGIN, got `{0}`")]
    NotLogin(String),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl From<LineError> for LoginError {
    fn from(error: LineError) -> Self {
        match error {
            LineError::Protocol(e) => LoginError::Protocol(e),
            LineError::Io(e) => LoginError::Io(e),
        }
    }
}
