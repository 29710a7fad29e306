//! Failure taxonomy shared by the server worker and the client.

use std::io;

use thiserror::Error;

/// Everything that can end a transfer early.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The requested name does not resolve to a regular file inside the
    /// store root. Names escaping the root are reported the same way.
    #[error("File '{0}' not found on server")]
    NotFound(String),

    /// The server answered with `ERROR: <message>`.
    #[error("{0}")]
    Rejected(String),

    /// Store edits only accept a single plain path component.
    #[error("invalid file name '{0}'")]
    InvalidName(String),

    /// The peer sent something unexpected at a defined step.
    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("Connection refused. Is the server running on {addr}?")]
    Refused { addr: String },

    #[error("cannot reach server at {addr}: {source}")]
    Unreachable {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// The server closed the connection before replying to the request.
    #[error("connection closed before the server replied")]
    ConnectionClosed,

    /// The connection ended before the announced size was received.
    #[error("connection closed after {received} of {expected} bytes")]
    Interrupted { received: u64, expected: u64 },

    /// The served file ended before the announced size was sent.
    #[error("file shrank during transfer: sent {sent} of {expected} bytes")]
    Truncated { sent: u64, expected: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Coarse classification for front ends that render failures to users.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The server was reached and said no.
    ServerRejected,
    /// The server could not be reached, or the connection broke.
    ConnectionFailure,
    /// One side broke the message sequence.
    ProtocolViolation,
    /// Local filesystem trouble on the calling side.
    Local,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::ServerRejected => "server_rejected",
            FailureKind::ConnectionFailure => "connection_failure",
            FailureKind::ProtocolViolation => "protocol_violation",
            FailureKind::Local => "local",
        }
    }
}

impl TransferError {
    pub fn kind(&self) -> FailureKind {
        match self {
            TransferError::NotFound(_) | TransferError::Rejected(_) => FailureKind::ServerRejected,
            TransferError::Protocol(_) => FailureKind::ProtocolViolation,
            TransferError::Refused { .. }
            | TransferError::Unreachable { .. }
            | TransferError::ConnectionClosed
            | TransferError::Interrupted { .. } => FailureKind::ConnectionFailure,
            TransferError::Io(e) if is_connection_error(e) => FailureKind::ConnectionFailure,
            TransferError::InvalidName(_)
            | TransferError::Truncated { .. }
            | TransferError::Io(_) => FailureKind::Local,
        }
    }

    /// Map a connect error to `Refused` or `Unreachable`.
    pub fn connect(addr: impl Into<String>, source: io::Error) -> Self {
        let addr = addr.into();
        if source.kind() == io::ErrorKind::ConnectionRefused {
            TransferError::Refused { addr }
        } else {
            TransferError::Unreachable { addr, source }
        }
    }
}

fn is_connection_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::NotConnected
            | io::ErrorKind::TimedOut
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::UnexpectedEof
    )
}
