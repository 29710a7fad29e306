//! Wire framing for the transfer protocol.
//!
//! ```text
//! client                               server
//!   | -- <filename> ------------------>  |
//!   | <----------------- ERROR: <msg> -- |  then close
//!   | <----------------- FILESIZE:<N> -- |
//!   | -- READY ----------------------->  |
//!   | <--------------- chunk (<= buf) -- |  paced, until N bytes sent
//!   | <-------------------------- EOF -- |
//! ```
//!
//! Control messages are bare text with no length prefix and no delimiter. Each
//! one is matched by prefix against a single read, never searched for inside
//! payload bytes. The receiver stops after exactly `N` payload bytes; the
//! trailing `EOF` marker carries no authority.

use super::error::TransferError;

/// Upper bound for a single control read (filename, reply, acknowledgment).
pub const MAX_CONTROL_LEN: usize = 1024;

/// Read buffer used by the client while consuming payload.
pub const RECV_BUFFER_SIZE: usize = 4096;

/// Client acknowledgment sent after a size announcement.
pub const READY: &[u8] = b"READY";

/// Completion marker sent after the last chunk.
pub const EOF_MARKER: &[u8] = b"EOF";

pub const ERROR_PREFIX: &str = "ERROR:";
pub const FILESIZE_PREFIX: &str = "FILESIZE:";

/// The filename a client asks for, as read from the first message of a
/// connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    filename: String,
}

impl TransferRequest {
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
        }
    }

    /// Parse the first message of a connection.
    ///
    /// Surrounding whitespace is trimmed. Returns `Ok(None)` when nothing but
    /// whitespace was received.
    pub fn parse(bytes: &[u8]) -> Result<Option<Self>, TransferError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|_| TransferError::Protocol("request is not valid UTF-8".to_string()))?;
        let filename = text.trim();
        if filename.is_empty() {
            return Ok(None);
        }
        Ok(Some(Self::new(filename)))
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn encode(&self) -> &[u8] {
        self.filename.as_bytes()
    }
}

/// The server's answer to a request: refusal or size announcement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Error(String),
    FileSize(u64),
}

impl Reply {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Reply::Error(message) => format!("{} {}", ERROR_PREFIX, message).into_bytes(),
            Reply::FileSize(size) => format!("{}{}", FILESIZE_PREFIX, size).into_bytes(),
        }
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, TransferError> {
        let text = String::from_utf8_lossy(bytes);

        if let Some(message) = text.strip_prefix(ERROR_PREFIX) {
            return Ok(Reply::Error(message.trim_start().to_string()));
        }

        if let Some(size) = text.strip_prefix(FILESIZE_PREFIX) {
            return size.trim().parse::<u64>().map(Reply::FileSize).map_err(|_| {
                TransferError::Protocol(format!("malformed size announcement {:?}", text))
            });
        }

        Err(TransferError::Protocol(format!(
            "unexpected server reply {:?}",
            preview(&text)
        )))
    }
}

/// Whether an acknowledgment read is exactly `READY`.
pub fn is_ready(bytes: &[u8]) -> bool {
    bytes == READY
}

/// Split one read into the part that still belongs to the payload and
/// whatever trails it.
pub fn split_payload(read: &[u8], remaining: u64) -> (&[u8], &[u8]) {
    let take = usize::try_from(remaining).map_or(read.len(), |r| r.min(read.len()));
    read.split_at(take)
}

fn preview(text: &str) -> String {
    text.chars().take(32).collect()
}
