//! Domain-specific error types for the E4 bridge client.
//!
//! Commands return the initial connect failure, command timeouts, and
//! sends on a closed connection. Everything the receive loop hits is
//! typed here too, but lands in the [`ErrorLog`](crate::ErrorLog)
//! instead of being raised.

use std::time::Duration;
use thiserror::Error;

/// The canonical error type for the bridge client.
#[derive(Debug, Error)]
pub enum E4Error {
    // ── Connection Errors ────────────────────────────────────────
    /// The bridge could not be reached at construction time.
    #[error("failed to connect to bridge at {addr}: {source}")]
    ConnectFailure {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The TCP/IO layer reported an error.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// The peer closed, reset or aborted the socket.
    #[error("connection to bridge lost")]
    ConnectionLost,

    /// An mpsc channel was closed unexpectedly.
    #[error("channel closed")]
    ChannelClosed,

    // ── Command Errors ───────────────────────────────────────────
    /// The acknowledgement for a command never arrived in time.
    ///
    /// The outcome is unknown: the bridge may still apply the command.
    #[error("{command} for {target} timed out after {timeout:?}")]
    CommandTimeout {
        command: &'static str,
        target: String,
        timeout: Duration,
    },

    // ── Decode / Serialization Errors ────────────────────────────
    /// An inbound line could not be decoded.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Reading or writing a readings file failed.
    #[error("file error: {0}")]
    File(#[source] std::io::Error),

    /// Encoding or decoding of persisted readings failed.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

// ── DecodeError ───────────────────────────────────────────────────

/// Why an inbound line was rejected by the message decoder.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    /// The first token is neither `R` nor a known data prefix.
    #[error("malformed message: {0:?}")]
    Malformed(String),

    /// A data record used a stream suffix this client does not know.
    #[error("unknown stream type: {0:?}")]
    UnknownStream(String),

    /// A required field is absent.
    #[error("{record}: missing {field}")]
    MissingField {
        record: &'static str,
        field: &'static str,
    },

    /// A numeric field failed to parse.
    #[error("{record}: invalid {field} {value:?}")]
    InvalidNumber {
        record: &'static str,
        field: &'static str,
        value: String,
    },

    /// A line exceeded the codec limit and was discarded.
    #[error("line of {0} bytes exceeds limit")]
    OversizedLine(usize),
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for E4Error {
    fn from(s: String) -> Self {
        E4Error::Other(s)
    }
}

impl From<&str> for E4Error {
    fn from(s: &str) -> Self {
        E4Error::Other(s.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for E4Error {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        E4Error::ChannelClosed
    }
}

impl From<Box<bincode::ErrorKind>> for E4Error {
    fn from(e: Box<bincode::ErrorKind>) -> Self {
        E4Error::Encoding(e.to_string())
    }
}

impl From<serde_json::Error> for E4Error {
    fn from(e: serde_json::Error) -> Self {
        E4Error::Encoding(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_names_command_and_target() {
        let e = E4Error::CommandTimeout {
            command: "device_subscribe",
            target: "gsr".into(),
            timeout: Duration::from_secs(5),
        };
        let msg = e.to_string();
        assert!(msg.contains("device_subscribe"));
        assert!(msg.contains("gsr"));
        assert!(msg.contains("5s"));
    }

    #[test]
    fn decode_error_display() {
        let e = DecodeError::InvalidNumber {
            record: "E4_Gsr",
            field: "value",
            value: "abc".into(),
        };
        assert!(e.to_string().contains("abc"));
        assert!(e.to_string().contains("E4_Gsr"));
    }

    #[test]
    fn from_string() {
        let e: E4Error = "something broke".into();
        assert!(matches!(e, E4Error::Other(_)));
    }

    #[test]
    fn from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broke");
        let e: E4Error = io_err.into();
        assert!(matches!(e, E4Error::Connection(_)));
    }

    #[test]
    fn from_decode() {
        let e: E4Error = DecodeError::OversizedLine(70_000).into();
        assert!(matches!(e, E4Error::Decode(DecodeError::OversizedLine(70_000))));
    }
}
