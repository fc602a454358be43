//! Typed error types for the device link.

use std::io;
use std::time::Duration;

use crate::device::ConnectionKind;

/// Errors surfaced by a command channel operation.
///
/// Every failed exchange is reported to the command that issued it and the
/// channel moves on to the next queued command.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    // -- Transport --
    /// The transport failed to send or read.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    // -- Protocol / Framing --
    /// The response was empty or not wrapped in STX/ETX, or a required
    /// field/setting was missing from it.
    #[error("invalid response: {details}")]
    Framing {
        /// Human-readable description of the framing failure.
        details: String,
    },

    /// A configuration setting carried a value that is not numeric.
    #[error("invalid value {value:?} for setting {label:?}")]
    InvalidField {
        /// Setting label as printed by the device.
        label: String,
        /// The raw value that failed to parse.
        value: String,
    },

    /// The channel produced a response of a different kind than requested.
    #[error("unexpected response, expected {expected}")]
    UnexpectedResponse {
        /// The response kind the caller asked for.
        expected: &'static str,
    },

    // -- Queue --
    /// The command was discarded by `clear_queue` before it started.
    #[error("command cancelled before execution")]
    Cancelled,

    /// The channel task has shut down.
    #[error("command channel closed")]
    ChannelClosed,

    // -- Printer state --
    /// The printer reported a state that prevents printing.
    #[error("printer not ready: {message}")]
    NotReady {
        /// Status message, e.g. `"Paper Out"`.
        message: String,
    },
}

impl LinkError {
    pub(crate) fn framing(details: impl Into<String>) -> Self {
        LinkError::Framing {
            details: details.into(),
        }
    }
}

/// Errors raised by a [`Transport`](crate::Transport) implementation.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    // -- Connection --
    /// The printer actively refused the connection (e.g. port not open).
    #[error("connection refused: {addr}")]
    ConnectionRefused {
        /// The address that was attempted.
        addr: String,
        /// The underlying OS error.
        #[source]
        source: io::Error,
    },

    /// Connect timed out before the printer responded.
    #[error("connection timed out: {addr} ({timeout:?})")]
    ConnectionTimeout {
        /// The address that was attempted.
        addr: String,
        /// The configured timeout that elapsed.
        timeout: Duration,
        /// The underlying OS error.
        #[source]
        source: io::Error,
    },

    /// Connection failed for a reason other than refusal or timeout.
    #[error("connection failed: {addr}")]
    ConnectionFailed {
        /// The address that was attempted.
        addr: String,
        /// The underlying OS error.
        #[source]
        source: io::Error,
    },

    /// The printer closed the connection.
    #[error("connection closed by printer")]
    ConnectionClosed,

    /// DNS resolution found no addresses for the device address.
    #[error("no address found for hostname: {0}")]
    NoAddressFound(String),

    /// The transport cannot reach devices of this connection kind.
    #[error("unsupported connection kind: {0}")]
    UnsupportedConnection(ConnectionKind),

    // -- I/O --
    /// Writing to the device failed.
    #[error("write failed: {0}")]
    WriteFailed(#[source] io::Error),

    /// Reading from the device failed.
    #[error("read failed: {0}")]
    ReadFailed(#[source] io::Error),

    /// Opaque failure reported by a third-party transport.
    #[error("{0}")]
    Other(String),
}
