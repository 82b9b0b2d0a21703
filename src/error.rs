//! Error types for the probe harness and its WebSocket transport.
//!
//! Validation errors ([`Error::InvalidSchedule`], [`Error::InvalidDeadline`],
//! [`Error::InvalidPayload`]) are returned synchronously before any connection
//! is attempted. Everything else reaches callers as an `Error` event on the
//! session's event stream.

use thiserror::Error;

/// Result type alias for probe and transport operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while probing a WebSocket endpoint.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The transport connection could not be established.
    #[error("Connection failed: {0}")]
    Connect(String),

    /// The endpoint URL could not be used for a WebSocket connection.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// A schedule entry was rejected before the session started.
    #[error("Invalid schedule entry {index}: {reason}")]
    InvalidSchedule {
        /// Position of the offending entry in the schedule.
        index: usize,
        /// Why the entry was rejected.
        reason: String,
    },

    /// The session deadline was zero.
    #[error("Session deadline must be greater than zero")]
    InvalidDeadline,

    /// An ad-hoc probe payload was not a typed JSON object.
    #[error("Invalid probe payload: {0}")]
    InvalidPayload(String),

    /// No canned scenario has this name.
    #[error("Unknown scenario {0:?}")]
    UnknownScenario(String),

    /// A payload could not be serialized to the wire format.
    #[error("Serialization failed: {0}")]
    Serialize(String),

    /// Invalid frame structure or header.
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Protocol violation detected.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// Invalid UTF-8 in text frame.
    #[error("Invalid UTF-8 in text frame")]
    InvalidUtf8,

    /// Frame size exceeds configured maximum.
    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge {
        /// Actual frame size.
        size: u64,
        /// Maximum allowed size.
        max: usize,
    },

    /// Message size exceeds configured maximum.
    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge {
        /// Actual message size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Too many fragments in a single message.
    #[error("Too many fragments: {count} (max: {max})")]
    TooManyFragments {
        /// Actual fragment count.
        count: usize,
        /// Maximum allowed fragments.
        max: usize,
    },

    /// The server's handshake response exceeded the configured limit.
    #[error("Handshake too large: {size} bytes (max: {max})")]
    HandshakeTooLarge {
        /// Bytes received so far.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Connection has been closed.
    #[error("Connection closed: {0:?}")]
    ConnectionClosed(Option<u16>),

    /// Invalid WebSocket handshake.
    #[error("Invalid handshake: {0}")]
    InvalidHandshake(String),

    /// A configured header value cannot be placed on the wire.
    #[error("Invalid header value for {header}: {reason}")]
    InvalidHeaderValue {
        /// Header name.
        header: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(String),

    /// TLS setup or negotiation failed.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Invalid close code.
    #[error("Invalid close code: {0}")]
    InvalidCloseCode(u16),

    /// Reserved opcode used.
    #[error("Reserved opcode: {0:#x}")]
    ReservedOpcode(u8),

    /// Control frame fragmented (RFC violation).
    #[error("Control frames cannot be fragmented")]
    FragmentedControlFrame,

    /// Control frame payload too large (>125 bytes).
    #[error("Control frame payload too large: {0} bytes (max: 125)")]
    ControlFrameTooLarge(usize),

    /// Masked server frame (security violation).
    #[error("Server frame must not be masked")]
    MaskedServerFrame,

    /// Reserved bits set without extension.
    #[error("Reserved bits set without negotiated extension")]
    ReservedBitsSet,

    /// Incomplete frame data.
    #[error("Incomplete frame: need {needed} more bytes")]
    IncompleteFrame {
        /// Number of additional bytes needed.
        needed: usize,
    },
}

impl Error {
    /// Returns `true` for errors raised while validating caller input, before
    /// any network activity.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::InvalidSchedule { .. }
                | Error::InvalidDeadline
                | Error::InvalidPayload(_)
                | Error::UnknownScenario(_)
        )
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialize(err.to_string())
    }
}
