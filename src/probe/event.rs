//! Events emitted by a probe session.

use serde::Serialize;
use serde_json::Value;

/// One observable step of a probe session.
///
/// A session emits `Opened` at most once, and at most one of `Closed` or
/// `Error`. `DeadlineExceeded` is always followed by `Closed`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// The transport is connected and the handshake completed.
    Opened,
    /// A probe payload was written to the transport.
    Sent { payload: Value },
    /// A probe came due while the session could not send.
    SendSkipped { payload: Value },
    /// A data frame arrived.
    Received(InboundFrame),
    /// The session closed, by the peer, the caller or the deadline.
    Closed { code: u16, reason: String },
    /// The transport failed. No `Closed` follows.
    Error { message: String },
    /// The deadline elapsed before the session ended on its own.
    DeadlineExceeded,
}

impl SessionEvent {
    /// Short name used in logs and transcript queries.
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::Opened => "opened",
            SessionEvent::Sent { .. } => "sent",
            SessionEvent::SendSkipped { .. } => "send_skipped",
            SessionEvent::Received(_) => "received",
            SessionEvent::Closed { .. } => "closed",
            SessionEvent::Error { .. } => "error",
            SessionEvent::DeadlineExceeded => "deadline_exceeded",
        }
    }

    /// Whether this event ends the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionEvent::Closed { .. } | SessionEvent::Error { .. })
    }

    pub(crate) fn closed(code: u16, reason: impl Into<String>) -> Self {
        SessionEvent::Closed {
            code,
            reason: reason.into(),
        }
    }

    pub(crate) fn error(message: impl ToString) -> Self {
        SessionEvent::Error {
            message: message.to_string(),
        }
    }
}

/// An inbound data frame with its JSON parse outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InboundFrame {
    /// Milliseconds since the session opened.
    pub elapsed_ms: u64,
    /// The frame payload as text. Binary frames are decoded lossily.
    pub raw: String,
    /// `true` when the frame was a binary message.
    pub binary: bool,
    pub parsed: Parsed,
}

impl InboundFrame {
    /// Parse `raw` as JSON, recording the error position on failure.
    pub fn parse(elapsed_ms: u64, raw: String, binary: bool) -> Self {
        let parsed = match serde_json::from_str::<Value>(&raw) {
            Ok(value) => Parsed::Json(value),
            Err(e) => Parsed::Invalid(ParseError {
                message: e.to_string(),
                line: e.line(),
                column: e.column(),
            }),
        };
        Self {
            elapsed_ms,
            raw,
            binary,
            parsed,
        }
    }

    /// The parsed value, if the frame was valid JSON.
    pub fn json(&self) -> Option<&Value> {
        match &self.parsed {
            Parsed::Json(value) => Some(value),
            Parsed::Invalid(_) => None,
        }
    }

    /// The `type` field of a parsed object frame.
    pub fn kind(&self) -> Option<&str> {
        self.json()?.get("type")?.as_str()
    }

    pub fn is_parse_error(&self) -> bool {
        matches!(self.parsed, Parsed::Invalid(_))
    }
}

/// Result of parsing an inbound frame as JSON.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum Parsed {
    Json(Value),
    Invalid(ParseError),
}

/// Why an inbound frame was not valid JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParseError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}
