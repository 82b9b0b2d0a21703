//! Captured session events with query helpers.

use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;

use super::event::{InboundFrame, SessionEvent};
use super::harness::EventStream;

/// An event with its arrival order and time.
#[derive(Debug, Clone)]
pub struct CapturedEvent {
    pub event: SessionEvent,
    pub sequence: usize,
    pub at: Instant,
}

/// Every event of one session, in order.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    events: Vec<CapturedEvent>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain `stream` until the session ends.
    pub async fn collect(mut stream: EventStream) -> Self {
        let mut transcript = Self::new();
        while let Some(event) = stream.next_event().await {
            transcript.record(event);
        }
        transcript
    }

    pub fn record(&mut self, event: SessionEvent) {
        let sequence = self.events.len();
        self.events.push(CapturedEvent {
            event,
            sequence,
            at: Instant::now(),
        });
    }

    pub fn all(&self) -> &[CapturedEvent] {
        &self.events
    }

    /// The bare events, without capture metadata.
    pub fn events(&self) -> Vec<&SessionEvent> {
        self.events.iter().map(|e| &e.event).collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Time from the first captured event to the last.
    pub fn duration(&self) -> Duration {
        match (self.events.first(), self.events.last()) {
            (Some(first), Some(last)) => last.at.duration_since(first.at),
            _ => Duration::ZERO,
        }
    }

    pub fn opened(&self) -> bool {
        self.events
            .iter()
            .any(|e| matches!(e.event, SessionEvent::Opened))
    }

    /// Payloads written to the transport, in send order.
    pub fn sent(&self) -> Vec<&Value> {
        self.events
            .iter()
            .filter_map(|e| match &e.event {
                SessionEvent::Sent { payload } => Some(payload),
                _ => None,
            })
            .collect()
    }

    pub fn skipped(&self) -> Vec<&Value> {
        self.events
            .iter()
            .filter_map(|e| match &e.event {
                SessionEvent::SendSkipped { payload } => Some(payload),
                _ => None,
            })
            .collect()
    }

    pub fn received(&self) -> Vec<&InboundFrame> {
        self.events
            .iter()
            .filter_map(|e| match &e.event {
                SessionEvent::Received(frame) => Some(frame),
                _ => None,
            })
            .collect()
    }

    /// Inbound frames that were not valid JSON.
    pub fn parse_errors(&self) -> Vec<&InboundFrame> {
        self.received()
            .into_iter()
            .filter(|f| f.is_parse_error())
            .collect()
    }

    /// Code and reason of the `Closed` event, if any.
    pub fn close(&self) -> Option<(u16, &str)> {
        self.events.iter().find_map(|e| match &e.event {
            SessionEvent::Closed { code, reason } => Some((*code, reason.as_str())),
            _ => None,
        })
    }

    pub fn error(&self) -> Option<&str> {
        self.events.iter().find_map(|e| match &e.event {
            SessionEvent::Error { message } => Some(message.as_str()),
            _ => None,
        })
    }

    pub fn deadline_exceeded(&self) -> bool {
        self.events
            .iter()
            .any(|e| matches!(e.event, SessionEvent::DeadlineExceeded))
    }

    /// Sent payloads and received frames whose `type` is `kind`.
    pub fn of_type(&self, kind: &str) -> Vec<&CapturedEvent> {
        self.events
            .iter()
            .filter(|e| match &e.event {
                SessionEvent::Sent { payload } | SessionEvent::SendSkipped { payload } => {
                    payload.get("type").and_then(Value::as_str) == Some(kind)
                }
                SessionEvent::Received(frame) => frame.kind() == Some(kind),
                _ => false,
            })
            .collect()
    }

    /// Event names in order, e.g. `["opened", "sent", "closed"]`.
    pub fn names(&self) -> Vec<&'static str> {
        self.events.iter().map(|e| e.event.name()).collect()
    }
}

impl FromIterator<SessionEvent> for Transcript {
    fn from_iter<I: IntoIterator<Item = SessionEvent>>(iter: I) -> Self {
        let mut transcript = Self::new();
        for event in iter {
            transcript.record(event);
        }
        transcript
    }
}
