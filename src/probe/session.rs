use tokio::time::Instant;
use tracing::warn;

use super::event::InboundFrame;
use crate::connection::ConnectionState;

/// Where a session connects: a URL template and the subject it probes as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    template: String,
    subject: String,
}

impl Target {
    /// `{subject}` in `template` is replaced by `subject` when the URL is
    /// built. A template without the placeholder is used as-is.
    pub fn new(template: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            subject: subject.into(),
        }
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// The URL handed to the transport.
    pub fn url(&self) -> String {
        self.template.replace("{subject}", &self.subject)
    }
}

/// Bookkeeping for one probe session, owned by the session task.
#[derive(Debug)]
pub(crate) struct Session {
    target: Target,
    state: ConnectionState,
    started_at: Instant,
    opened_at: Option<Instant>,
    frames: Vec<InboundFrame>,
}

impl Session {
    pub(crate) fn new(target: Target, started_at: Instant) -> Self {
        Self {
            target,
            state: ConnectionState::Connecting,
            started_at,
            opened_at: None,
            frames: Vec::new(),
        }
    }

    pub(crate) fn target(&self) -> &Target {
        &self.target
    }

    pub(crate) fn state(&self) -> ConnectionState {
        self.state
    }

    /// Move to `next`. Illegal steps, including any step out of a terminal
    /// state, are ignored and return `false`.
    pub(crate) fn transition(&mut self, next: ConnectionState) -> bool {
        if !self.state.can_transition_to(next) {
            warn!(from = %self.state, to = %next, "ignoring illegal session transition");
            return false;
        }
        self.state = next;
        true
    }

    pub(crate) fn mark_open(&mut self, at: Instant) -> bool {
        if self.transition(ConnectionState::Open) {
            self.opened_at = Some(at);
            true
        } else {
            false
        }
    }

    /// Milliseconds since open, or since start if never opened.
    pub(crate) fn elapsed_ms(&self, now: Instant) -> u64 {
        let since = self.opened_at.unwrap_or(self.started_at);
        u64::try_from(now.saturating_duration_since(since).as_millis()).unwrap_or(u64::MAX)
    }

    pub(crate) fn record_frame(&mut self, frame: InboundFrame) {
        self.frames.push(frame);
    }

    pub(crate) fn frames(&self) -> &[InboundFrame] {
        &self.frames
    }
}
