//! Test harness utilities for probe session tests.
//!
//! [`FakeConnector`] replays a scripted peer against the paused tokio clock;
//! [`TestServer`] is a minimal real WebSocket server on a random port.

#![allow(dead_code)]

mod fake;
mod server;

pub use fake::{FakeConnector, LinkLog, PeerAction};
pub use server::TestServer;

use futures::StreamExt;
use wsprobe::{EventStream, SessionEvent};

/// Drain every event from a session.
pub async fn drain(stream: EventStream) -> Vec<SessionEvent> {
    stream.collect().await
}

/// Event names in order, for compact assertions.
pub fn names(events: &[SessionEvent]) -> Vec<&'static str> {
    events.iter().map(SessionEvent::name).collect()
}
