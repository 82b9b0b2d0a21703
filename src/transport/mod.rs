//! Transport seam between the probe harness and the network.
//!
//! The harness only talks to a [`Connector`] and the [`Link`] it opens, so
//! tests can substitute a scripted peer. [`WsConnector`] is the production
//! implementation built on this crate's client protocol layer.

mod endpoint;
mod tls;
mod ws;

use std::future::Future;

use crate::error::Result;
use crate::message::CloseFrame;

pub use endpoint::Endpoint;
pub use tls::MaybeTlsStream;
pub use ws::{WsConnector, WsLink};

/// An inbound data message or the end of the link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// A complete text message.
    Text(String),
    /// A complete binary message.
    Binary(Vec<u8>),
    /// The peer closed the link. A close frame without a status carries
    /// code 1005. `None` means no close frame arrived at all (the stream
    /// simply ended), reported as 1006.
    Closed(Option<CloseFrame>),
}

/// Opens links to a WebSocket endpoint.
pub trait Connector: Send + Sync + 'static {
    /// The link type this connector produces.
    type Link: Link + 'static;

    /// Connect to `url` and complete the upgrade handshake.
    ///
    /// # Errors
    ///
    /// Any failure to reach the endpoint or complete the handshake.
    fn open(&self, url: &str) -> impl Future<Output = Result<Self::Link>> + Send;
}

/// One open, bidirectional message link.
pub trait Link: Send {
    /// Send one text message.
    ///
    /// # Errors
    ///
    /// `Error::ConnectionClosed` if the link is no longer open, otherwise
    /// transport errors.
    fn send_text(&mut self, text: String) -> impl Future<Output = Result<()>> + Send;

    /// Wait for the next data message or the end of the link.
    ///
    /// Must be cancel-safe: a dropped `recv` future loses no data.
    ///
    /// # Errors
    ///
    /// Protocol and I/O errors. A clean end of stream is
    /// `Ok(LinkEvent::Closed(_))`, not an error.
    fn recv(&mut self) -> impl Future<Output = Result<LinkEvent>> + Send;

    /// Start a graceful close. Calling it more than once is a no-op.
    ///
    /// # Errors
    ///
    /// Transport errors while writing the close frame.
    fn close(&mut self, code: u16, reason: &str) -> impl Future<Output = Result<()>> + Send;

    /// Whether the link still accepts outbound messages.
    fn is_open(&self) -> bool;
}
