//! # wsprobe - Scripted WebSocket probe harness
//!
//! `wsprobe` opens a WebSocket to a real-time notification endpoint, sends a
//! timed schedule of JSON probes, records and parses every inbound frame, and
//! enforces a hard session deadline. Everything it observes is reported as a
//! stream of [`SessionEvent`]s.
//!
//! ## Features
//!
//! - **Deterministic timing**: probe delays are relative to open, and the
//!   deadline always wins a tie with a probe
//! - **Injectable transport** through the [`Connector`] and [`Link`] traits
//! - **RFC 6455 client** with strict frame validation and resource limits
//! - **TLS** for `wss://` with the `tls-rustls` feature
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use wsprobe::{Harness, Scenario, Target, Transcript, WsConnector};
//!
//! let harness = Harness::new(WsConnector::default());
//! let scenario = Scenario::AdminDebug;
//! let events = harness.run(
//!     Target::new("ws://localhost:5000/ws?userId={subject}", "42"),
//!     scenario.schedule("42")?,
//!     scenario.deadline(),
//! );
//! let transcript = Transcript::collect(events).await;
//! assert!(transcript.opened());
//! ```

pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod message;
pub mod probe;
pub mod protocol;
pub mod scenarios;
pub mod transport;

pub use codec::WebSocketCodec;
pub use config::{Config, Limits};
pub use connection::{Connection, ConnectionState};
pub use error::{Error, Result};
pub use message::{CloseCode, CloseFrame, Message};
pub use probe::{
    CapturedEvent, Deadline, EventStream, Harness, InboundFrame, ParseError, Parsed,
    ProbeMessage, ProbeSpec, Schedule, SessionEvent, SessionHandle, Target, Transcript,
};
pub use protocol::{OpCode, WS_GUID, compute_accept_key};
pub use scenarios::Scenario;
pub use transport::{Connector, Endpoint, Link, LinkEvent, WsConnector, WsLink};
