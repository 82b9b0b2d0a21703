//! Scripted probe sessions.
//!
//! A session connects to a [`Target`], sends each probe of a [`Schedule`] at
//! its delay after open, logs every inbound frame, and ends when the peer
//! closes, the transport fails, the caller closes it, or the [`Deadline`]
//! elapses. Everything observable is reported as a [`SessionEvent`].
//!
//! ## Session Lifecycle
//!
//! 1. The deadline clock starts and the transport is opened.
//! 2. `Opened`; one timer per probe is armed at `open + delay`.
//! 3. `Sent` / `Received` as probes fire and frames arrive.
//! 4. `Closed` or `Error`, after which the stream ends. A deadline produces
//!    `DeadlineExceeded` immediately before `Closed`.

mod deadline;
mod event;
mod harness;
mod schedule;
mod session;
mod timers;
mod transcript;

pub use deadline::Deadline;
pub use event::{InboundFrame, ParseError, Parsed, SessionEvent};
pub use harness::{EventStream, Harness, SessionHandle};
pub use schedule::{ProbeMessage, ProbeSpec, Schedule, validate_payload};
pub use session::Target;
pub use transcript::{CapturedEvent, Transcript};
