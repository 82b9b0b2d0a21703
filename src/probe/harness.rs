use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_core::Stream;
use serde_json::Value;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::{Instant, Sleep, sleep_until, timeout_at};
use tracing::{Instrument, debug, info, info_span, trace, warn};

use super::deadline::Deadline;
use super::event::{InboundFrame, SessionEvent};
use super::schedule::{Schedule, validate_payload};
use super::session::{Session, Target};
use super::timers::ProbeTimers;
use crate::connection::ConnectionState;
use crate::error::{Error, Result};
use crate::transport::{Connector, Link, LinkEvent};

const CLOSE_NORMAL: u16 = 1000;
const CLOSE_NO_FRAME: u16 = 1006;
const DEADLINE_REASON: &str = "deadline exceeded";
const CALLER_REASON: &str = "closed by caller";

/// Stand-in for deadlines too far out to represent as an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

fn deadline_instant(started_at: Instant, deadline: Deadline) -> Instant {
    started_at
        .checked_add(deadline.duration())
        .unwrap_or_else(|| started_at + FAR_FUTURE)
}

/// Runs probe sessions against endpoints reached through `C`.
///
/// Each [`run`](Self::run) call is an independent session with its own task
/// and transport. Nothing is shared between sessions except the connector.
///
/// ```rust,ignore
/// use wsprobe::{Deadline, Harness, Schedule, Target, WsConnector};
///
/// let harness = Harness::new(WsConnector::default());
/// let mut events = harness.run(
///     Target::new("ws://localhost:5000/ws?userId={subject}", "42"),
///     Schedule::from_json(r#"[{"delay_ms": 0, "payload": {"type": "connection"}}]"#)?,
///     Deadline::default(),
/// );
/// while let Some(event) = events.next_event().await {
///     println!("{event:?}");
/// }
/// ```
#[derive(Debug)]
pub struct Harness<C> {
    connector: Arc<C>,
}

impl<C> Clone for Harness<C> {
    fn clone(&self) -> Self {
        Self {
            connector: Arc::clone(&self.connector),
        }
    }
}

impl<C: Connector> Harness<C> {
    pub fn new(connector: C) -> Self {
        Self::from_arc(Arc::new(connector))
    }

    pub fn from_arc(connector: Arc<C>) -> Self {
        Self { connector }
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Start a session and return its event stream.
    ///
    /// The deadline clock starts immediately, before the transport is
    /// opened. The stream ends after `Closed` or `Error`.
    ///
    /// A deadline too large to add to the current instant is treated as
    /// effectively unbounded.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn run(&self, target: Target, schedule: Schedule, deadline: Deadline) -> EventStream {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let started_at = Instant::now();
        let deadline_at = deadline_instant(started_at, deadline);
        let span = info_span!("probe", subject = %target.subject());
        let task = SessionTask {
            session: Session::new(target, started_at),
            deadline: Box::pin(sleep_until(deadline_at)),
            deadline_at,
            events: event_tx,
            commands: command_rx,
            commands_open: true,
            timers: ProbeTimers::default(),
        };
        tokio::spawn(task.run(Arc::clone(&self.connector), schedule).instrument(span));

        EventStream {
            events: event_rx,
            handle: SessionHandle {
                commands: command_tx,
            },
        }
    }
}

/// Events from one session, in emission order.
///
/// Dropping the stream stops the session and closes its transport.
#[derive(Debug)]
pub struct EventStream {
    events: UnboundedReceiver<SessionEvent>,
    handle: SessionHandle,
}

impl EventStream {
    /// A handle for controlling the session while the stream is consumed.
    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// Wait for the next event. `None` once the session has ended.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }
}

impl Stream for EventStream {
    type Item = SessionEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().events.poll_recv(cx)
    }
}

#[derive(Debug)]
enum Command {
    Close,
    Send(Value),
}

/// Cloneable control handle for a running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: UnboundedSender<Command>,
}

impl SessionHandle {
    /// Close the session with code 1000. Safe to call any number of times;
    /// the session emits at most one `Closed`.
    pub fn close(&self) {
        if self.commands.send(Command::Close).is_err() {
            debug!("close requested after session ended");
        }
    }

    /// Send an ad-hoc probe as soon as the session task picks it up.
    ///
    /// If the session is not open the probe is reported as `SendSkipped`.
    /// If the session has already ended it is dropped with a warning.
    ///
    /// # Errors
    ///
    /// `Error::InvalidPayload` if `payload` is not an object with a string
    /// `type`.
    pub fn send(&self, payload: Value) -> Result<()> {
        validate_payload(&payload).map_err(Error::InvalidPayload)?;
        if let Err(mpsc::error::SendError(Command::Send(payload))) =
            self.commands.send(Command::Send(payload))
        {
            warn!(%payload, "session already ended; probe not sent");
        }
        Ok(())
    }

    /// Whether the session task has finished.
    pub fn is_finished(&self) -> bool {
        self.commands.is_closed()
    }
}

enum Flow {
    Continue,
    Stop,
}

struct SessionTask {
    session: Session,
    deadline: Pin<Box<Sleep>>,
    deadline_at: Instant,
    events: UnboundedSender<SessionEvent>,
    commands: UnboundedReceiver<Command>,
    commands_open: bool,
    timers: ProbeTimers,
}

impl SessionTask {
    async fn run<C: Connector>(mut self, connector: Arc<C>, schedule: Schedule) {
        let url = self.session.target().url();
        debug!(%url, probes = schedule.len(), "session starting");

        let Some(mut link) = self.connect(connector.as_ref(), &url).await else {
            return;
        };

        let opened_at = Instant::now();
        self.session.mark_open(opened_at);
        self.emit(SessionEvent::Opened);
        self.timers.arm_all(opened_at, &schedule);

        self.drive(&mut link).await;
        self.timers.cancel_all();
        debug!(
            state = %self.session.state(),
            frames = self.session.frames().len(),
            lifetime_ms = self.session.elapsed_ms(Instant::now()),
            "session finished"
        );
    }

    /// Open the transport, racing the deadline and caller commands.
    async fn connect<C: Connector>(&mut self, connector: &C, url: &str) -> Option<C::Link> {
        let open = connector.open(url);
        tokio::pin!(open);

        loop {
            tokio::select! {
                biased;

                () = &mut self.deadline => {
                    debug!("deadline elapsed while connecting");
                    self.finish_deadline();
                    return None;
                }
                () = self.events.closed() => {
                    debug!("event stream dropped while connecting");
                    return None;
                }
                command = self.commands.recv(), if self.commands_open => match command {
                    Some(Command::Close) => {
                        self.session.transition(ConnectionState::Closed);
                        self.emit(SessionEvent::closed(CLOSE_NORMAL, CALLER_REASON));
                        return None;
                    }
                    Some(Command::Send(payload)) => {
                        self.emit(SessionEvent::SendSkipped { payload });
                    }
                    None => self.commands_open = false,
                },
                result = &mut open => match result {
                    Ok(link) => return Some(link),
                    Err(e) => {
                        self.fail(e);
                        return None;
                    }
                },
            }
        }
    }

    async fn drive<L: Link>(&mut self, link: &mut L) {
        loop {
            let next_probe = self.timers.next_due();

            let flow = tokio::select! {
                biased;

                () = &mut self.deadline => {
                    self.timers.cancel_all();
                    self.session.transition(ConnectionState::Closing);
                    match self.bounded(link.close(CLOSE_NORMAL, DEADLINE_REASON)).await {
                        Some(Ok(())) => {}
                        Some(Err(e)) => debug!(error = %e, "close after deadline failed"),
                        None => debug!("transport not writable; dropping it without a close frame"),
                    }
                    self.finish_deadline();
                    Flow::Stop
                }
                () = self.events.closed() => {
                    debug!("event stream dropped; closing transport");
                    self.timers.cancel_all();
                    let _ = self.bounded(link.close(CLOSE_NORMAL, CALLER_REASON)).await;
                    Flow::Stop
                }
                () = sleep_until(next_probe.unwrap_or_else(Instant::now)), if next_probe.is_some() => {
                    match self.timers.pop_next() {
                        Some(probe) => self.send_probe(link, probe.payload().clone()).await,
                        None => Flow::Continue,
                    }
                }
                command = self.commands.recv(), if self.commands_open => match command {
                    Some(Command::Close) => {
                        self.timers.cancel_all();
                        self.session.transition(ConnectionState::Closing);
                        match self.bounded(link.close(CLOSE_NORMAL, CALLER_REASON)).await {
                            Some(result) => {
                                if let Err(e) = result {
                                    debug!(error = %e, "caller close failed");
                                }
                                self.session.transition(ConnectionState::Closed);
                                self.emit(SessionEvent::closed(CLOSE_NORMAL, CALLER_REASON));
                            }
                            None => self.finish_deadline(),
                        }
                        Flow::Stop
                    }
                    Some(Command::Send(payload)) => self.send_probe(link, payload).await,
                    None => {
                        self.commands_open = false;
                        Flow::Continue
                    }
                },
                inbound = link.recv() => self.on_inbound(inbound),
            };

            if let Flow::Stop = flow {
                return;
            }
        }
    }

    async fn send_probe<L: Link>(&mut self, link: &mut L, payload: Value) -> Flow {
        if !self.session.state().can_send() || !link.is_open() {
            self.emit(SessionEvent::SendSkipped { payload });
            return Flow::Continue;
        }

        match self.bounded(link.send_text(payload.to_string())).await {
            Some(Ok(())) => {
                self.emit(SessionEvent::Sent { payload });
                Flow::Continue
            }
            Some(Err(Error::ConnectionClosed(_))) => {
                self.emit(SessionEvent::SendSkipped { payload });
                Flow::Continue
            }
            Some(Err(e)) => {
                self.fail(e);
                Flow::Stop
            }
            None => {
                debug!(%payload, "write still pending at deadline; dropping transport");
                self.finish_deadline();
                Flow::Stop
            }
        }
    }

    /// Await a transport write, giving up at the session deadline.
    ///
    /// `None` means the deadline passed first. A write that is already
    /// complete still wins, even once the deadline has elapsed.
    async fn bounded<F: Future>(&self, write: F) -> Option<F::Output> {
        timeout_at(self.deadline_at, write).await.ok()
    }

    fn on_inbound(&mut self, inbound: Result<LinkEvent>) -> Flow {
        let (raw, binary) = match inbound {
            Ok(LinkEvent::Text(text)) => (text, false),
            Ok(LinkEvent::Binary(data)) => (String::from_utf8_lossy(&data).into_owned(), true),
            Ok(LinkEvent::Closed(frame)) => {
                self.timers.cancel_all();
                self.session.transition(ConnectionState::Closed);
                let (code, reason) = match frame {
                    Some(frame) => (frame.code.as_u16(), frame.reason),
                    None => (CLOSE_NO_FRAME, String::new()),
                };
                self.emit(SessionEvent::closed(code, reason));
                return Flow::Stop;
            }
            Err(e) => {
                self.fail(e);
                return Flow::Stop;
            }
        };

        let frame = InboundFrame::parse(self.session.elapsed_ms(Instant::now()), raw, binary);
        self.session.record_frame(frame.clone());
        self.emit(SessionEvent::Received(frame));
        Flow::Continue
    }

    fn finish_deadline(&mut self) {
        self.timers.cancel_all();
        if self.session.state() == ConnectionState::Open {
            self.session.transition(ConnectionState::Closing);
        }
        self.session.transition(ConnectionState::Closed);
        self.emit(SessionEvent::DeadlineExceeded);
        self.emit(SessionEvent::closed(CLOSE_NORMAL, DEADLINE_REASON));
    }

    fn fail(&mut self, error: Error) {
        self.timers.cancel_all();
        self.session.transition(ConnectionState::Failed);
        self.emit(SessionEvent::error(error));
    }

    fn emit(&self, event: SessionEvent) {
        match &event {
            SessionEvent::Opened => info!("connection opened"),
            SessionEvent::Sent { payload } => debug!(%payload, "probe sent"),
            SessionEvent::SendSkipped { payload } => {
                warn!(%payload, state = %self.session.state(), "probe skipped")
            }
            SessionEvent::Received(frame) => {
                if frame.is_parse_error() {
                    warn!(raw = %frame.raw, "received non-JSON frame");
                } else {
                    debug!(raw = %frame.raw, elapsed_ms = frame.elapsed_ms, "frame received");
                }
            }
            SessionEvent::Closed { code, reason } => info!(code, %reason, "connection closed"),
            SessionEvent::Error { message } => warn!(%message, "session failed"),
            SessionEvent::DeadlineExceeded => warn!("session deadline exceeded"),
        }
        if self.events.send(event).is_err() {
            trace!("event stream dropped; event discarded");
        }
    }
}
