//! Scripted in-memory transport.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::{Instant, sleep, sleep_until};
use wsprobe::{CloseCode, CloseFrame, Connector, Error, Link, LinkEvent, Result};

/// Something the fake peer does at a fixed offset from open.
#[derive(Debug, Clone)]
pub enum PeerAction {
    Text(String),
    Binary(Vec<u8>),
    /// Close frame with a code and reason.
    Close(u16, String),
    /// Close frame with no status code.
    CloseEmpty,
    /// End of stream without a close frame.
    Drop,
    /// A transport error on the read side.
    Fail(Error),
    /// Stop accepting sends; later sends report the link as closed.
    StopAccepting,
    /// Later sends fail with an I/O error.
    BreakWrites,
    /// The peer stops reading: later sends and closes never complete.
    StallWrites,
}

/// Everything the harness did to the fake links.
#[derive(Debug, Default)]
pub struct LinkLog {
    pub urls: Vec<String>,
    pub sent: Vec<(Duration, String)>,
    pub closes: Vec<(u16, String)>,
}

#[derive(Clone)]
pub struct FakeConnector {
    connect_delay: Duration,
    connect_error: Option<Error>,
    script: Vec<(Duration, PeerAction)>,
    log: Arc<Mutex<LinkLog>>,
}

impl FakeConnector {
    /// A peer that accepts immediately and never speaks.
    pub fn silent() -> Self {
        Self {
            connect_delay: Duration::ZERO,
            connect_error: None,
            script: Vec::new(),
            log: Arc::default(),
        }
    }

    /// A peer that acts at the given offsets from open.
    pub fn scripted(script: impl IntoIterator<Item = (u64, PeerAction)>) -> Self {
        Self {
            script: script
                .into_iter()
                .map(|(ms, action)| (Duration::from_millis(ms), action))
                .collect(),
            ..Self::silent()
        }
    }

    /// An endpoint that cannot be reached.
    pub fn unreachable(message: &str) -> Self {
        Self {
            connect_error: Some(Error::Connect(message.to_string())),
            ..Self::silent()
        }
    }

    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = delay;
        self
    }

    pub fn log(&self) -> Arc<Mutex<LinkLog>> {
        Arc::clone(&self.log)
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.log
            .lock()
            .unwrap()
            .sent
            .iter()
            .map(|(_, text)| text.clone())
            .collect()
    }

    pub fn closes(&self) -> Vec<(u16, String)> {
        self.log.lock().unwrap().closes.clone()
    }
}

impl Connector for FakeConnector {
    type Link = FakeLink;

    async fn open(&self, url: &str) -> Result<FakeLink> {
        if !self.connect_delay.is_zero() {
            sleep(self.connect_delay).await;
        }
        self.log.lock().unwrap().urls.push(url.to_string());
        if let Some(err) = &self.connect_error {
            return Err(err.clone());
        }
        Ok(FakeLink {
            opened_at: Instant::now(),
            script: self.script.iter().cloned().collect(),
            log: Arc::clone(&self.log),
            open: true,
            writes_broken: false,
            writes_stalled: false,
        })
    }
}

pub struct FakeLink {
    opened_at: Instant,
    script: VecDeque<(Duration, PeerAction)>,
    log: Arc<Mutex<LinkLog>>,
    open: bool,
    writes_broken: bool,
    writes_stalled: bool,
}

impl Link for FakeLink {
    async fn send_text(&mut self, text: String) -> Result<()> {
        if !self.open {
            return Err(Error::ConnectionClosed(None));
        }
        if self.writes_broken {
            return Err(Error::Io("broken pipe".to_string()));
        }
        if self.writes_stalled {
            return std::future::pending().await;
        }
        let at = self.opened_at.elapsed();
        self.log.lock().unwrap().sent.push((at, text));
        Ok(())
    }

    async fn recv(&mut self) -> Result<LinkEvent> {
        loop {
            let Some((offset, _)) = self.script.front() else {
                return std::future::pending().await;
            };
            sleep_until(self.opened_at + *offset).await;

            // Only pop once the step is due, so a cancelled recv loses nothing.
            let Some((_, action)) = self.script.pop_front() else {
                continue;
            };
            match action {
                PeerAction::Text(text) => return Ok(LinkEvent::Text(text)),
                PeerAction::Binary(data) => return Ok(LinkEvent::Binary(data)),
                PeerAction::Close(code, reason) => {
                    self.open = false;
                    return Ok(LinkEvent::Closed(Some(CloseFrame::new(
                        CloseCode::from_u16(code),
                        reason,
                    ))));
                }
                PeerAction::CloseEmpty => {
                    self.open = false;
                    return Ok(LinkEvent::Closed(Some(CloseFrame::new(
                        CloseCode::NoStatus,
                        "",
                    ))));
                }
                PeerAction::Drop => {
                    self.open = false;
                    return Ok(LinkEvent::Closed(None));
                }
                PeerAction::Fail(err) => {
                    self.open = false;
                    return Err(err);
                }
                PeerAction::StopAccepting => self.open = false,
                PeerAction::BreakWrites => self.writes_broken = true,
                PeerAction::StallWrites => self.writes_stalled = true,
            }
        }
    }

    async fn close(&mut self, code: u16, reason: &str) -> Result<()> {
        if self.open && self.writes_stalled {
            return std::future::pending().await;
        }
        if self.open {
            self.open = false;
            self.log
                .lock()
                .unwrap()
                .closes
                .push((code, reason.to_string()));
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }
}
