use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, trace};

use crate::codec::WebSocketCodec;
use crate::config::Config;
use crate::connection::ConnectionState;
use crate::error::{Error, Result};
use crate::message::{CloseCode, CloseFrame, Message};
use crate::protocol::{Frame, MessageAssembler, OpCode};

/// A client WebSocket connection over an already-upgraded stream.
///
/// `Connection` turns frames into messages: it reassembles fragments,
/// answers pings, and runs the close handshake.
///
/// ## Example
///
/// ```rust,ignore
/// use wsprobe::{Config, Connection, Message};
///
/// let mut conn = Connection::new(upgraded_stream, &Config::new());
/// conn.send(Message::text(r#"{"type":"connection"}"#)).await?;
/// let reply = conn.recv().await?;
/// ```
pub struct Connection<T> {
    codec: WebSocketCodec<T>,
    state: ConnectionState,
    assembler: MessageAssembler,
    /// Peer close whose reply is queued but not yet flushed.
    peer_close: Option<Option<CloseFrame>>,
}

impl<T> Connection<T> {
    /// Wrap a stream on which the upgrade handshake has completed.
    pub fn new(io: T, config: &Config) -> Self {
        Self::with_buffered(io, BytesMut::new(), config)
    }

    /// Like [`new`](Self::new), with bytes that arrived after the handshake
    /// response and must be decoded first.
    pub fn with_buffered(io: T, buffered: BytesMut, config: &Config) -> Self {
        Self {
            codec: WebSocketCodec::with_buffered(io, buffered, config),
            state: ConnectionState::Open,
            assembler: MessageAssembler::new(config.limits.clone()),
            peer_close: None,
        }
    }

    /// Get the current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Returns `true` if messages can be sent.
    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open && self.peer_close.is_none()
    }

    fn fail<R>(&mut self, err: Error) -> Result<R> {
        self.state = ConnectionState::Failed;
        Err(err)
    }
}

impl<T: AsyncRead + AsyncWrite + Unpin> Connection<T> {
    /// Send a message as a single frame.
    ///
    /// ## Errors
    ///
    /// - `Error::ConnectionClosed` if the connection is not `Open`
    /// - I/O errors from the underlying stream (the connection becomes `Failed`)
    pub async fn send(&mut self, message: Message) -> Result<()> {
        if !self.state.can_send() || self.peer_close.is_some() {
            return Err(Error::ConnectionClosed(None));
        }

        let frame = match message {
            Message::Text(text) => Frame::text(text),
            Message::Binary(data) => Frame::binary(data),
            Message::Ping(data) => Frame::ping(data),
            Message::Pong(data) => Frame::pong(data),
            Message::Close(close) => {
                let (code, reason) = close.map_or((CloseCode::Normal, String::new()), |cf| {
                    (cf.code, cf.reason)
                });
                return self.close(code, &reason).await;
            }
        };

        if let Err(e) = self.codec.write_frame(&frame).await {
            return self.fail(e);
        }
        Ok(())
    }

    /// Receive the next message.
    ///
    /// Pings are answered automatically (the pong goes out before the next
    /// read) and still returned so callers can observe them. A close frame
    /// from the peer is echoed and moves the connection to `Closed`.
    ///
    /// Cancel-safe. Replies are queued in the codec before anything is
    /// awaited, and a peer close is only reported once its reply is flushed.
    ///
    /// ## Errors
    ///
    /// - `Error::ConnectionClosed(None)` on EOF without a close frame, or when
    ///   called after the connection closed
    /// - protocol errors (the connection becomes `Failed`)
    pub async fn recv(&mut self) -> Result<Message> {
        if !self.state.can_receive() {
            return Err(Error::ConnectionClosed(None));
        }

        loop {
            if self.codec.has_pending_writes() {
                let flushed = self.codec.flush_pending().await;
                if let Err(e) = flushed {
                    if self.peer_close.is_none() {
                        return self.fail(e);
                    }
                    // The peer may already have gone away.
                    debug!(error = %e, "close reply not delivered");
                }
            }
            if let Some(close) = self.peer_close.take() {
                self.state = ConnectionState::Closed;
                return Ok(Message::Close(close));
            }

            let frame = match self.codec.read_frame().await {
                Ok(frame) => frame,
                Err(Error::ConnectionClosed(_)) => {
                    debug!("peer dropped the connection without a close frame");
                    self.state = ConnectionState::Closed;
                    return Err(Error::ConnectionClosed(None));
                }
                Err(e) => return self.fail(e),
            };

            if let Err(e) = frame.validate() {
                return self.fail(e);
            }
            trace!(opcode = %frame.opcode, len = frame.payload().len(), "frame received");

            match frame.opcode {
                OpCode::Ping => {
                    let payload = frame.into_payload();
                    self.codec.queue_frame(&Frame::pong(payload.clone()));
                    return Ok(Message::Ping(payload));
                }
                OpCode::Pong => return Ok(Message::Pong(frame.into_payload())),
                OpCode::Close => {
                    let close = CloseFrame::decode(frame.payload());
                    if self.state == ConnectionState::Open {
                        let reply = match &close {
                            Some(cf) if cf.code.is_sendable() => {
                                Frame::close(Some(cf.code.as_u16()), "")
                            }
                            _ => Frame::close(None, ""),
                        };
                        self.codec.queue_frame(&reply);
                        self.peer_close = Some(close);
                        continue;
                    }
                    self.state = ConnectionState::Closed;
                    return Ok(Message::Close(close));
                }
                OpCode::Text | OpCode::Binary | OpCode::Continuation => {
                    match self.assembler.push(frame) {
                        Ok(Some(message)) => return Ok(message),
                        Ok(None) => {}
                        Err(e) => return self.fail(e),
                    }
                }
            }
        }
    }

    /// Start the close handshake. Calling it again is a no-op.
    ///
    /// ## Errors
    ///
    /// - `Error::InvalidCloseCode` for codes that must not be sent
    /// - I/O errors writing the close frame
    pub async fn close(&mut self, code: CloseCode, reason: &str) -> Result<()> {
        if self.state != ConnectionState::Open || self.peer_close.is_some() {
            return Ok(());
        }
        if !code.is_sendable() {
            return Err(Error::InvalidCloseCode(code.as_u16()));
        }

        self.state = ConnectionState::Closing;
        let frame = Frame::close(Some(code.as_u16()), reason);
        if let Err(e) = self.codec.write_frame(&frame).await {
            return self.fail(e);
        }
        Ok(())
    }
}
