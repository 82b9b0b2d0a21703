//! Minimal WebSocket server for socket-level tests.
//!
//! Accepts one or more connections on a random local port and speaks just
//! enough RFC 6455 (server role, unmasked frames) to exercise the client.

use std::net::SocketAddr;

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use wsprobe::protocol::{Frame, OpCode, compute_accept_key};
use wsprobe::Error;

#[derive(Debug, Clone)]
enum Behavior {
    Echo,
    SendThenClose {
        texts: Vec<String>,
        code: u16,
        reason: String,
    },
    RejectUpgrade,
    NeverRead,
}

pub struct TestServer {
    addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl TestServer {
    /// Echo every text message back; answer close with close.
    pub async fn echo() -> Self {
        Self::spawn(Behavior::Echo).await
    }

    /// Send `texts` right after the handshake, then close with `code`.
    pub async fn send_then_close(texts: &[&str], code: u16, reason: &str) -> Self {
        Self::spawn(Behavior::SendThenClose {
            texts: texts.iter().map(|t| t.to_string()).collect(),
            code,
            reason: reason.to_string(),
        })
        .await
    }

    /// Complete the handshake, then hold the socket without reading from it.
    pub async fn never_read() -> Self {
        Self::spawn(Behavior::NeverRead).await
    }

    /// Answer the upgrade request with `403 Forbidden`.
    pub async fn reject_upgrade() -> Self {
        Self::spawn(Behavior::RejectUpgrade).await
    }

    async fn spawn(behavior: Behavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let behavior = behavior.clone();
                tokio::spawn(async move {
                    let _ = serve(stream, behavior).await;
                });
            }
        });
        Self { addr, handle }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// `ws://` URL for `path` on this server.
    pub fn url(&self, path: &str) -> String {
        format!("ws://{}{path}", self.addr)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve(mut stream: TcpStream, behavior: Behavior) -> Result<(), Error> {
    let mut buf = BytesMut::with_capacity(4096);
    let key = read_upgrade_key(&mut stream, &mut buf).await?;

    if let Behavior::RejectUpgrade = behavior {
        stream
            .write_all(b"HTTP/1.1 403 Forbidden\r\nContent-Length: 0\r\n\r\n")
            .await?;
        return Ok(());
    }

    let response = format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {}\r\n\r\n",
        compute_accept_key(&key)
    );
    stream.write_all(response.as_bytes()).await?;

    if let Behavior::NeverRead = behavior {
        std::future::pending::<()>().await;
    }

    if let Behavior::SendThenClose { texts, code, reason } = &behavior {
        for text in texts {
            write_frame(&mut stream, &Frame::text(text.as_bytes())).await?;
        }
        write_frame(&mut stream, &Frame::close(Some(*code), reason)).await?;
    }

    loop {
        let frame = match read_frame(&mut stream, &mut buf).await? {
            Some(frame) => frame,
            None => return Ok(()),
        };
        match frame.opcode {
            OpCode::Text | OpCode::Binary => {
                if let Behavior::Echo = behavior {
                    let reply = Frame::new(true, frame.opcode, frame.into_payload());
                    write_frame(&mut stream, &reply).await?;
                }
            }
            OpCode::Ping => write_frame(&mut stream, &Frame::pong(frame.into_payload())).await?,
            OpCode::Close => {
                if let Behavior::Echo = behavior {
                    let payload = frame.payload();
                    let code = (payload.len() >= 2).then(|| u16::from_be_bytes([payload[0], payload[1]]));
                    write_frame(&mut stream, &Frame::close(code, "")).await?;
                }
                return Ok(());
            }
            OpCode::Pong | OpCode::Continuation => {}
        }
    }
}

async fn read_upgrade_key(stream: &mut TcpStream, buf: &mut BytesMut) -> Result<String, Error> {
    loop {
        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).into_owned();
            buf.advance(end + 4);
            return head
                .lines()
                .filter_map(|line| line.split_once(':'))
                .find(|(name, _)| name.trim().eq_ignore_ascii_case("sec-websocket-key"))
                .map(|(_, value)| value.trim().to_string())
                .ok_or_else(|| Error::InvalidHandshake("missing key".into()));
        }
        if stream.read_buf(buf).await? == 0 {
            return Err(Error::ConnectionClosed(None));
        }
    }
}

async fn read_frame(stream: &mut TcpStream, buf: &mut BytesMut) -> Result<Option<Frame>, Error> {
    loop {
        match Frame::parse(buf) {
            Ok((frame, consumed)) => {
                buf.advance(consumed);
                return Ok(Some(frame));
            }
            Err(Error::IncompleteFrame { .. }) => {}
            Err(e) => return Err(e),
        }
        if stream.read_buf(buf).await? == 0 {
            return Ok(None);
        }
    }
}

async fn write_frame(stream: &mut TcpStream, frame: &Frame) -> Result<(), Error> {
    let mut out = BytesMut::new();
    frame.encode(&mut out, None);
    stream.write_all(&out).await?;
    Ok(())
}
