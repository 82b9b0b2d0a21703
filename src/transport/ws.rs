use bytes::{Buf, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, trace};

use super::endpoint::Endpoint;
use super::tls::MaybeTlsStream;
use super::{Connector, Link, LinkEvent};
use crate::config::Config;
use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::message::{CloseCode, CloseFrame, Message};
use crate::protocol::{ClientHandshake, generate_key};

/// Opens RFC 6455 client connections over TCP, or TLS with `tls-rustls`.
#[derive(Debug, Clone, Default)]
pub struct WsConnector {
    config: Config,
}

impl WsConnector {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    async fn connect(&self, endpoint: &Endpoint) -> Result<WsLink> {
        let tcp = TcpStream::connect(endpoint.socket_addr())
            .await
            .map_err(|e| Error::Connect(format!("{}: {e}", endpoint.socket_addr())))?;
        if let Err(e) = tcp.set_nodelay(true) {
            debug!(error = %e, "failed to set TCP_NODELAY");
        }

        let mut stream = MaybeTlsStream::establish(tcp, &endpoint.host, endpoint.secure).await?;

        let handshake = ClientHandshake::new(
            &endpoint.host_header(),
            &endpoint.resource,
            generate_key()?,
            &self.config,
        )?;
        stream.write_all(handshake.request()).await?;
        stream.flush().await?;

        let (head, leftover) = read_response_head(&mut stream, &self.config).await?;
        let response = handshake
            .verify(&head)
            .map_err(|e| Error::Connect(e.to_string()))?;
        debug!(
            host = %endpoint.host,
            resource = %endpoint.resource,
            protocol = ?response.protocol,
            "websocket handshake complete"
        );

        Ok(WsLink {
            conn: Connection::with_buffered(stream, leftover, &self.config),
        })
    }
}

impl Connector for WsConnector {
    type Link = WsLink;

    async fn open(&self, url: &str) -> Result<WsLink> {
        let endpoint = Endpoint::parse(url).map_err(|e| Error::Connect(e.to_string()))?;
        trace!(url, "connecting");
        match tokio::time::timeout(self.config.connect_timeout, self.connect(&endpoint)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Connect(format!(
                "timed out after {:?} connecting to {}",
                self.config.connect_timeout,
                endpoint.socket_addr()
            ))),
        }
    }
}

/// Read until the blank line ending the response head.
///
/// Returns the head and any bytes past it, which already belong to the
/// first frames.
async fn read_response_head(
    stream: &mut MaybeTlsStream,
    config: &Config,
) -> Result<(Vec<u8>, BytesMut)> {
    let mut buf = BytesMut::with_capacity(1024);
    loop {
        if let Some(pos) = find_head_end(&buf) {
            let head = buf[..pos].to_vec();
            buf.advance(pos);
            return Ok((head, buf));
        }
        config.limits.check_handshake_size(buf.len())?;

        let n = stream.read_buf(&mut buf).await?;
        if n == 0 {
            return Err(Error::Connect(
                "connection closed during handshake".to_string(),
            ));
        }
    }
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|p| p + 4)
}

/// A link over an upgraded client [`Connection`].
pub struct WsLink {
    conn: Connection<MaybeTlsStream>,
}

impl Link for WsLink {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.conn.send(Message::Text(text)).await
    }

    async fn recv(&mut self) -> Result<LinkEvent> {
        loop {
            match self.conn.recv().await {
                Ok(Message::Text(text)) => return Ok(LinkEvent::Text(text)),
                Ok(Message::Binary(data)) => return Ok(LinkEvent::Binary(data)),
                Ok(Message::Ping(_) | Message::Pong(_)) => {
                    trace!("control frame handled");
                }
                Ok(Message::Close(frame)) => {
                    let frame = frame.unwrap_or_else(|| CloseFrame::new(CloseCode::NoStatus, ""));
                    return Ok(LinkEvent::Closed(Some(frame)));
                }
                Err(Error::ConnectionClosed(_)) => return Ok(LinkEvent::Closed(None)),
                Err(e) => return Err(e),
            }
        }
    }

    async fn close(&mut self, code: u16, reason: &str) -> Result<()> {
        self.conn.close(CloseCode::from_u16(code), reason).await
    }

    fn is_open(&self) -> bool {
        self.conn.is_open()
    }
}
