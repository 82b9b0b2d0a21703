use url::Url;

use crate::error::{Error, Result};

/// A parsed `ws://` or `wss://` endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Whether the connection runs over TLS.
    pub secure: bool,
    /// Host name or address, without brackets for IPv6.
    pub host: String,
    /// TCP port, defaulted from the scheme.
    pub port: u16,
    /// Request target: path plus optional query.
    pub resource: String,
}

impl Endpoint {
    /// Parse and check a WebSocket URL.
    ///
    /// # Errors
    ///
    /// `Error::InvalidUrl` if the URL does not parse, has another scheme, or
    /// has no host.
    pub fn parse(raw: &str) -> Result<Self> {
        let url = Url::parse(raw).map_err(|e| Error::InvalidUrl(format!("{raw}: {e}")))?;

        let secure = match url.scheme() {
            "ws" => false,
            "wss" => true,
            other => {
                return Err(Error::InvalidUrl(format!(
                    "unsupported scheme {other:?}, expected ws or wss"
                )));
            }
        };

        let host = url
            .host_str()
            .ok_or_else(|| Error::InvalidUrl(format!("{raw}: missing host")))?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();
        let port = url
            .port_or_known_default()
            .unwrap_or(if secure { 443 } else { 80 });

        let mut resource = url.path().to_string();
        if resource.is_empty() {
            resource.push('/');
        }
        if let Some(query) = url.query() {
            resource.push('?');
            resource.push_str(query);
        }

        Ok(Self {
            secure,
            host,
            port,
            resource,
        })
    }

    /// Value for the `Host` header; the port is included only when it is not
    /// the scheme default.
    #[must_use]
    pub fn host_header(&self) -> String {
        let host = if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        let default_port = if self.secure { 443 } else { 80 };
        if self.port == default_port {
            host
        } else {
            format!("{host}:{}", self.port)
        }
    }

    /// `host:port` suitable for `TcpStream::connect`.
    #[must_use]
    pub fn socket_addr(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}
