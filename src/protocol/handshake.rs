//! Client side of the WebSocket opening handshake (RFC 6455 Section 4.1).

use std::collections::HashMap;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use sha1::{Digest, Sha1};

use crate::config::Config;
use crate::error::{Error, Result};

/// The WebSocket GUID used in the Sec-WebSocket-Accept calculation.
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Computes the Sec-WebSocket-Accept value for a Sec-WebSocket-Key.
///
/// # Example
///
/// ```
/// use wsprobe::protocol::compute_accept_key;
///
/// let accept = compute_accept_key("dGhlIHNhbXBsZSBub25jZQ==");
/// assert_eq!(accept, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
/// ```
#[must_use]
pub fn compute_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// Generate a fresh base64-encoded 16-byte Sec-WebSocket-Key.
///
/// # Errors
///
/// Returns `Error::Io` if the OS random source is unavailable.
pub fn generate_key() -> Result<String> {
    let mut nonce = [0u8; 16];
    getrandom::getrandom(&mut nonce).map_err(|e| Error::Io(e.to_string()))?;
    Ok(BASE64.encode(nonce))
}

fn validate_header_value(header: &str, value: &str) -> Result<()> {
    if value.contains('\r') || value.contains('\n') {
        return Err(Error::InvalidHeaderValue {
            header: header.to_string(),
            reason: "contains CR or LF characters".to_string(),
        });
    }
    Ok(())
}

/// An upgrade request ready to be written to the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientHandshake {
    key: String,
    request: Vec<u8>,
}

impl ClientHandshake {
    /// Build the upgrade request for `host` (including any non-default port)
    /// and `resource` (path plus query).
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidHeaderValue` if a configured header contains CR/LF.
    pub fn new(host: &str, resource: &str, key: String, config: &Config) -> Result<Self> {
        let mut request = format!(
            "GET {resource} HTTP/1.1\r\n\
             Host: {host}\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Key: {key}\r\n\
             Sec-WebSocket-Version: 13\r\n"
        );

        if let Some(origin) = &config.origin {
            validate_header_value("Origin", origin)?;
            request.push_str(&format!("Origin: {origin}\r\n"));
        }

        if !config.protocols.is_empty() {
            let protocols = config.protocols.join(", ");
            validate_header_value("Sec-WebSocket-Protocol", &protocols)?;
            request.push_str(&format!("Sec-WebSocket-Protocol: {protocols}\r\n"));
        }

        for (name, value) in &config.headers {
            validate_header_value(name, name)?;
            validate_header_value(name, value)?;
            request.push_str(&format!("{name}: {value}\r\n"));
        }

        request.push_str("\r\n");

        Ok(Self {
            key,
            request: request.into_bytes(),
        })
    }

    /// The Sec-WebSocket-Key sent with this request.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The raw HTTP request bytes.
    #[must_use]
    pub fn request(&self) -> &[u8] {
        &self.request
    }

    /// Parse the server's response and check it accepts this request.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidHandshake` if the response is malformed, not a
    /// `101`, or carries the wrong Sec-WebSocket-Accept.
    pub fn verify(&self, response: &[u8]) -> Result<HandshakeResponse> {
        let response = HandshakeResponse::parse(response)?;
        let expected = compute_accept_key(&self.key);
        if response.accept != expected {
            return Err(Error::InvalidHandshake(format!(
                "Sec-WebSocket-Accept mismatch: expected {expected}, got {}",
                response.accept
            )));
        }
        Ok(response)
    }
}

/// Parsed `101 Switching Protocols` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeResponse {
    /// The Sec-WebSocket-Accept value.
    pub accept: String,
    /// The subprotocol selected by the server, if any.
    pub protocol: Option<String>,
}

impl HandshakeResponse {
    /// Parse a handshake response from raw HTTP data.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandshake`] if:
    /// - The data is not valid UTF-8 or empty.
    /// - The status code is not `101`.
    /// - `Upgrade`, `Connection` or `Sec-WebSocket-Accept` is missing or wrong.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(data)
            .map_err(|_| Error::InvalidHandshake("Invalid UTF-8".into()))?;
        let mut lines = text.lines();

        let status_line = lines
            .next()
            .filter(|line| !line.is_empty())
            .ok_or_else(|| Error::InvalidHandshake("Empty response".into()))?;
        let mut status = status_line.split_whitespace();
        match (status.next(), status.next()) {
            (Some(version), Some("101")) if version.starts_with("HTTP/1.1") => {}
            _ => {
                return Err(Error::InvalidHandshake(format!(
                    "Expected 101 status, got: {status_line}"
                )));
            }
        }

        let mut headers: HashMap<String, String> = HashMap::new();
        for line in lines.take_while(|line| !line.is_empty()) {
            if let Some((name, value)) = line.split_once(':') {
                headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
            }
        }

        let upgrade = headers
            .get("upgrade")
            .ok_or_else(|| Error::InvalidHandshake("Missing Upgrade header in response".into()))?;
        if !upgrade.eq_ignore_ascii_case("websocket") {
            return Err(Error::InvalidHandshake(format!(
                "Invalid Upgrade header: {upgrade}"
            )));
        }

        let connection = headers.get("connection").ok_or_else(|| {
            Error::InvalidHandshake("Missing Connection header in response".into())
        })?;
        if !connection.to_ascii_lowercase().contains("upgrade") {
            return Err(Error::InvalidHandshake(format!(
                "Invalid Connection header: {connection}"
            )));
        }

        let accept = headers
            .remove("sec-websocket-accept")
            .ok_or_else(|| Error::InvalidHandshake("Missing Sec-WebSocket-Accept header".into()))?;

        Ok(Self {
            accept,
            protocol: headers.remove("sec-websocket-protocol"),
        })
    }
}
