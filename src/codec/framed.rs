use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::config::{Config, Limits};
use crate::error::{Error, Result};
use crate::protocol::{Frame, FrameHeader, MaskGenerator};

/// Frame-level reader/writer over an async byte stream, client role.
///
/// Outgoing frames are always masked; incoming frames must not be.
/// [`read_frame`](Self::read_frame) is cancel-safe: bytes already read stay
/// in the internal buffer until a whole frame is available. Writes are
/// queued the same way, so a cancelled write leaves its unwritten tail in
/// front of whatever is written next.
pub struct WebSocketCodec<T> {
    io: T,
    read_buf: BytesMut,
    write_buf: BytesMut,
    limits: Limits,
    read_chunk: usize,
    masks: MaskGenerator,
}

impl<T> WebSocketCodec<T> {
    #[must_use]
    pub fn new(io: T, config: &Config) -> Self {
        Self::with_buffered(io, BytesMut::new(), config)
    }

    /// Create a codec that first consumes `buffered`, bytes read from the
    /// stream past the end of the handshake response.
    #[must_use]
    pub fn with_buffered(io: T, mut buffered: BytesMut, config: &Config) -> Self {
        buffered.reserve(config.read_buffer_size);
        Self {
            io,
            read_buf: buffered,
            write_buf: BytesMut::new(),
            limits: config.limits.clone(),
            read_chunk: config.read_buffer_size.max(1024),
            masks: MaskGenerator::new(),
        }
    }

    #[must_use]
    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    #[must_use]
    pub fn into_inner(self) -> T {
        self.io
    }

    /// Mask and encode `frame` behind any bytes still waiting to be written.
    pub fn queue_frame(&mut self, frame: &Frame) {
        let mask = self.masks.next_mask();
        frame.encode(&mut self.write_buf, Some(mask));
    }

    #[must_use]
    pub fn has_pending_writes(&self) -> bool {
        !self.write_buf.is_empty()
    }

    fn try_parse(&mut self) -> Result<Option<Frame>> {
        if self.read_buf.len() < 2 {
            return Ok(None);
        }
        if self.read_buf[1] & 0x80 != 0 {
            return Err(Error::MaskedServerFrame);
        }

        match FrameHeader::peek(&self.read_buf) {
            Ok(header) => self.limits.check_frame_size(header.payload_len)?,
            Err(Error::IncompleteFrame { .. }) => return Ok(None),
            Err(e) => return Err(e),
        }

        match Frame::parse(&self.read_buf) {
            Ok((frame, consumed)) => {
                self.read_buf.advance(consumed);
                Ok(Some(frame))
            }
            Err(Error::IncompleteFrame { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl<T: AsyncRead + AsyncWrite + Unpin> WebSocketCodec<T> {
    /// Read the next frame.
    ///
    /// # Errors
    ///
    /// - `Error::ConnectionClosed(None)` on EOF
    /// - `Error::MaskedServerFrame`, `Error::FrameTooLarge` and parse errors
    /// - I/O errors from the underlying stream
    pub async fn read_frame(&mut self) -> Result<Frame> {
        loop {
            if let Some(frame) = self.try_parse()? {
                return Ok(frame);
            }

            self.read_buf.reserve(self.read_chunk);
            let n = self.io.read_buf(&mut self.read_buf).await?;
            if n == 0 {
                return Err(Error::ConnectionClosed(None));
            }
        }
    }

    /// Write out every queued byte, then flush.
    ///
    /// Cancel-safe: the buffer is advanced as bytes are accepted, so
    /// dropping this future never loses or repeats part of a frame.
    pub async fn flush_pending(&mut self) -> Result<()> {
        while self.write_buf.has_remaining() {
            self.io.write_all_buf(&mut self.write_buf).await?;
        }
        self.io.flush().await?;
        Ok(())
    }

    /// Queue one frame and write it out with anything queued before it.
    pub async fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.queue_frame(frame);
        self.flush_pending().await
    }
}
