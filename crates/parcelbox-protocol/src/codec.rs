//! Tokio codec for the bridge's newline-delimited text protocol.
//!
//! The bridge emits one record per line. Lines may end in `\n` or `\r\n`; the
//! trailing `\r` is stripped. Bytes are decoded lossily so that line noise on
//! the serial cable never aborts the read loop.
//!
//! # Usage with Tokio Framed
//!
//! ```rust,no_run
//! use futures::{SinkExt, StreamExt};
//! use parcelbox_protocol::LineCodec;
//! use tokio_util::codec::Framed;
//!
//! # async fn example(io: tokio::io::DuplexStream) -> parcelbox_core::Result<()> {
//! let mut framed = Framed::new(io, LineCodec::new());
//! framed.send("TARE:ALL".to_string()).await?;
//!
//! while let Some(line) = framed.next().await {
//!     println!("RX {}", line?);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Oversized Lines
//!
//! A run of more than `max_line_length` bytes without a terminator yields a
//! single `Error::LineTooLarge`. The codec then discards input up to and
//! including the next `\n` and resumes normal decoding, so callers that drive
//! [`Decoder::decode`] by hand can log the error and keep going.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use parcelbox_core::constants::{LINE_TERMINATOR, MAX_LINE_LENGTH};
use parcelbox_core::{Error, Result};

/// Newline line codec with a bounded line length.
#[derive(Debug, Clone)]
pub struct LineCodec {
    /// Index into the buffer already scanned for a terminator.
    next_index: usize,

    /// Maximum accepted line length in bytes, excluding the terminator.
    max_line_length: usize,

    /// Set after an oversized line until the next terminator is seen.
    is_discarding: bool,
}

impl LineCodec {
    /// Create a codec with the default line limit (1 KiB).
    ///
    /// ```
    /// use parcelbox_protocol::LineCodec;
    ///
    /// let codec = LineCodec::new();
    /// assert_eq!(codec.max_line_length(), 1024);
    /// ```
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_line_length(MAX_LINE_LENGTH)
    }

    #[must_use]
    pub fn with_max_line_length(max_line_length: usize) -> Self {
        Self {
            next_index: 0,
            max_line_length,
            is_discarding: false,
        }
    }

    #[must_use]
    pub fn max_line_length(&self) -> usize {
        self.max_line_length
    }

    fn finish_line(bytes: &[u8]) -> String {
        let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
        String::from_utf8_lossy(bytes).into_owned()
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>> {
        loop {
            // Never scan more than one byte past the limit.
            let read_to = src.len().min(self.max_line_length.saturating_add(1));
            let terminator = src[self.next_index..read_to]
                .iter()
                .position(|b| *b == LINE_TERMINATOR);

            match (self.is_discarding, terminator) {
                (true, Some(offset)) => {
                    src.advance(self.next_index + offset + 1);
                    self.is_discarding = false;
                    self.next_index = 0;
                }
                (true, None) => {
                    src.advance(read_to);
                    self.next_index = 0;
                    if src.is_empty() {
                        return Ok(None);
                    }
                }
                (false, Some(offset)) => {
                    let end = self.next_index + offset;
                    self.next_index = 0;
                    let line = src.split_to(end + 1);
                    return Ok(Some(Self::finish_line(&line[..end])));
                }
                (false, None) if src.len() > self.max_line_length => {
                    self.is_discarding = true;
                    return Err(Error::LineTooLarge {
                        size: src.len(),
                        max_size: self.max_line_length,
                    });
                }
                (false, None) => {
                    self.next_index = read_to;
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<String>> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }
        if src.is_empty() || self.is_discarding {
            src.clear();
            self.next_index = 0;
            return Ok(None);
        }
        let rest = src.split();
        self.next_index = 0;
        Ok(Some(Self::finish_line(&rest)))
    }
}

impl<T: AsRef<str>> Encoder<T> for LineCodec {
    type Error = Error;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<()> {
        let line = item.as_ref();
        if line.bytes().any(|b| b == LINE_TERMINATOR || b == b'\r') {
            return Err(Error::InvalidValue(format!(
                "outbound line must not contain line breaks: {line:?}"
            )));
        }
        if line.len() > self.max_line_length {
            return Err(Error::LineTooLarge {
                size: line.len(),
                max_size: self.max_line_length,
            });
        }

        dst.reserve(line.len() + 1);
        dst.put_slice(line.as_bytes());
        dst.put_u8(LINE_TERMINATOR);
        Ok(())
    }
}
