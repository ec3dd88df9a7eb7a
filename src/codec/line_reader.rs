//! Bounded line reading over a raw byte stream.
//!
//! The reader keeps its own buffer so bytes read past a line terminator are
//! not lost between requests on a kept-alive connection. Lines are read
//! byte-accurately: CR is stripped, bare LF is accepted as a terminator, and
//! a line exceeding its byte budget comes back as [`RawLine::Overflow`] so
//! the caller can stop parsing and still log a truncated snippet.

use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Internal, never wire-visible prefix marking a truncated line in captured
/// request text.
pub(crate) const OVERFLOW_SENTINEL: &str = "\u{1a}[truncated] ";

/// Result of one bounded line read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawLine {
    /// A complete line, CR-stripped, without its terminator.
    Line(String),
    /// The stream ended before any terminator.
    Eof,
    /// The byte budget ran out before a terminator; carries what was read.
    Overflow(String),
}

/// Buffered line reader over the inbound half of a connection.
pub struct LineReader<R> {
    reader: R,
    buffer: BytesMut,
    eof: bool,
}

impl<R> LineReader<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(reader: R) -> Self {
        Self { reader, buffer: BytesMut::with_capacity(8 * 1024), eof: false }
    }

    /// Number of bytes already buffered but not yet consumed.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Reads one line.
    ///
    /// With `max_bytes == 0` the read is unbounded and 8-bit-clean: every
    /// byte is mapped to the char of the same code point and only a bare LF
    /// or EOF terminates. This mode exists solely for the legacy url-encoded
    /// body without a Content-Length.
    ///
    /// With `max_bytes > 0` the read is bounded: CR bytes are stripped, LF
    /// terminates, and exhausting the budget without a terminator yields
    /// [`RawLine::Overflow`].
    pub async fn read_line(&mut self, max_bytes: usize) -> std::io::Result<RawLine> {
        let mut line = String::new();
        let mut scanned = 0usize;

        loop {
            while scanned < self.buffer.len() {
                let byte = self.buffer[scanned];
                scanned += 1;
                if byte == b'\n' {
                    Self::decode_into(&mut line, &self.buffer[..scanned - 1], max_bytes == 0);
                    self.buffer.advance(scanned);
                    return Ok(RawLine::Line(line));
                }
                if max_bytes > 0 && scanned >= max_bytes {
                    Self::decode_into(&mut line, &self.buffer[..scanned], false);
                    self.buffer.advance(scanned);
                    return Ok(RawLine::Overflow(line));
                }
            }

            if !self.fill().await? {
                if scanned == 0 {
                    return Ok(RawLine::Eof);
                }
                Self::decode_into(&mut line, &self.buffer[..scanned], max_bytes == 0);
                self.buffer.advance(scanned);
                return Ok(RawLine::Line(line));
            }
        }
    }

    /// Reads exactly `n` body bytes, draining the buffer first.
    pub async fn read_exact_body(&mut self, n: usize) -> std::io::Result<Bytes> {
        let mut out = BytesMut::with_capacity(n.min(64 * 1024));
        while out.len() < n {
            if self.buffer.is_empty() && !self.fill().await? {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "connection closed before the declared body length",
                ));
            }
            let take = (n - out.len()).min(self.buffer.len());
            out.extend_from_slice(&self.buffer[..take]);
            self.buffer.advance(take);
        }
        Ok(out.freeze())
    }

    /// Refills the buffer from the stream. Returns false at end of stream.
    ///
    /// Transport faults (for example a handshake layer failing mid-read) are
    /// folded into a clean end of stream rather than surfaced as an error;
    /// a torn connection must read like a closed one.
    async fn fill(&mut self) -> std::io::Result<bool> {
        if self.eof {
            return Ok(false);
        }
        let mut chunk = [0u8; 4096];
        match self.reader.read(&mut chunk).await {
            Ok(0) => {
                self.eof = true;
                Ok(false)
            }
            Ok(n) => {
                self.buffer.extend_from_slice(&chunk[..n]);
                Ok(true)
            }
            Err(_) => {
                self.eof = true;
                Ok(false)
            }
        }
    }

    /// Decodes raw bytes into the line, 8-bit-clean in binary mode,
    /// CR-stripping in bounded mode.
    fn decode_into(line: &mut String, bytes: &[u8], binary: bool) {
        for &byte in bytes {
            if !binary && byte == b'\r' {
                continue;
            }
            line.push(byte as char);
        }
    }
}
