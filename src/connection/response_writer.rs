//! The outbound half of a connection.
//!
//! A handler may write a complete response itself (first write starting with
//! the `HTTP/` status-line marker) or just print a body and have a minimal
//! header synthesized. Either way the writer tracks the header/body boundary
//! through an explicit state machine so the session can tell whether, and
//! with what status, a response went out.

use bytes::BytesMut;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::warn;

use crate::protocol::{status, SendError};

/// Marker distinguishing a handler-written status line from plain body text.
const STATUS_LINE_MARKER: &[u8] = b"HTTP/";

/// Upper bound for a single flush write when draining a buffered response.
const FLUSH_CHUNK: usize = 8 * 1024;

/// Where the response stands between the first handler write and the close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseState {
    /// Nothing written yet.
    NotStarted,
    /// The handler is emitting its own header; watching for the blank line.
    SendingHeader,
    /// The header block is complete; body bytes flow through.
    HeaderSent,
    /// The response is finished; further writes are an error.
    Closed,
}

/// Writer for one response at a time, reused across keep-alive requests.
pub struct ResponseWriter {
    writer: Box<dyn AsyncWrite + Send + Unpin>,
    state: ResponseState,
    /// `Some` while buffering so a Content-Length can be computed at close.
    buffer: Option<BytesMut>,
    head_request: bool,
    /// Keep-Alive field value (`timeout=..., max=...`) armed by the session.
    keep_alive_field: Option<String>,
    /// Status captured from the status line, canned or handler-written.
    captured_status: Option<u16>,
    status_line: String,
    status_line_done: bool,
    newline_run: u8,
    broken: bool,
}

impl ResponseWriter {
    pub fn new(writer: Box<dyn AsyncWrite + Send + Unpin>) -> Self {
        Self {
            writer,
            state: ResponseState::NotStarted,
            buffer: None,
            head_request: false,
            keep_alive_field: None,
            captured_status: None,
            status_line: String::new(),
            status_line_done: false,
            newline_run: 0,
            broken: false,
        }
    }

    /// Re-arms the writer for the next request on this connection.
    pub fn reset(&mut self, head_request: bool, buffering: bool) {
        self.state = ResponseState::NotStarted;
        self.buffer = buffering.then(|| BytesMut::with_capacity(4 * 1024));
        self.head_request = head_request;
        self.keep_alive_field = None;
        self.captured_status = None;
        self.status_line.clear();
        self.status_line_done = false;
        self.newline_run = 0;
    }

    /// Sets the Keep-Alive field the synthesized or canned header will carry.
    pub fn arm_keep_alive(&mut self, field: Option<String>) {
        self.keep_alive_field = field;
    }

    pub fn state(&self) -> ResponseState {
        self.state
    }

    /// Status of the response that went out, if one did.
    pub fn status(&self) -> Option<u16> {
        self.captured_status
    }

    /// True once any response byte has been produced for this request.
    pub fn response_started(&self) -> bool {
        self.state != ResponseState::NotStarted
    }

    pub fn is_head(&self) -> bool {
        self.head_request
    }

    /// Writes text to the response body (or header, if the handler is
    /// emitting its own).
    pub async fn print(&mut self, text: &str) -> Result<(), SendError> {
        self.write_raw(text.as_bytes()).await
    }

    /// Writes text followed by a newline.
    pub async fn println(&mut self, text: &str) -> Result<(), SendError> {
        self.write_raw(text.as_bytes()).await?;
        self.write_raw(b"\n").await
    }

    /// Writes raw bytes, driving the state machine.
    pub async fn write_raw(&mut self, bytes: &[u8]) -> Result<(), SendError> {
        match self.state {
            ResponseState::Closed => return Err(SendError::Closed),
            ResponseState::NotStarted => {
                if bytes.starts_with(STATUS_LINE_MARKER) {
                    self.state = ResponseState::SendingHeader;
                } else {
                    let header = self.synthesize_header();
                    self.state = ResponseState::HeaderSent;
                    self.captured_status = Some(200);
                    self.emit(header.as_bytes()).await?;
                }
            }
            _ => {}
        }

        if self.state == ResponseState::SendingHeader {
            match self.scan_header(bytes) {
                Some(boundary) => {
                    self.state = ResponseState::HeaderSent;
                    // for unbuffered HEAD responses the body is cut right at
                    // the boundary; buffered ones are truncated at finish,
                    // after the content length is computed
                    if self.head_request && self.buffer.is_none() {
                        return self.emit(&bytes[..boundary]).await;
                    }
                }
                None => return self.emit(bytes).await,
            }
            return self.emit(bytes).await;
        }

        if self.head_request && self.buffer.is_none() {
            // body of a HEAD response is discarded
            return Ok(());
        }

        self.emit(bytes).await
    }

    /// Sends a canned response for `status` with optional extra header lines.
    ///
    /// Does nothing when a response is already under way: at most one
    /// response per request, the first decisive one wins. Write failures on
    /// an already broken transport are swallowed.
    pub async fn send_status(&mut self, code: u16, extra_headers: &[(&str, &str)]) -> Result<(), SendError> {
        if self.state != ResponseState::NotStarted {
            return Ok(());
        }

        let body = status::canned_body(code);
        let mut response = format!("HTTP/1.1 {} {}\r\n", code, status::reason(code));
        response.push_str(&format!("Server: {}\r\n", crate::SERVER_TOKEN));
        response.push_str(&format!("Date: {}\r\n", crate::http_date()));
        if let Some(field) = &self.keep_alive_field {
            response.push_str("Connection: Keep-Alive\r\n");
            response.push_str(&format!("Keep-Alive: {field}\r\n"));
        }
        for (name, value) in extra_headers {
            response.push_str(&format!("{name}: {value}\r\n"));
        }
        if !body.is_empty() {
            response.push_str("Content-Type: text/html\r\n");
        }
        response.push_str(&format!("Content-Length: {}\r\n\r\n", body.len()));
        response.push_str(&body);

        // routes through the state machine so the status is captured the
        // same way as a handler-written header
        match self.write_raw(response.as_bytes()).await {
            Ok(()) => Ok(()),
            Err(SendError::Io { source }) => {
                warn!(cause = %source, "swallowing write failure for canned response");
                self.broken = true;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Sends the 100 Continue interim status directly, outside the response
    /// state machine (it precedes the real response).
    pub async fn send_continue(&mut self) -> Result<(), SendError> {
        self.writer.write_all(b"HTTP/1.1 100 Continue\r\n\r\n").await.map_err(SendError::io)?;
        self.writer.flush().await.map_err(SendError::io)?;
        Ok(())
    }

    /// Closes out the response: drains the buffer (injecting Content-Length
    /// and CRLF-normalizing the header block), truncates HEAD responses to
    /// the header block, and flushes.
    pub async fn finish(&mut self) -> Result<(), SendError> {
        if self.state == ResponseState::Closed {
            return Ok(());
        }

        if let Some(buffer) = self.buffer.take() {
            if !buffer.is_empty() {
                let out = finalize_buffered(&buffer, self.head_request);
                for chunk in out.chunks(FLUSH_CHUNK) {
                    if let Err(e) = self.writer.write_all(chunk).await {
                        warn!(cause = %e, "write failure while draining buffered response");
                        self.broken = true;
                        break;
                    }
                }
            }
        }

        if !self.broken {
            if let Err(e) = self.writer.flush().await {
                warn!(cause = %e, "flush failure while closing response");
                self.broken = true;
            }
        }

        self.state = ResponseState::Closed;
        Ok(())
    }

    /// Shuts the transport down. Called exactly once, on any terminal
    /// outcome; failures on an already torn connection are swallowed.
    pub async fn shutdown(&mut self) {
        if let Err(e) = self.writer.shutdown().await {
            warn!(cause = %e, "shutdown failure on transport");
        }
        self.state = ResponseState::Closed;
    }

    /// Minimal header for handlers that only print a body.
    fn synthesize_header(&self) -> String {
        let mut header = String::from("HTTP/1.1 200 OK\r\n");
        header.push_str(&format!("Server: {}\r\n", crate::SERVER_TOKEN));
        header.push_str(&format!("Date: {}\r\n", crate::http_date()));
        header.push_str("Content-Type: text/html\r\n");
        if let Some(field) = &self.keep_alive_field {
            header.push_str("Connection: Keep-Alive\r\n");
            header.push_str(&format!("Keep-Alive: {field}\r\n"));
        }
        header.push_str("\r\n");
        header
    }

    /// Watches handler-written header bytes for the blank-line terminator
    /// without altering them. Returns the offset just past the blank line
    /// when it completes within `bytes`.
    fn scan_header(&mut self, bytes: &[u8]) -> Option<usize> {
        for (i, &byte) in bytes.iter().enumerate() {
            if !self.status_line_done {
                if byte == b'\n' {
                    self.status_line_done = true;
                    self.captured_status = parse_status_line(&self.status_line);
                } else if byte != b'\r' {
                    self.status_line.push(byte as char);
                }
            }
            match byte {
                b'\n' => {
                    self.newline_run += 1;
                    if self.newline_run == 2 {
                        return Some(i + 1);
                    }
                }
                b'\r' => {}
                _ => self.newline_run = 0,
            }
        }
        None
    }

    async fn emit(&mut self, bytes: &[u8]) -> Result<(), SendError> {
        if bytes.is_empty() || self.broken {
            return Ok(());
        }
        match &mut self.buffer {
            Some(buffer) => {
                buffer.extend_from_slice(bytes);
                Ok(())
            }
            None => self.writer.write_all(bytes).await.map_err(SendError::io),
        }
    }
}

impl std::fmt::Debug for ResponseWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseWriter")
            .field("state", &self.state)
            .field("buffering", &self.buffer.is_some())
            .field("head_request", &self.head_request)
            .field("status", &self.captured_status)
            .finish_non_exhaustive()
    }
}

fn parse_status_line(line: &str) -> Option<u16> {
    line.split_whitespace().nth(1)?.parse::<u16>().ok()
}

/// Post-processes a buffered response: finds the header/body boundary
/// (bare LF-LF or CRLF-CRLF, whichever comes first), injects a computed
/// Content-Length if the header block lacks one, CRLF-normalizes only the
/// header block, and truncates to it for HEAD requests.
fn finalize_buffered(buffer: &[u8], head_request: bool) -> Vec<u8> {
    if !buffer.starts_with(STATUS_LINE_MARKER) {
        // no status line at all: ship as-is
        return buffer.to_vec();
    }

    let (header_end, body_start) = match header_boundary(buffer) {
        Some(boundary) => boundary,
        None => (buffer.len(), buffer.len()),
    };
    let body = &buffer[body_start..];

    let header_text = String::from_utf8_lossy(&buffer[..header_end]);
    let mut has_content_length = false;
    let mut header_block = String::new();
    for line in header_text.lines() {
        let line = line.trim_end_matches('\r');
        if line.to_ascii_lowercase().starts_with("content-length:") {
            has_content_length = true;
        }
        header_block.push_str(line);
        header_block.push_str("\r\n");
    }
    if !has_content_length {
        header_block.push_str(&format!("Content-Length: {}\r\n", body.len()));
    }
    header_block.push_str("\r\n");

    let mut out = header_block.into_bytes();
    if !head_request {
        out.extend_from_slice(body);
    }
    out
}

/// First header/body boundary: offsets of (end of header text, start of body).
fn header_boundary(buffer: &[u8]) -> Option<(usize, usize)> {
    let crlf = find(b"\r\n\r\n", buffer);
    let lf = find(b"\n\n", buffer);
    match (crlf, lf) {
        (Some(c), Some(l)) if l + 1 < c => Some((l, l + 2)),
        (Some(c), _) => Some((c, c + 4)),
        (None, Some(l)) => Some((l, l + 2)),
        (None, None) => None,
    }
}

fn find(needle: &[u8], haystack: &[u8]) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|window| window == needle)
}
