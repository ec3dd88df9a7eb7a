//! One session per accepted transport connection.
//!
//! The session owns both halves of the connection and drives the
//! read / dispatch / log loop: read a request line under the current
//! deadline, parse headers and body, offer the request to the extension
//! chain, close out the response, emit exactly one access record, then
//! either loop for the next keep-alive request or close. Requests on one
//! connection are strictly sequential; every read is bounded by the phase's
//! deadline and a timeout is terminal.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::codec::body::{boundary_of, parse_multipart, parse_urlencoded, percent_decode};
use crate::codec::{read_header_table, LineReader, RawLine, OVERFLOW_SENTINEL};
use crate::connection::{AccessLog, LogRecord, Outcome, ResponseWriter};
use crate::handler::ExtensionChain;
use crate::protocol::{Attachment, Fields, HeaderTable, Method, RequestContext, Version};
use crate::server::ServerConfig;

/// Whether the keep-alive loop continues after the current request.
#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Close,
}

/// Partial request identity carried into the access record, filled in as
/// parsing progresses.
#[derive(Default)]
struct RequestMeta {
    method: Option<String>,
    path: Option<String>,
    query: Option<String>,
}

pub struct Session<R> {
    reader: LineReader<R>,
    response: ResponseWriter,
    remote_addr: SocketAddr,
    config: Arc<ServerConfig>,
    chain: Arc<ExtensionChain>,
    access_log: Arc<dyn AccessLog>,
    requests_served: usize,
}

impl<R> Session<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(
        reader: R,
        writer: Box<dyn AsyncWrite + Send + Unpin>,
        remote_addr: SocketAddr,
        config: Arc<ServerConfig>,
        chain: Arc<ExtensionChain>,
        access_log: Arc<dyn AccessLog>,
    ) -> Self {
        Self {
            reader: LineReader::new(reader),
            response: ResponseWriter::new(writer),
            remote_addr,
            config,
            chain,
            access_log,
            requests_served: 0,
        }
    }

    /// Drives the connection until a terminal trigger, then closes the
    /// transport exactly once.
    pub async fn process(mut self) {
        loop {
            if self.serve_one().await == Flow::Close {
                break;
            }
        }
        self.response.shutdown().await;
        debug!(remote = %self.remote_addr, served = self.requests_served, "connection closed");
    }

    /// Serves one request/response cycle, emitting its single access record.
    async fn serve_one(&mut self) -> Flow {
        let started = Instant::now();
        let first = self.requests_served == 0;
        let read_timeout = if first { self.config.initial_timeout } else { self.config.persistent_timeout };
        let config = Arc::clone(&self.config);

        let mut raw_text = String::new();
        let mut meta = RequestMeta::default();

        // a fresh response; re-armed with the request's own mode after the
        // headers are known
        self.response.reset(false, false);

        // request line, tolerating a few leading blank lines
        let mut blank_budget = 4usize;
        let line = loop {
            match timeout(read_timeout, self.reader.read_line(config.max_request_line_bytes)).await {
                Err(_) => return self.terminal(started, meta, Outcome::TimedOut, raw_text).await,
                Ok(Err(e)) => {
                    warn!(cause = %e, "read failure on request line");
                    return self.terminal(started, meta, Outcome::NoResponseSent, raw_text).await;
                }
                Ok(Ok(RawLine::Eof)) => return self.terminal(started, meta, Outcome::NoResponseSent, raw_text).await,
                Ok(Ok(RawLine::Overflow(prefix))) => {
                    raw_text.push_str(OVERFLOW_SENTINEL);
                    raw_text.push_str(&prefix);
                    raw_text.push('\n');
                    return self.refuse(started, meta, Outcome::Overflowed, raw_text, 414).await;
                }
                Ok(Ok(RawLine::Line(line))) if line.is_empty() => {
                    blank_budget -= 1;
                    if blank_budget == 0 {
                        return self.refuse(started, meta, Outcome::Refused, raw_text, 400).await;
                    }
                }
                Ok(Ok(RawLine::Line(line))) => break line,
            }
        };

        raw_text.push_str(&line);
        raw_text.push('\n');

        // request line: METHOD SP PATH SP VERSION, nothing more
        let mut tokens = line.split_whitespace();
        let (method_token, path_token, version_token) = match (tokens.next(), tokens.next(), tokens.next(), tokens.next()) {
            (Some(m), Some(p), Some(v), None) => (m, p, v),
            _ => return self.refuse(started, meta, Outcome::Refused, raw_text, 400).await,
        };

        let method = Method::parse(method_token);
        meta.method = Some(method_token.to_string());
        let (raw_path, query) = match path_token.split_once('?') {
            Some((path, query)) => (path, Some(query.to_string())),
            None => (path_token, None),
        };
        let path = percent_decode(raw_path, false);
        meta.path = Some(path.clone());
        meta.query = query.clone();

        let version = match Version::parse(version_token) {
            Ok(version) => version,
            Err(Some(refused)) => {
                debug!(version = %refused, "refusing version");
                if config.strict_version_only {
                    return self.refuse(started, meta, Outcome::Refused, raw_text, 505).await;
                }
                Version::Http10
            }
            Err(None) => return self.refuse(started, meta, Outcome::Refused, raw_text, 400).await,
        };

        // header section
        let headers = match timeout(
            config.persistent_timeout,
            read_header_table(&mut self.reader, config.max_header_field_bytes, &mut raw_text),
        )
        .await
        {
            Err(_) => return self.terminal(started, meta, Outcome::TimedOut, raw_text).await,
            Ok(Err(e)) => {
                warn!(cause = %e, "read failure in header section");
                return self.terminal(started, meta, Outcome::NoResponseSent, raw_text).await;
            }
            Ok(Ok((_, true))) => return self.refuse(started, meta, Outcome::Overflowed, raw_text, 413).await,
            Ok(Ok((headers, false))) => headers,
        };

        let client_keep_alive = headers.wants_keep_alive();
        let remaining = config.request_limit.saturating_sub(self.requests_served + 1);

        self.response.reset(method == Method::Head, config.buffer_responses);
        if client_keep_alive {
            self.response
                .arm_keep_alive(Some(format!("timeout={}, max={}", config.persistent_timeout.as_secs(), remaining)));
        }

        // query fields first so body fields merge (collisions become lists)
        let mut fields = Fields::new();
        if let Some(query) = &query {
            parse_urlencoded(query, &mut fields);
        }

        if method.may_have_body() {
            match self.read_body(&headers, version, &mut fields).await {
                BodyOutcome::Decoded => {}
                BodyOutcome::Fault(status) => return self.refuse(started, meta, Outcome::NormalSuccess, raw_text, status).await,
                BodyOutcome::TimedOut => return self.terminal(started, meta, Outcome::TimedOut, raw_text).await,
                BodyOutcome::Disconnected => return self.terminal(started, meta, Outcome::NoResponseSent, raw_text).await,
            }
        }

        // dispatch through the extension chain
        let chain = Arc::clone(&self.chain);
        let handler_keep_alive = {
            let mut ctx = RequestContext::new(
                method,
                path,
                query,
                version,
                headers,
                self.remote_addr,
                raw_text.clone(),
                &mut self.response,
            );
            ctx.fields = fields;

            let mut claimed = chain.dispatch(&mut ctx).await;
            if !claimed && ctx.path.ends_with(&config.service_suffix) {
                claimed = chain.dispatch_named(&mut ctx).await;
            }
            if !claimed {
                let status = if ctx.method.is_servable() { 404 } else { 405 };
                let _ = ctx.response.send_status(status, &[]).await;
            }
            ctx.keep_alive()
        };

        if let Err(e) = self.response.finish().await {
            warn!(cause = %e, "failed closing out response");
        }

        self.requests_served += 1;
        let outcome = if self.response.response_started() { Outcome::NormalSuccess } else { Outcome::NoResponseSent };
        self.emit(started, meta, outcome, raw_text);

        if client_keep_alive && handler_keep_alive && remaining > 0 {
            Flow::Continue
        } else {
            Flow::Close
        }
    }

    /// Decodes the request body into `fields`, choosing the strategy from
    /// Content-Type and Content-Length, including the 100-continue dance.
    async fn read_body(&mut self, headers: &HeaderTable, version: Version, fields: &mut Fields) -> BodyOutcome {
        let config = Arc::clone(&self.config);
        let declared = headers.content_length();
        let content_type = headers.get("content-type").map(str::to_string);

        if version == Version::Http11 {
            let expects_continue = headers
                .get("expect")
                .map(|v| v.to_ascii_lowercase().contains("100-continue"))
                .unwrap_or(false);
            if expects_continue {
                // the strict check applies only to an explicit Expect; the
                // proactive path below is deliberately looser
                if declared.unwrap_or(0) > config.max_multipart_bytes as u64 {
                    return BodyOutcome::Fault(417);
                }
                if let Err(e) = self.response.send_continue().await {
                    warn!(cause = %e, "failed sending interim status");
                    return BodyOutcome::Disconnected;
                }
            } else if declared.unwrap_or(0) > 0 && self.reader.buffered_len() == 0 {
                let _ = self.response.send_continue().await;
            }
        }

        let ct_lower = content_type.as_deref().unwrap_or("").trim_start().to_ascii_lowercase();

        if content_type.is_none() || ct_lower.starts_with("application/x-www-form-urlencoded") {
            match declared {
                Some(n) => match timeout(config.persistent_timeout, self.reader.read_exact_body(n as usize)).await {
                    Err(_) => BodyOutcome::TimedOut,
                    Ok(Err(_)) => BodyOutcome::Disconnected,
                    Ok(Ok(bytes)) => {
                        let text: String = bytes.iter().map(|&b| b as char).collect();
                        parse_urlencoded(text.trim_end_matches(['\r', '\n']), fields);
                        BodyOutcome::Decoded
                    }
                },
                // legacy: no Content-Length, read one unbounded 8-bit-clean line
                None => match timeout(config.persistent_timeout, self.reader.read_line(0)).await {
                    Err(_) => BodyOutcome::TimedOut,
                    Ok(Err(_)) => BodyOutcome::Disconnected,
                    Ok(Ok(RawLine::Line(text))) => {
                        parse_urlencoded(text.trim_end_matches('\r'), fields);
                        BodyOutcome::Decoded
                    }
                    Ok(Ok(_)) => BodyOutcome::Decoded,
                },
            }
        } else if ct_lower.starts_with("multipart/form-data") {
            let Some(boundary) = boundary_of(&ct_lower) else {
                return BodyOutcome::Fault(400);
            };
            let Some(n) = declared else {
                return BodyOutcome::Fault(411);
            };
            if n > config.max_multipart_bytes as u64 {
                return BodyOutcome::Fault(413);
            }
            match timeout(config.persistent_timeout, self.reader.read_exact_body(n as usize)).await {
                Err(_) => BodyOutcome::TimedOut,
                Ok(Err(_)) => BodyOutcome::Disconnected,
                Ok(Ok(body)) => {
                    // a multipart parse error never kills the session; the
                    // request proceeds with whatever fields decoded
                    if let Err(e) = parse_multipart(&body, &boundary, fields) {
                        warn!(cause = %e, "multipart body failed to parse");
                    }
                    BodyOutcome::Decoded
                }
            }
        } else if ct_lower.starts_with("application/octet-stream") {
            let Some(n) = declared else {
                return BodyOutcome::Fault(411);
            };
            match timeout(config.persistent_timeout, self.reader.read_exact_body(n as usize)).await {
                Err(_) => BodyOutcome::TimedOut,
                Ok(Err(_)) => BodyOutcome::Disconnected,
                Ok(Ok(data)) => {
                    fields.add_attachment(
                        "content",
                        Attachment { filename: String::new(), content_type, data },
                    );
                    BodyOutcome::Decoded
                }
            }
        } else {
            BodyOutcome::Fault(415)
        }
    }

    /// Sends a canned refusal, then closes with one access record.
    async fn refuse(&mut self, started: Instant, meta: RequestMeta, outcome: Outcome, raw_text: String, status: u16) -> Flow {
        if let Err(e) = self.response.send_status(status, &[]).await {
            warn!(cause = %e, status, "failed sending canned refusal");
        }
        if let Err(e) = self.response.finish().await {
            warn!(cause = %e, "failed closing out refusal");
        }
        self.emit(started, meta, outcome, raw_text);
        Flow::Close
    }

    /// Closes without attempting a response, with one access record.
    async fn terminal(&mut self, started: Instant, meta: RequestMeta, outcome: Outcome, raw_text: String) -> Flow {
        self.emit(started, meta, outcome, raw_text);
        Flow::Close
    }

    fn emit(&self, started: Instant, meta: RequestMeta, outcome: Outcome, raw_text: String) {
        let record = LogRecord {
            remote_addr: self.remote_addr,
            method: meta.method,
            path: meta.path,
            query: meta.query,
            status: self.response.status(),
            elapsed: started.elapsed(),
            outcome,
            raw_text,
        };
        self.access_log.log(&record);
    }
}

impl<R> std::fmt::Debug for Session<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("remote_addr", &self.remote_addr)
            .field("requests_served", &self.requests_served)
            .finish_non_exhaustive()
    }
}

enum BodyOutcome {
    Decoded,
    Fault(u16),
    TimedOut,
    Disconnected,
}
