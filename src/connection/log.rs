//! Per-request access records.
//!
//! The session emits exactly one record per request or terminal event; an
//! external logger consumes it (and is responsible for things like secret
//! redaction in query strings). The default implementation forwards the
//! record as one structured tracing event.

use std::net::SocketAddr;
use std::time::Duration;

use tracing::info;

/// How a request (or the attempt to read one) ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The request line was rejected (malformed or refused version).
    Refused,
    /// A read deadline expired.
    TimedOut,
    /// A bounded read exceeded its byte budget.
    Overflowed,
    /// The request was processed and a response went out.
    NormalSuccess,
    /// The connection ended without any response bytes.
    NoResponseSent,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Refused => "refused",
            Outcome::TimedOut => "timed-out",
            Outcome::Overflowed => "overflowed",
            Outcome::NormalSuccess => "normal-success",
            Outcome::NoResponseSent => "no-response-sent",
        }
    }
}

/// One structured record per request or terminal event.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub remote_addr: SocketAddr,
    pub method: Option<String>,
    pub path: Option<String>,
    pub query: Option<String>,
    pub status: Option<u16>,
    pub elapsed: Duration,
    pub outcome: Outcome,
    /// Verbatim request line and headers; truncated lines carry the
    /// internal overflow sentinel.
    pub raw_text: String,
}

/// Consumer of access records.
pub trait AccessLog: Send + Sync {
    fn log(&self, record: &LogRecord);
}

/// Default logger: one tracing event per record.
#[derive(Debug, Default)]
pub struct TracingAccessLog;

impl AccessLog for TracingAccessLog {
    fn log(&self, record: &LogRecord) {
        info!(
            remote = %record.remote_addr,
            method = record.method.as_deref().unwrap_or("-"),
            path = record.path.as_deref().unwrap_or("-"),
            query = record.query.as_deref().unwrap_or(""),
            status = record.status.map(i64::from).unwrap_or(-1),
            elapsed_ms = record.elapsed.as_millis() as u64,
            outcome = record.outcome.as_str(),
            "request"
        );
    }
}
