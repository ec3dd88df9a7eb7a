//! The per-request context handed to extension handlers.

use std::net::SocketAddr;

use crate::connection::ResponseWriter;
use crate::protocol::{Fields, HeaderTable, Method, Version};

/// Everything known about one request, accumulated while parsing.
///
/// A context is built fresh for each keep-alive iteration and dropped after
/// the request is logged. Handlers receive it mutably: they read the parsed
/// request, write their response through [`RequestContext::response`], and
/// may set out-of-band flags such as [`RequestContext::set_keep_alive`].
pub struct RequestContext<'a> {
    pub method: Method,
    /// Percent-decoded path with the query string split off.
    pub path: String,
    /// Raw query string (undecoded), if any.
    pub query: Option<String>,
    pub version: Version,
    pub headers: HeaderTable,
    /// Virtual host from the Host header, lower-cased, port stripped.
    /// Empty when the client sent no Host header.
    pub host: String,
    pub remote_addr: SocketAddr,
    /// Decoded query and body fields.
    pub fields: Fields,
    /// Verbatim request line and header lines, captured for logging.
    pub raw_text: String,
    /// Outbound half of the connection.
    pub response: &'a mut ResponseWriter,
    keep_alive: bool,
}

impl<'a> RequestContext<'a> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        method: Method,
        path: String,
        query: Option<String>,
        version: Version,
        headers: HeaderTable,
        remote_addr: SocketAddr,
        raw_text: String,
        response: &'a mut ResponseWriter,
    ) -> Self {
        let host = headers.virtual_host().unwrap_or_default();
        Self {
            method,
            path,
            query,
            version,
            headers,
            host,
            remote_addr,
            fields: Fields::new(),
            raw_text,
            response,
            keep_alive: false,
        }
    }

    /// Asks the session to keep the connection open after this request.
    ///
    /// The session grants this only when the client also asked for
    /// keep-alive and the per-connection request limit is not yet reached.
    pub fn set_keep_alive(&mut self, keep_alive: bool) {
        self.keep_alive = keep_alive;
    }

    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }
}

impl std::fmt::Debug for RequestContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("query", &self.query)
            .field("version", &self.version)
            .field("host", &self.host)
            .field("remote_addr", &self.remote_addr)
            .field("keep_alive", &self.keep_alive)
            .finish_non_exhaustive()
    }
}
