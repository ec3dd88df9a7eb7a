//! An embeddable asynchronous HTTP/1.1 server core
//!
//! This crate owns the lifecycle of a client connection from accept to close:
//! it parses the wire protocol itself, byte by byte, and dispatches parsed
//! requests to pluggable extension handlers. It is built on tokio and keeps
//! the model deliberately simple: one task per connection, strictly
//! sequential requests within a connection, every read bounded by the
//! session's current deadline.
//!
//! # Features
//!
//! - HTTP/1.0 and HTTP/1.1 framing, tolerant of bare LF
//! - Bounded request-line and header reads with overflow detection
//! - Header folding and repeated-header merging
//! - Three body decoders: url-encoded, multipart/form-data, raw octet-stream
//! - Expect/100-continue handling
//! - Keep-alive bounded by a request limit and per-phase timeouts
//! - A response writer that either passes a handler-written header through
//!   or synthesizes one, and can buffer output to compute Content-Length
//! - An ordered, virtual-host-scoped extension chain with a named-service
//!   fallback for a distinguished path suffix
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ember_http::handler::{make_handler, HandlerFuture};
//! use ember_http::protocol::RequestContext;
//! use ember_http::server::Server;
//!
//! fn hello<'a>(ctx: &'a mut RequestContext<'_>) -> HandlerFuture<'a> {
//!     Box::pin(async move {
//!         ctx.set_keep_alive(true);
//!         ctx.response.println("Hello World!").await?;
//!         Ok(true)
//!     })
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let server = Server::builder()
//!         .address("127.0.0.1:8080")
//!         .extension("*", Arc::new(make_handler(hello)))
//!         .build()
//!         .expect("server builder");
//!
//!     server.start().await;
//! }
//! ```
//!
//! # Architecture
//!
//! - [`codec`]: byte-level reading (bounded line reader, body decoders)
//! - [`protocol`]: protocol types (headers, fields, errors, status table)
//! - [`connection`]: response writer state machine and the session loop
//! - [`handler`]: the extension contract
//! - [`server`]: the accept loop and configuration
//!
//! # Limitations
//!
//! - No HTTP/2 or HTTP/3
//! - No chunked request bodies and no request pipelining
//! - No TLS (acquire the socket elsewhere and hand it to the session)

pub mod codec;
pub mod connection;
pub mod handler;
pub mod protocol;
pub mod server;

mod utils;

/// Server token used in synthesized and canned response headers.
pub const SERVER_TOKEN: &str = concat!("ember-http/", env!("CARGO_PKG_VERSION"));

/// Current time formatted for the Date response header.
pub(crate) fn http_date() -> String {
    let mut buf = faf_http_date::get_date_buff_no_key();
    faf_http_date::get_date_no_key(&mut buf);
    String::from_utf8_lossy(&buf).into_owned()
}
