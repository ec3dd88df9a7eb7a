//! The accept loop, server configuration, and the process-wide connection
//! counter.

use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use crate::connection::{AccessLog, Session, TracingAccessLog};
use crate::handler::{ExtensionChain, RequestHandler};

/// Process-wide count of live connections, diagnostics only.
static ACTIVE_CONNECTIONS: AtomicUsize = AtomicUsize::new(0);

/// Number of connections currently being served by this process.
pub fn active_connections() -> usize {
    ACTIVE_CONNECTIONS.load(Ordering::Relaxed)
}

/// RAII increment of the connection counter.
struct ConnectionGuard;

impl ConnectionGuard {
    fn acquire() -> Self {
        ACTIVE_CONNECTIONS.fetch_add(1, Ordering::Relaxed);
        ConnectionGuard
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        ACTIVE_CONNECTIONS.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Externally supplied limits and timeouts consumed by the core.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Deadline for the first byte of the first request.
    pub initial_timeout: Duration,
    /// Deadline for every read after that, including the wait for the next
    /// keep-alive request.
    pub persistent_timeout: Duration,
    pub max_request_line_bytes: usize,
    pub max_header_field_bytes: usize,
    /// Ceiling for captured (multipart) bodies, also the 100-continue check.
    pub max_multipart_bytes: usize,
    /// Requests served on one connection before it is closed.
    pub request_limit: usize,
    /// Refuse versions other than HTTP/1.0 and HTTP/1.1 with 505 instead of
    /// tolerating them as 1.0.
    pub strict_version_only: bool,
    /// Buffer handler output so a Content-Length can be computed at close.
    pub buffer_responses: bool,
    /// Path suffix routed to named services when no extension claims the
    /// request.
    pub service_suffix: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            initial_timeout: Duration::from_secs(30),
            persistent_timeout: Duration::from_secs(15),
            max_request_line_bytes: 8192,
            max_header_field_bytes: 8192,
            max_multipart_bytes: 4 * 1024 * 1024,
            request_limit: 25,
            strict_version_only: false,
            buffer_responses: true,
            service_suffix: ".agent".to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ServerBuildError {
    #[error("address must be set")]
    MissingAddress,
    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

pub struct ServerBuilder {
    address: Option<Vec<SocketAddr>>,
    config: ServerConfig,
    chain: ExtensionChain,
    access_log: Arc<dyn AccessLog>,
}

impl ServerBuilder {
    fn new() -> Self {
        Self {
            address: None,
            config: ServerConfig::default(),
            chain: ExtensionChain::new(),
            access_log: Arc::new(TracingAccessLog),
        }
    }

    pub fn address<A: ToSocketAddrs>(mut self, address: A) -> Self {
        self.address = address.to_socket_addrs().ok().map(|addrs| addrs.collect());
        self
    }

    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Appends an extension for hosts matching `host_pattern`; dispatch
    /// order is registration order.
    pub fn extension(mut self, host_pattern: &str, handler: Arc<dyn RequestHandler>) -> Self {
        self.chain.register(host_pattern, handler);
        self
    }

    pub fn named_service(mut self, host: &str, path: &str, handler: Arc<dyn RequestHandler>) -> Self {
        self.chain.register_named(host, path, handler);
        self
    }

    pub fn access_log(mut self, access_log: Arc<dyn AccessLog>) -> Self {
        self.access_log = access_log;
        self
    }

    pub fn build(self) -> Result<Server, ServerBuildError> {
        let address = self.address.ok_or(ServerBuildError::MissingAddress)?;
        Ok(Server {
            address,
            config: Arc::new(self.config),
            chain: Arc::new(self.chain),
            access_log: self.access_log,
        })
    }
}

pub struct Server {
    address: Vec<SocketAddr>,
    config: Arc<ServerConfig>,
    chain: Arc<ExtensionChain>,
    access_log: Arc<dyn AccessLog>,
}

impl Server {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Binds and serves until the process exits. One task per connection;
    /// the registered chain is read-only from here on.
    pub async fn start(self) {
        let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
        if tracing::subscriber::set_global_default(subscriber).is_err() {
            warn!("a global tracing subscriber is already installed");
        }

        info!("start listening at {:?}", self.address);
        let tcp_listener = match TcpListener::bind(self.address.as_slice()).await {
            Ok(tcp_listener) => tcp_listener,
            Err(e) => {
                error!(cause = %e, "bind server error");
                return;
            }
        };

        loop {
            let (tcp_stream, remote_addr) = match tcp_listener.accept().await {
                Ok(stream_and_addr) => stream_and_addr,
                Err(e) => {
                    warn!(cause = %e, "failed to accept");
                    continue;
                }
            };

            let config = Arc::clone(&self.config);
            let chain = Arc::clone(&self.chain);
            let access_log = Arc::clone(&self.access_log);

            tokio::spawn(async move {
                let _guard = ConnectionGuard::acquire();
                let (reader, writer) = tcp_stream.into_split();
                let session = Session::new(reader, Box::new(writer), remote_addr, config, chain, access_log);
                session.process().await;
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_limits() {
        let config = ServerConfig::default();
        assert_eq!(config.max_request_line_bytes, 8192);
        assert_eq!(config.request_limit, 25);
        assert_eq!(config.service_suffix, ".agent");
        assert!(!config.strict_version_only);
    }

    #[test]
    fn connection_guard_counts() {
        let before = active_connections();
        {
            let _guard = ConnectionGuard::acquire();
            assert_eq!(active_connections(), before + 1);
        }
        assert_eq!(active_connections(), before);
    }
}
