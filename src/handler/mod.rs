//! The extension contract: pluggable request handlers, the ordered
//! virtual-host-scoped extension chain, and the named-service fallback.

use std::collections::HashMap;
use std::error::Error;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error};

use crate::protocol::RequestContext;

pub type BoxError = Box<dyn Error + Send + Sync>;

/// A pluggable request handler.
///
/// `Ok(true)` claims the request: the chain stops and the engine considers
/// the request answered (the handler writes through `ctx.response`).
/// `Ok(false)` declines it and the chain moves on. Errors are caught at the
/// dispatch boundary and turned into a 500 if nothing was sent yet.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(&self, ctx: &mut RequestContext<'_>) -> Result<bool, BoxError>;
}

/// Boxed future returned by function handlers; borrows the context.
pub type HandlerFuture<'a> = std::pin::Pin<Box<dyn std::future::Future<Output = Result<bool, BoxError>> + Send + 'a>>;

/// Adapter turning an async function into a [`RequestHandler`].
pub struct HandlerFn<F> {
    f: F,
}

#[async_trait]
impl<F> RequestHandler for HandlerFn<F>
where
    F: for<'a, 'b> Fn(&'a mut RequestContext<'b>) -> HandlerFuture<'a> + Send + Sync,
{
    async fn handle(&self, ctx: &mut RequestContext<'_>) -> Result<bool, BoxError> {
        (self.f)(ctx).await
    }
}

pub fn make_handler<F>(f: F) -> HandlerFn<F>
where
    F: for<'a, 'b> Fn(&'a mut RequestContext<'b>) -> HandlerFuture<'a> + Send + Sync,
{
    HandlerFn { f }
}

/// One chain entry: which virtual hosts it serves, and the handler.
struct Registration {
    host_pattern: String,
    handler: Arc<dyn RequestHandler>,
}

/// Ordered, virtual-host-scoped handler list plus the named-service table.
///
/// Registrations are tried strictly in registration order for the request's
/// host; the first handler to claim a request stops the chain. The chain is
/// read-only once the server starts, so dispatch needs no locking.
#[derive(Default)]
pub struct ExtensionChain {
    registrations: Vec<Registration>,
    named_services: HashMap<(String, String), Arc<dyn RequestHandler>>,
}

impl ExtensionChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for hosts matching `host_pattern`.
    ///
    /// Patterns: `*` matches every host, a leading `*.` matches any
    /// subdomain of the remainder, anything else is a case-insensitive
    /// exact match.
    pub fn register(&mut self, host_pattern: &str, handler: Arc<dyn RequestHandler>) {
        self.registrations.push(Registration { host_pattern: host_pattern.to_ascii_lowercase(), handler });
    }

    /// Registers a named service reachable only through the distinguished
    /// path suffix, looked up by exact (host, path).
    pub fn register_named(&mut self, host: &str, path: &str, handler: Arc<dyn RequestHandler>) {
        self.named_services.insert((host.to_ascii_lowercase(), path.to_string()), handler);
    }

    pub fn lookup_named(&self, host: &str, path: &str) -> Option<&Arc<dyn RequestHandler>> {
        self.named_services.get(&(host.to_ascii_lowercase(), path.to_string()))
    }

    /// Offers the request to each matching registration in order.
    ///
    /// Returns true once a handler claims it. Handler errors are caught
    /// here: they are logged with the raw request text and become a 500 if
    /// nothing was sent yet, and the request counts as claimed.
    pub async fn dispatch(&self, ctx: &mut RequestContext<'_>) -> bool {
        for registration in &self.registrations {
            if !host_matches(&registration.host_pattern, &ctx.host) {
                continue;
            }
            match registration.handler.handle(ctx).await {
                Ok(true) => return true,
                Ok(false) => continue,
                Err(e) => {
                    error!(cause = %e, raw_request = %ctx.raw_text, "handler failed");
                    if !ctx.response.response_started() {
                        let _ = ctx.response.send_status(500, &[]).await;
                    }
                    return true;
                }
            }
        }
        debug!(host = %ctx.host, path = %ctx.path, "no extension claimed the request");
        false
    }

    /// Invokes the named service for (host, path) once, outside the chain.
    pub async fn dispatch_named(&self, ctx: &mut RequestContext<'_>) -> bool {
        let Some(handler) = self.lookup_named(&ctx.host, &ctx.path) else {
            return false;
        };
        match Arc::clone(handler).handle(ctx).await {
            Ok(claimed) => claimed,
            Err(e) => {
                error!(cause = %e, raw_request = %ctx.raw_text, "named service failed");
                if !ctx.response.response_started() {
                    let _ = ctx.response.send_status(500, &[]).await;
                }
                true
            }
        }
    }
}

impl std::fmt::Debug for ExtensionChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionChain")
            .field("registrations", &self.registrations.len())
            .field("named_services", &self.named_services.len())
            .finish()
    }
}

/// Virtual-host pattern match; `host` is already lower-cased.
fn host_matches(pattern: &str, host: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if let Some(suffix) = pattern.strip_prefix("*.") {
        return host.strip_suffix(suffix).is_some_and(|prefix| prefix.ends_with('.'));
    }
    pattern == host
}
