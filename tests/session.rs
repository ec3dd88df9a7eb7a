//! End-to-end session tests over an in-memory duplex transport.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use ember_http::connection::{AccessLog, LogRecord, Outcome, Session};
use ember_http::handler::{BoxError, ExtensionChain, RequestHandler};
use ember_http::protocol::{FieldValue, RequestContext};
use ember_http::server::ServerConfig;

#[derive(Default)]
struct CaptureLog {
    records: Mutex<Vec<LogRecord>>,
}

impl AccessLog for CaptureLog {
    fn log(&self, record: &LogRecord) {
        self.records.lock().unwrap().push(record.clone());
    }
}

impl CaptureLog {
    fn take(&self) -> Vec<LogRecord> {
        std::mem::take(&mut self.records.lock().unwrap())
    }
}

fn remote() -> SocketAddr {
    "192.0.2.7:4711".parse().unwrap()
}

/// Feeds `input` to a session and returns (response bytes, access records).
async fn drive(input: &[u8], config: ServerConfig, chain: ExtensionChain) -> (Vec<u8>, Vec<LogRecord>) {
    let (mut client, server) = tokio::io::duplex(256 * 1024);
    let (read_half, write_half) = tokio::io::split(server);
    let log = Arc::new(CaptureLog::default());

    let session = Session::new(
        read_half,
        Box::new(write_half),
        remote(),
        Arc::new(config),
        Arc::new(chain),
        Arc::clone(&log) as Arc<dyn AccessLog>,
    );
    let task = tokio::spawn(session.process());

    client.write_all(input).await.unwrap();
    client.shutdown().await.unwrap();

    let mut response = Vec::new();
    client.read_to_end(&mut response).await.unwrap();
    task.await.unwrap();

    (response, log.take())
}

struct KeepAliveGreeter;

#[async_trait]
impl RequestHandler for KeepAliveGreeter {
    async fn handle(&self, ctx: &mut RequestContext<'_>) -> Result<bool, BoxError> {
        ctx.set_keep_alive(true);
        ctx.response.print("hi").await?;
        Ok(true)
    }
}

struct OwnHeader(&'static str);

#[async_trait]
impl RequestHandler for OwnHeader {
    async fn handle(&self, ctx: &mut RequestContext<'_>) -> Result<bool, BoxError> {
        ctx.response.print(self.0).await?;
        Ok(true)
    }
}

struct Decliner;

#[async_trait]
impl RequestHandler for Decliner {
    async fn handle(&self, _ctx: &mut RequestContext<'_>) -> Result<bool, BoxError> {
        Ok(false)
    }
}

struct Failing;

#[async_trait]
impl RequestHandler for Failing {
    async fn handle(&self, _ctx: &mut RequestContext<'_>) -> Result<bool, BoxError> {
        Err("boom".into())
    }
}

struct FieldEcho;

#[async_trait]
impl RequestHandler for FieldEcho {
    async fn handle(&self, ctx: &mut RequestContext<'_>) -> Result<bool, BoxError> {
        let mut lines = Vec::new();
        for (name, value) in ctx.fields.iter() {
            match value {
                FieldValue::Text(text) => lines.push(format!("{name}={text}")),
                FieldValue::List(list) => lines.push(format!("{name}=[{}]", list.join(","))),
                FieldValue::Attachment(attachment) => lines.push(format!(
                    "{name}@{}:{}",
                    attachment.filename,
                    String::from_utf8_lossy(&attachment.data)
                )),
            }
        }
        let body = lines.join(";");
        ctx.response.print(&body).await?;
        Ok(true)
    }
}

#[tokio::test]
async fn unclaimed_request_gets_404_and_connection_closes() {
    let input = b"GET /missing.agent HTTP/1.1\r\nHost: example.com\r\nConnection: keep-alive\r\n\r\n";
    let (response, records) = drive(input, ServerConfig::default(), ExtensionChain::new()).await;

    let text = String::from_utf8_lossy(&response);
    assert!(text.starts_with("HTTP/1.1 404 Not Found\r\n"), "got: {text}");

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].outcome, Outcome::NormalSuccess);
    assert_eq!(records[0].status, Some(404));
    assert_eq!(records[0].path.as_deref(), Some("/missing.agent"));
}

#[tokio::test]
async fn oversized_request_line_gets_414_and_overflow_record() {
    let mut input = vec![b'a'; 9000];
    input.extend_from_slice(b"\r\n");
    let (response, records) = drive(&input, ServerConfig::default(), ExtensionChain::new()).await;

    let text = String::from_utf8_lossy(&response);
    assert!(text.starts_with("HTTP/1.1 414 URI Too Long\r\n"), "got: {text}");

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].outcome, Outcome::Overflowed);
    assert_eq!(records[0].status, Some(414));
}

#[tokio::test]
async fn request_limit_bounds_keep_alive() {
    let request = b"GET / HTTP/1.1\r\nHost: a\r\nConnection: keep-alive\r\n\r\n";
    let mut input = Vec::new();
    for _ in 0..3 {
        input.extend_from_slice(request);
    }

    let mut chain = ExtensionChain::new();
    chain.register("*", Arc::new(KeepAliveGreeter));
    let config = ServerConfig { request_limit: 2, ..Default::default() };

    let (response, records) = drive(&input, config, chain).await;
    let text = String::from_utf8_lossy(&response);

    // exactly two requests served, then close, despite a third pipelined one
    assert_eq!(text.matches("HTTP/1.1 200 OK").count(), 2, "got: {text}");
    assert_eq!(records.len(), 2);

    let second = &text[text.len() / 2..];
    assert!(text.contains("Keep-Alive: timeout=15, max=1"), "got: {text}");
    assert!(second.contains("Keep-Alive: timeout=15, max=0"), "got: {second}");
}

#[tokio::test]
async fn head_response_is_truncated_to_header_block() {
    let payload = "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n\r\nbodytext";

    let mut chain = ExtensionChain::new();
    chain.register("*", Arc::new(OwnHeader(payload)));
    let (response, _) = drive(b"HEAD / HTTP/1.1\r\nHost: a\r\n\r\n", ServerConfig::default(), chain).await;

    let text = String::from_utf8_lossy(&response);
    assert!(text.contains("Content-Length: 8\r\n"), "got: {text}");
    assert!(text.ends_with("\r\n\r\n"), "body must be discarded: {text}");

    let mut chain = ExtensionChain::new();
    chain.register("*", Arc::new(OwnHeader(payload)));
    let (response, _) = drive(b"GET / HTTP/1.1\r\nHost: a\r\n\r\n", ServerConfig::default(), chain).await;

    let text = String::from_utf8_lossy(&response);
    assert!(text.contains("Content-Length: 8\r\n"), "got: {text}");
    assert!(text.ends_with("\r\n\r\nbodytext"), "got: {text}");
}

#[tokio::test]
async fn unservable_method_gets_405() {
    let (response, _) = drive(b"DELETE /x HTTP/1.1\r\nHost: a\r\n\r\n", ServerConfig::default(), ExtensionChain::new()).await;
    assert!(String::from_utf8_lossy(&response).starts_with("HTTP/1.1 405 Method Not Allowed\r\n"));
}

#[tokio::test]
async fn octet_stream_without_length_gets_411() {
    let input = b"POST /up HTTP/1.0\r\nHost: a\r\nContent-Type: application/octet-stream\r\n\r\n";
    let (response, _) = drive(input, ServerConfig::default(), ExtensionChain::new()).await;
    assert!(String::from_utf8_lossy(&response).starts_with("HTTP/1.1 411 Length Required\r\n"));
}

#[tokio::test]
async fn unsupported_content_type_gets_415() {
    let input = b"POST /up HTTP/1.0\r\nHost: a\r\nContent-Type: application/json\r\nContent-Length: 2\r\n\r\n{}";
    let (response, _) = drive(input, ServerConfig::default(), ExtensionChain::new()).await;
    assert!(String::from_utf8_lossy(&response).starts_with("HTTP/1.1 415 Unsupported Media Type\r\n"));
}

#[tokio::test]
async fn query_and_body_fields_coexist_and_collide_into_lists() {
    let body = "x=2&y=hello+world";
    let input = format!(
        "POST /submit?x=1 HTTP/1.0\r\nHost: a\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        body
    );

    let mut chain = ExtensionChain::new();
    chain.register("*", Arc::new(FieldEcho));
    let (response, _) = drive(input.as_bytes(), ServerConfig::default(), chain).await;

    let text = String::from_utf8_lossy(&response);
    assert!(text.contains("x=[1,2]"), "got: {text}");
    assert!(text.contains("y=hello world"), "got: {text}");
}

#[tokio::test]
async fn multipart_upload_produces_attachment() {
    let body = "--B\r\nContent-Disposition: form-data; name=\"f\"; filename=\"x.txt\"\r\nContent-Type: text/plain\r\n\r\nhi\r\n--B--\r\n";
    let input = format!(
        "POST /upload HTTP/1.0\r\nHost: a\r\nContent-Type: multipart/form-data; boundary=B\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        body
    );

    let mut chain = ExtensionChain::new();
    chain.register("*", Arc::new(FieldEcho));
    let (response, _) = drive(input.as_bytes(), ServerConfig::default(), chain).await;

    assert!(String::from_utf8_lossy(&response).contains("f@x.txt:hi"));
}

#[tokio::test]
async fn expect_continue_gets_interim_status() {
    let input = b"POST / HTTP/1.1\r\nHost: a\r\nExpect: 100-continue\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: 3\r\n\r\na=b";

    let mut chain = ExtensionChain::new();
    chain.register("*", Arc::new(FieldEcho));
    let (response, _) = drive(input, ServerConfig::default(), chain).await;

    let text = String::from_utf8_lossy(&response);
    assert!(text.starts_with("HTTP/1.1 100 Continue\r\n\r\n"), "got: {text}");
    assert!(text.contains("a=b"), "got: {text}");
}

#[tokio::test]
async fn proactive_interim_status_when_body_lags() {
    let (mut client, server) = tokio::io::duplex(1024);
    let (read_half, write_half) = tokio::io::split(server);
    let log = Arc::new(CaptureLog::default());

    let mut chain = ExtensionChain::new();
    chain.register("*", Arc::new(FieldEcho));
    let session = Session::new(
        read_half,
        Box::new(write_half),
        remote(),
        Arc::new(ServerConfig::default()),
        Arc::new(chain),
        Arc::clone(&log) as Arc<dyn AccessLog>,
    );
    let task = tokio::spawn(session.process());

    // headers only; the body follows once the interim status arrives
    client
        .write_all(b"POST / HTTP/1.1\r\nHost: a\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: 3\r\n\r\n")
        .await
        .unwrap();

    let mut interim = [0u8; 25];
    client.read_exact(&mut interim).await.unwrap();
    assert_eq!(&interim[..], b"HTTP/1.1 100 Continue\r\n\r\n");

    client.write_all(b"a=b").await.unwrap();
    client.shutdown().await.unwrap();

    let mut response = Vec::new();
    client.read_to_end(&mut response).await.unwrap();
    task.await.unwrap();

    assert!(String::from_utf8_lossy(&response).contains("a=b"));
}

#[tokio::test]
async fn oversized_expectation_is_refused_with_417() {
    let config = ServerConfig { max_multipart_bytes: 16, ..Default::default() };
    let input = b"POST / HTTP/1.1\r\nHost: a\r\nExpect: 100-continue\r\nContent-Length: 999\r\n\r\n";
    let (response, _) = drive(input, config, ExtensionChain::new()).await;
    assert!(String::from_utf8_lossy(&response).starts_with("HTTP/1.1 417 Expectation Failed\r\n"));
}

#[tokio::test]
async fn strict_mode_refuses_unknown_versions() {
    let config = ServerConfig { strict_version_only: true, ..Default::default() };
    let (response, records) = drive(b"GET / HTTP/2.0\r\nHost: a\r\n\r\n", config, ExtensionChain::new()).await;

    assert!(String::from_utf8_lossy(&response).starts_with("HTTP/1.1 505 HTTP Version Not Supported\r\n"));
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].outcome, Outcome::Refused);
}

#[tokio::test]
async fn failing_handler_becomes_500_with_one_record() {
    let mut chain = ExtensionChain::new();
    chain.register("*", Arc::new(Failing));
    let (response, records) = drive(b"GET / HTTP/1.1\r\nHost: a\r\n\r\n", ServerConfig::default(), chain).await;

    assert!(String::from_utf8_lossy(&response).starts_with("HTTP/1.1 500 Internal Server Error\r\n"));
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, Some(500));
}

#[tokio::test]
async fn chain_order_first_claim_wins() {
    let mut chain = ExtensionChain::new();
    chain.register("other.example", Arc::new(OwnHeader("HTTP/1.1 302 Found\r\n\r\n")));
    chain.register("*", Arc::new(Decliner));
    chain.register("*", Arc::new(OwnHeader("HTTP/1.1 204 No Content\r\n\r\n")));
    chain.register("*", Arc::new(OwnHeader("HTTP/1.1 302 Found\r\n\r\n")));

    let (response, _) = drive(b"GET / HTTP/1.1\r\nHost: a\r\n\r\n", ServerConfig::default(), chain).await;
    assert!(String::from_utf8_lossy(&response).starts_with("HTTP/1.1 204"));
}

#[tokio::test]
async fn named_service_claims_distinguished_suffix() {
    let mut chain = ExtensionChain::new();
    chain.register_named("example.com", "/svc.agent", Arc::new(OwnHeader("HTTP/1.1 200 OK\r\n\r\nnamed")));

    let input = b"GET /svc.agent HTTP/1.1\r\nHost: example.com\r\n\r\n";
    let (response, _) = drive(input, ServerConfig::default(), chain).await;
    let text = String::from_utf8_lossy(&response);
    assert!(text.starts_with("HTTP/1.1 200 OK"), "got: {text}");
    assert!(text.contains("named"), "got: {text}");
}

#[tokio::test]
async fn eof_before_any_request_logs_no_response() {
    let (response, records) = drive(b"", ServerConfig::default(), ExtensionChain::new()).await;
    assert!(response.is_empty());
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].outcome, Outcome::NoResponseSent);
    assert_eq!(records[0].status, None);
}

#[tokio::test]
async fn idle_connection_times_out() {
    let (client, server) = tokio::io::duplex(1024);
    let (read_half, write_half) = tokio::io::split(server);
    let log = Arc::new(CaptureLog::default());
    let config = ServerConfig { initial_timeout: Duration::from_millis(50), ..Default::default() };

    let session = Session::new(
        read_half,
        Box::new(write_half),
        remote(),
        Arc::new(config),
        Arc::new(ExtensionChain::new()),
        Arc::clone(&log) as Arc<dyn AccessLog>,
    );
    // the client never sends a byte and never closes
    tokio::spawn(session.process()).await.unwrap();
    drop(client);

    let records = log.take();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].outcome, Outcome::TimedOut);
}
