//! Canned status responses.
//!
//! Collaborators select a numeric status; the core supplies the reason phrase
//! and a small HTML body. The table covers every status the engine itself can
//! emit plus the redirect family extensions commonly ask for.

/// Returns the reason phrase for a status the engine knows how to send.
pub fn reason(status: u16) -> &'static str {
    match status {
        100 => "Continue",
        200 => "OK",
        301 => "Moved Permanently",
        302 => "Found",
        304 => "Not Modified",
        400 => "Bad Request",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        411 => "Length Required",
        413 => "Content Too Large",
        414 => "URI Too Long",
        415 => "Unsupported Media Type",
        417 => "Expectation Failed",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        504 => "Gateway Timeout",
        505 => "HTTP Version Not Supported",
        _ => "Unknown",
    }
}

/// Returns the canned HTML body for an error or redirect status.
///
/// Interim (1xx) and not-modified (304) responses get an empty body.
pub fn canned_body(status: u16) -> String {
    match status {
        100 | 304 => String::new(),
        _ => format!(
            "<html><head><title>{status} {reason}</title></head>\
             <body><h1>{status} {reason}</h1></body></html>\n",
            status = status,
            reason = reason(status)
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_covers_engine_statuses() {
        for status in [100, 200, 301, 302, 304, 400, 403, 404, 405, 411, 413, 414, 415, 417, 500, 502, 504, 505] {
            assert_ne!(reason(status), "Unknown", "missing reason for {status}");
        }
    }

    #[test]
    fn canned_body_mentions_status() {
        let body = canned_body(404);
        assert!(body.contains("404"));
        assert!(body.contains("Not Found"));
        assert!(canned_body(304).is_empty());
    }
}
