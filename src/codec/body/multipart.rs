//! `multipart/form-data` decoding.
//!
//! The whole body is captured up front (the session enforces the multipart
//! size ceiling before reading), then scanned boundary by boundary. Each
//! part needs a `Content-Disposition: form-data; name="..."` header; a
//! `filename` directive turns the part into an attachment. The convention
//! for an *empty* filename is that the browser submitted a file input with
//! no file chosen, and the field is dropped entirely.

use bytes::Bytes;
use tracing::trace;

use crate::protocol::{Attachment, Fields, ParseError};
use crate::utils::ensure;

/// Extracts the boundary parameter from a `multipart/form-data` content type.
pub fn boundary_of(content_type: &str) -> Option<String> {
    let idx = content_type.to_ascii_lowercase().find("boundary=")?;
    let rest = &content_type[idx + "boundary=".len()..];
    let rest = rest.split(';').next().unwrap_or(rest).trim();
    let boundary = rest.trim_matches('"');
    if boundary.is_empty() {
        None
    } else {
        Some(boundary.to_string())
    }
}

/// Decodes a multipart body into `fields`.
pub fn parse_multipart(body: &Bytes, boundary: &str, fields: &mut Fields) -> Result<(), ParseError> {
    ensure!(!boundary.is_empty(), ParseError::invalid_body("empty multipart boundary"));
    let delimiter = format!("--{boundary}");
    let delimiter = delimiter.as_bytes();

    let mut pos = find(delimiter, body).ok_or_else(|| ParseError::invalid_body("multipart body has no boundary"))?;

    loop {
        pos += delimiter.len();
        let rest = &body[pos..];
        if rest.starts_with(b"--") {
            // closing delimiter
            return Ok(());
        }
        // skip the line break after the delimiter
        let skip = if rest.starts_with(b"\r\n") {
            2
        } else if rest.starts_with(b"\n") {
            1
        } else {
            return Err(ParseError::invalid_body("malformed multipart delimiter line"));
        };
        pos += skip;

        let next = match find(delimiter, &body[pos..]) {
            Some(offset) => pos + offset,
            None => return Err(ParseError::invalid_body("multipart body misses closing boundary")),
        };

        // the part ends just before the line break preceding the next delimiter
        let mut end = next;
        if end >= 1 && body[end - 1] == b'\n' {
            end -= 1;
            if end >= 1 && body[end - 1] == b'\r' {
                end -= 1;
            }
        }

        decode_part(&body.slice(pos..end), fields)?;
        pos = next;
    }
}

/// Decodes one part: headers up to the blank line, then verbatim data.
fn decode_part(part: &Bytes, fields: &mut Fields) -> Result<(), ParseError> {
    let (header_end, data_start) = match find(b"\r\n\r\n", part) {
        Some(idx) => (idx, idx + 4),
        None => match find(b"\n\n", part) {
            Some(idx) => (idx, idx + 2),
            None => return Err(ParseError::invalid_body("multipart part misses header terminator")),
        },
    };

    let mut name = None;
    let mut filename = None;
    let mut content_type = None;

    let header_text = String::from_utf8_lossy(&part[..header_end]);
    for line in header_text.lines() {
        let Some((header_name, value)) = line.split_once(':') else { continue };
        let value = value.trim();
        match header_name.to_ascii_lowercase().as_str() {
            "content-disposition" => {
                name = quoted_directive(value, "name");
                filename = quoted_directive(value, "filename");
            }
            "content-type" => content_type = Some(value.to_string()),
            _ => {}
        }
    }

    let Some(name) = name else {
        trace!("skipping multipart part without a form-data name");
        return Ok(());
    };
    let data = part.slice(data_start..);

    match filename {
        // a present but empty filename means no file was chosen: drop the field
        Some(filename) if filename.is_empty() => Ok(()),
        Some(filename) => {
            fields.add_attachment(&name, Attachment { filename, content_type, data });
            Ok(())
        }
        None => {
            let is_text = match &content_type {
                Some(ct) => ct.trim_start().to_ascii_lowercase().starts_with("text"),
                None => true,
            };
            if is_text {
                let text = data.iter().map(|&b| b as char).collect::<String>();
                fields.add_text(&name, text);
            } else {
                fields.add_attachment(&name, Attachment { filename: String::new(), content_type, data });
            }
            Ok(())
        }
    }
}

/// Pulls a quoted `key="value"` directive out of a Content-Disposition value.
fn quoted_directive(value: &str, key: &str) -> Option<String> {
    for piece in value.split(';') {
        let piece = piece.trim();
        if let Some(rest) = piece.strip_prefix(key) {
            if let Some(rest) = rest.trim_start().strip_prefix('=') {
                return Some(rest.trim().trim_matches('"').to_string());
            }
        }
    }
    None
}

/// First occurrence of `needle` in `haystack`.
fn find(needle: &[u8], haystack: &[u8]) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|window| window == needle)
}
