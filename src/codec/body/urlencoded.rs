//! `application/x-www-form-urlencoded` decoding.
//!
//! Also supplies the percent-decoding helper used for request paths and the
//! query string, so query and body parameters share one decode path and land
//! in the same field table.

use crate::protocol::Fields;

/// Percent-decodes a string. `plus_as_space` additionally maps `+` to a
/// space, which applies to form data and query strings but not to paths.
pub fn percent_decode(input: &str, plus_as_space: bool) -> String {
    let bytes = input.as_bytes();
    let mut out = String::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' if plus_as_space => {
                out.push(' ');
                i += 1;
            }
            b'%' => match hex_pair(bytes.get(i + 1).copied(), bytes.get(i + 2).copied()) {
                Some(byte) => {
                    out.push(byte as char);
                    i += 3;
                }
                None => {
                    out.push('%');
                    i += 1;
                }
            },
            byte => {
                out.push(byte as char);
                i += 1;
            }
        }
    }
    out
}

/// Percent-encodes a string for round-tripping in tests and redirects.
/// Spaces become `+`.
pub fn percent_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            ' ' => out.push('+'),
            'A'..='Z' | 'a'..='z' | '0'..='9' | '-' | '_' | '.' | '*' => out.push(ch),
            ch => {
                let code = ch as u32;
                // chars above 0xff came from 8-bit-clean decoding and fit one byte each
                out.push_str(&format!("%{:02X}", code & 0xff));
            }
        }
    }
    out
}

fn hex_pair(high: Option<u8>, low: Option<u8>) -> Option<u8> {
    let high = (high? as char).to_digit(16)?;
    let low = (low? as char).to_digit(16)?;
    Some((high * 16 + low) as u8)
}

/// Decodes an url-encoded parameter string into `fields`.
///
/// Splits on `&` then `=`; both key and value are percent- and plus-decoded.
/// A repeated key converts the field into an ordered list and appends. Empty
/// segments (from `a=1&&b=2` or a trailing `&`) are skipped.
pub fn parse_urlencoded(input: &str, fields: &mut Fields) {
    for pair in input.split('&') {
        if pair.is_empty() {
            continue;
        }
        let (key, value) = match pair.split_once('=') {
            Some((key, value)) => (key, value),
            None => (pair, ""),
        };
        let key = percent_decode(key, true);
        if key.is_empty() {
            continue;
        }
        fields.add_text(&key, percent_decode(value, true));
    }
}
