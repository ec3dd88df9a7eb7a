//! Header section reading.

use tokio::io::AsyncRead;
use tracing::trace;

use crate::codec::line_reader::{LineReader, RawLine};
use crate::protocol::HeaderTable;

/// Reads the header section of a request.
///
/// Each line is bounded by `max_field_bytes`. A line starting with space or
/// tab continues the previous header value, joined with one space; the folded
/// value is re-checked against the budget. A non-continuation line is split
/// at the first colon; lines without a colon are silently dropped. Reading
/// stops at the blank line, end of stream, or overflow.
///
/// Returns the table plus an `overflowed` flag; on overflow the caller must
/// stop parsing, answer with an error and close the connection.
pub async fn read_header_table<R>(
    reader: &mut LineReader<R>,
    max_field_bytes: usize,
    raw_text: &mut String,
) -> std::io::Result<(HeaderTable, bool)>
where
    R: AsyncRead + Unpin,
{
    let mut table = HeaderTable::new();

    loop {
        match reader.read_line(max_field_bytes).await? {
            RawLine::Line(line) => {
                if line.is_empty() {
                    return Ok((table, false));
                }
                raw_text.push_str(&line);
                raw_text.push('\n');

                if line.starts_with(' ') || line.starts_with('\t') {
                    if let Some(folded_len) = table.fold_into_last(&line) {
                        if folded_len > max_field_bytes {
                            trace!(folded_len, "folded header exceeds field budget");
                            return Ok((table, true));
                        }
                    }
                    continue;
                }

                match line.split_once(':') {
                    Some((name, value)) => table.insert(name, value),
                    // intentional laxity: malformed lines are dropped
                    None => trace!(line = %line, "dropping header line without a colon"),
                }
            }
            RawLine::Eof => return Ok((table, false)),
            RawLine::Overflow(prefix) => {
                raw_text.push_str(super::line_reader::OVERFLOW_SENTINEL);
                raw_text.push_str(&prefix);
                raw_text.push('\n');
                return Ok((table, true));
            }
        }
    }
}
