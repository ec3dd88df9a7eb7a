//! Byte-level reading of the wire protocol: the bounded line reader, the
//! header section reader and the body decoders.

pub mod body;
mod header_reader;
mod line_reader;

pub use header_reader::read_header_table;
pub use line_reader::{LineReader, RawLine};

pub(crate) use line_reader::OVERFLOW_SENTINEL;
