//! Request body decoding strategies, chosen from Content-Type and
//! Content-Length after the header section is parsed.

mod multipart;
mod urlencoded;

pub use multipart::{boundary_of, parse_multipart};
pub use urlencoded::{parse_urlencoded, percent_decode, percent_encode};
