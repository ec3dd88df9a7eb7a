//! Protocol-level types: errors, methods and versions, the header table,
//! decoded form fields, the canned status table and the request context.

mod error;
mod fields;
mod headers;
mod method;
mod request;
pub mod status;

pub use error::{HttpError, ParseError, SendError};
pub use fields::{Attachment, FieldValue, Fields};
pub use headers::HeaderTable;
pub use method::{Method, Version};
pub use request::RequestContext;
