//! Connection lifecycle: the response writer state machine, the per-request
//! access records, and the session loop that ties them together.

mod log;
mod response_writer;
mod session;

pub use log::{AccessLog, LogRecord, Outcome, TracingAccessLog};
pub use response_writer::{ResponseState, ResponseWriter};
pub use session::Session;
