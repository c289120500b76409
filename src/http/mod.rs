//! HTTP protocol layer module
//!
//! Request snapshot and incrementally-built response types shared by the
//! CORS negotiator, the dispatcher, and the resource handlers.

pub mod exchange;
pub mod response;

// Re-export commonly used types
pub use exchange::{Exchange, RequestParts};
pub use response::{build_bad_request_response, build_payload_too_large_response};
