//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! RequestMessage
//!     → request.rs (+ multipart.rs) → exact request bytes
//!     → client.rs → net::socket one-shot exchange
//!     → response.rs → ParsedResponse (Valid | Invalid)
//!     → HttpExchange handed back to the caller
//! ```

pub mod client;
pub mod multipart;
pub mod request;
pub mod response;

pub use client::{send, HttpExchange};
pub use request::{build_request, RequestMessage};
pub use response::{parse_response, HeaderMap, HeaderValue, ParsedResponse, ResponseMessage};
