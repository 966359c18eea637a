//! wireprobe: raw-socket HTTP/1.1 and WebSocket client for security testing.
//!
//! Every byte on the wire is built here by hand: no HTTP library sits between
//! the caller's headers, paths and filenames and the socket.
//!
//! # Architecture Overview
//!
//! ```text
//!   http::client ──► http::request (+ multipart) ──► net::socket (one-shot)
//!                                                         │
//!                    http::response ◄─────────────────────┘
//!
//!   websocket::session ──► net::socket (persistent)
//!           │                 ├─► websocket::tunnel     (CONNECT, optional)
//!           │                 └─► websocket::handshake  (Upgrade / Accept)
//!           └─► websocket::buffer ──► websocket::frame ──► SessionEvent
//!
//!   cross-cutting: config, error, resilience::timeouts, observability
//! ```

// Core subsystems
pub mod http;
pub mod net;
pub mod websocket;

// Cross-cutting concerns
pub mod config;
pub mod error;
pub mod observability;
pub mod resilience;

pub use config::{Endpoint, ProbeConfig, ProxyConfig, Target};
pub use error::{ErrorKind, ProbeError, ProbeResult, TimeoutPhase, WsError};
pub use http::{HttpExchange, ParsedResponse, RequestMessage, ResponseMessage};
pub use websocket::{Message, Session, SessionConfig, SessionEvent, SessionState};
