//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Library code emits tracing events with structured fields
//!     (session id, endpoint, phase, byte counts)
//!     → logging.rs subscriber (binary only)
//!     → stderr
//! ```
//!
//! # Design Decisions
//! - The library never installs a subscriber; the binary does
//! - stdout is reserved for response bytes, logs go to stderr

pub mod logging;
