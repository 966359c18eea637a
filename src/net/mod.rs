//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Endpoint
//!     → socket.rs (resolve, connect under deadline)
//!         → one-shot: write request, read until peer close
//!         → persistent: repeated reads/writes until closed
//!     → diagnostics.rs (OS error → human-readable diagnostic)
//! ```
//!
//! # Design Decisions
//! - Plain TCP only; nothing between the caller's bytes and the wire
//! - Each connection is single-use: no pooling, no keep-alive
//! - connection.rs hands out session IDs for log correlation

pub mod connection;
pub mod diagnostics;
pub mod socket;

pub use connection::SessionId;
pub use diagnostics::OsErrorCode;
pub use socket::{PersistentSocket, ReadEvent};
