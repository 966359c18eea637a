//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Network phase (connect / exchange / tunnel / handshake):
//!     → timeouts.rs (phase-scoped deadline)
//!     → On expiry: socket dropped, ProbeError::Timeout { phase } returned
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every network phase has a deadline
//! - Failures are never retried silently

pub mod timeouts;

pub use timeouts::with_timeout;
