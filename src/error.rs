//! Error types shared by every subsystem.
//!
//! Each failure carries a stable [`ErrorKind`] so callers can map it to an
//! exit or status code without string matching.

use std::fmt;
use std::io;

use thiserror::Error;

use crate::net::diagnostics::OsErrorCode;

/// Stable discriminant for [`ProbeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Connection,
    Timeout,
    WebSocket,
}

/// The phase a timeout fired in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutPhase {
    /// TCP connection establishment.
    Connect,
    /// Whole one-shot HTTP exchange (connect + send + receive).
    Exchange,
    /// Proxy CONNECT negotiation.
    Tunnel,
    /// WebSocket upgrade handshake.
    Handshake,
}

impl fmt::Display for TimeoutPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TimeoutPhase::Connect => "connect",
            TimeoutPhase::Exchange => "exchange",
            TimeoutPhase::Tunnel => "tunnel",
            TimeoutPhase::Handshake => "handshake",
        };
        f.write_str(name)
    }
}

/// WebSocket-level failures.
#[derive(Debug, Error)]
pub enum WsError {
    /// The server rejected or botched the upgrade.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// The proxy refused the CONNECT request.
    #[error("proxy tunnel failed: {status_line}")]
    Tunnel { status_line: String },

    /// The peer violated RFC 6455 framing.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// Operation not allowed in the current session state.
    #[error("invalid session state: {0}")]
    InvalidState(&'static str),
}

/// Errors produced by the probe.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// User-supplied target parameters are malformed.
    #[error("invalid {field}: {message}")]
    Validation { field: &'static str, message: String },

    /// TCP-level failure.
    #[error("{message} ({code})")]
    Connection {
        code: OsErrorCode,
        message: String,
        #[source]
        source: Option<io::Error>,
    },

    /// A phase did not complete in time.
    #[error("{phase} timed out after {timeout_ms} ms")]
    Timeout { phase: TimeoutPhase, timeout_ms: u64 },

    /// Handshake, tunnel or framing failure.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

impl ProbeError {
    /// Stable discriminant for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProbeError::Validation { .. } => ErrorKind::Validation,
            ProbeError::Connection { .. } => ErrorKind::Connection,
            ProbeError::Timeout { .. } => ErrorKind::Timeout,
            ProbeError::WebSocket(_) => ErrorKind::WebSocket,
        }
    }

    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        ProbeError::Validation {
            field,
            message: message.into(),
        }
    }

    /// Connection error from a code alone (e.g. DNS returned no addresses).
    pub fn connection(code: OsErrorCode) -> Self {
        ProbeError::Connection {
            message: code.describe(),
            code,
            source: None,
        }
    }
}

impl From<io::Error> for ProbeError {
    fn from(err: io::Error) -> Self {
        let code = OsErrorCode::from_io(&err);
        ProbeError::Connection {
            message: code.describe(),
            code,
            source: Some(err),
        }
    }
}

/// Result type for probe operations.
pub type ProbeResult<T> = Result<T, ProbeError>;
