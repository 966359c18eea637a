//! Translation of OS-level socket failures into human-readable diagnostics.
//!
//! # Responsibilities
//! - Classify `std::io::Error` values into a fixed set of known failure codes
//! - Provide a stable short code (`ECONNREFUSED`, ...) for callers that map
//!   failures to exit codes
//! - Fall back to a generic message carrying the raw code for anything else

use std::fmt;
use std::io;

/// Known socket failure classes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OsErrorCode {
    ConnectionRefused,
    HostNotFound,
    TimedOut,
    ConnectionReset,
    HostUnreachable,
    NetworkUnreachable,
    AddrInUse,
    BrokenPipe,
    /// Anything not in the table; carries the raw OS code or error kind.
    Other(String),
}

impl OsErrorCode {
    /// Classify an I/O error.
    pub fn from_io(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionRefused => Self::ConnectionRefused,
            io::ErrorKind::TimedOut => Self::TimedOut,
            io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted => {
                Self::ConnectionReset
            }
            io::ErrorKind::HostUnreachable => Self::HostUnreachable,
            io::ErrorKind::NetworkUnreachable => Self::NetworkUnreachable,
            io::ErrorKind::AddrInUse => Self::AddrInUse,
            io::ErrorKind::BrokenPipe => Self::BrokenPipe,
            kind => match err.raw_os_error() {
                Some(code) => Self::Other(code.to_string()),
                None => Self::Other(format!("{:?}", kind)),
            },
        }
    }

    /// Short, stable code for this failure class.
    pub fn code(&self) -> &str {
        match self {
            Self::ConnectionRefused => "ECONNREFUSED",
            Self::HostNotFound => "ENOTFOUND",
            Self::TimedOut => "ETIMEDOUT",
            Self::ConnectionReset => "ECONNRESET",
            Self::HostUnreachable => "EHOSTUNREACH",
            Self::NetworkUnreachable => "ENETUNREACH",
            Self::AddrInUse => "EADDRINUSE",
            Self::BrokenPipe => "EPIPE",
            Self::Other(raw) => raw,
        }
    }

    /// Human-readable diagnostic.
    pub fn describe(&self) -> String {
        match self {
            Self::ConnectionRefused => "Connection refused - is the server running?".to_string(),
            Self::HostNotFound => "Host not found - check the hostname".to_string(),
            Self::TimedOut => "Connection timed out".to_string(),
            Self::ConnectionReset => "Connection reset by peer".to_string(),
            Self::HostUnreachable => "Host unreachable".to_string(),
            Self::NetworkUnreachable => "Network unreachable".to_string(),
            Self::AddrInUse => "Address already in use".to_string(),
            Self::BrokenPipe => "Broken pipe - connection closed unexpectedly".to_string(),
            Self::Other(raw) => format!("Connection error: {}", raw),
        }
    }
}

impl fmt::Display for OsErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_kinds_map_to_table() {
        let refused = io::Error::from(io::ErrorKind::ConnectionRefused);
        assert_eq!(OsErrorCode::from_io(&refused), OsErrorCode::ConnectionRefused);
        assert_eq!(OsErrorCode::from_io(&refused).code(), "ECONNREFUSED");

        let reset = io::Error::from(io::ErrorKind::ConnectionReset);
        assert_eq!(
            OsErrorCode::from_io(&reset).describe(),
            "Connection reset by peer"
        );

        let pipe = io::Error::from(io::ErrorKind::BrokenPipe);
        assert_eq!(OsErrorCode::from_io(&pipe), OsErrorCode::BrokenPipe);
    }

    #[test]
    fn unknown_raw_code_falls_back_to_generic_message() {
        // EPERM is not in the table
        let err = io::Error::from_raw_os_error(1);
        let code = OsErrorCode::from_io(&err);
        assert_eq!(code, OsErrorCode::Other("1".to_string()));
        assert_eq!(code.describe(), "Connection error: 1");
    }
}
