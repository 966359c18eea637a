//! Configuration and request parameter validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, ports valid)
//! - Check request parameters (method token, timeout) before any socket is
//!   opened
//! - Header lines in the config file must look like `Name: value`
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure: input → Result<(), Vec<ValidationError>>
//! - Caller header lines on a request are never inspected; they go out verbatim

use std::fmt;

use crate::config::schema::ProbeConfig;
use crate::config::target::ProxyConfig;
use crate::error::ProbeError;

/// A single semantic validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Collapse a list of failures into one [`ProbeError::Validation`].
pub fn into_probe_error(errors: Vec<ValidationError>) -> ProbeError {
    let field = errors.first().map(|e| e.field).unwrap_or("request");
    let message = errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ");
    ProbeError::validation(field, message)
}

/// Validate a loaded configuration file.
pub fn validate_config(config: &ProbeConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.timeout_ms == 0 {
        errors.push(ValidationError::new("timeout_ms", "must be greater than zero"));
    }
    if let Some(proxy) = &config.proxy {
        if let Err(e) = ProxyConfig::parse(proxy) {
            errors.push(ValidationError::new("proxy", e.to_string()));
        }
    }
    for line in &config.headers {
        check_header_line(line, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate caller-supplied request parameters.
pub fn validate_request(method: &str, timeout_ms: u64) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if method.is_empty() {
        errors.push(ValidationError::new("method", "must not be empty"));
    } else if method.bytes().any(|b| b.is_ascii_whitespace() || b.is_ascii_control()) {
        errors.push(ValidationError::new(
            "method",
            format!("'{}' contains whitespace or control bytes", method.escape_debug()),
        ));
    }
    if timeout_ms == 0 {
        errors.push(ValidationError::new("timeout", "must be greater than zero"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_header_line(line: &str, errors: &mut Vec<ValidationError>) {
    match line.split_once(':') {
        Some((name, _)) if !name.trim().is_empty() => {}
        _ => errors.push(ValidationError::new(
            "header",
            format!("'{}' is not a 'Name: value' line", line),
        )),
    }
}
