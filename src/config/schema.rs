//! Configuration schema definitions.
//!
//! This module defines the optional configuration file for the probe.
//! All types derive Serde traits for deserialization from TOML; every field
//! has a default so an empty file (or no file) is valid.

use serde::{Deserialize, Serialize};

/// Root configuration for the probe.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Timeout applied to each network phase, in milliseconds.
    pub timeout_ms: u64,

    /// Default proxy as `host:port`.
    pub proxy: Option<String>,

    /// Raw header lines sent before any command-line headers.
    pub headers: Vec<String>,

    /// Default subprotocols offered on WebSocket upgrades.
    pub subprotocols: Vec<String>,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            proxy: None,
            headers: Vec::new(),
            subprotocols: Vec::new(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
        }
    }
}
