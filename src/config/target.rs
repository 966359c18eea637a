//! Target and proxy addressing.
//!
//! Targets are parsed by hand rather than through a URL normaliser: the path
//! is kept byte-for-byte (`/../admin`, `%2e%2e` and friends survive) because
//! wire bytes must stay under the caller's control.

use std::fmt;

use crate::error::{ProbeError, ProbeResult};

/// Fallback proxy host when the `host:port` string omits it.
pub const DEFAULT_PROXY_HOST: &str = "127.0.0.1";

/// Fallback proxy port when the `host:port` string omits it.
pub const DEFAULT_PROXY_PORT: u16 = 8080;

/// A TCP destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// `Host` header value; the port is omitted when it is 80.
    pub fn host_header(&self) -> String {
        if self.port == 80 {
            self.host.clone()
        } else {
            self.to_string()
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// HTTP proxy address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    pub host: String,
    pub port: u16,
}

impl ProxyConfig {
    /// Parse `host:port`, filling missing parts with 127.0.0.1 / 8080.
    pub fn parse(spec: &str) -> ProbeResult<Self> {
        let spec = spec.trim();
        let spec = spec.strip_prefix("http://").unwrap_or(spec);
        let spec = spec.trim_end_matches('/');

        let (host, port) = match split_host_port(spec) {
            (host, Some(port)) => {
                let port = if port.is_empty() {
                    DEFAULT_PROXY_PORT
                } else {
                    parse_port(port).map_err(|m| ProbeError::validation("proxy", m))?
                };
                (host, port)
            }
            (host, None) => (host, DEFAULT_PROXY_PORT),
        };

        let host = if host.is_empty() {
            DEFAULT_PROXY_HOST.to_string()
        } else {
            host.to_string()
        };

        Ok(Self { host, port })
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.host.clone(), self.port)
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_PROXY_HOST.to_string(),
            port: DEFAULT_PROXY_PORT,
        }
    }
}

impl fmt::Display for ProxyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// URL scheme of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Ws,
}

/// A parsed `http://` or `ws://` target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub scheme: Scheme,
    pub endpoint: Endpoint,
    /// Path plus query, verbatim. Always starts with `/`.
    pub path: String,
}

impl Target {
    /// Parse a target URL.
    ///
    /// TLS schemes (`https`, `wss`) are rejected; this client only speaks
    /// plaintext TCP.
    pub fn parse(url: &str) -> ProbeResult<Self> {
        let (scheme, rest) = url
            .split_once("://")
            .ok_or_else(|| ProbeError::validation("url", format!("missing scheme in '{}'", url)))?;

        let scheme = match scheme.to_ascii_lowercase().as_str() {
            "http" => Scheme::Http,
            "ws" => Scheme::Ws,
            "https" | "wss" => {
                return Err(ProbeError::validation(
                    "url",
                    format!("TLS scheme '{}' is not supported", scheme),
                ))
            }
            other => {
                return Err(ProbeError::validation(
                    "url",
                    format!("unsupported scheme '{}'", other),
                ))
            }
        };

        let (authority, path) = rest
            .find(|c: char| c == '/' || c == '?')
            .map(|i| (&rest[..i], &rest[i..]))
            .unwrap_or((rest, "/"));
        let path = if path.starts_with('?') {
            format!("/{}", path)
        } else {
            path.to_string()
        };

        let (host, port) = split_host_port(authority);
        let port = match port {
            Some(p) => parse_port(p).map_err(|m| ProbeError::validation("port", m))?,
            None => 80,
        };

        if host.is_empty() {
            return Err(ProbeError::validation("host", format!("URL '{}' has no host", url)));
        }
        url::Host::parse(host)
            .map_err(|e| ProbeError::validation("host", format!("'{}': {}", host, e)))?;

        Ok(Self {
            scheme,
            endpoint: Endpoint::new(host, port),
            path,
        })
    }
}

/// Split `host[:port]`, keeping bracketed IPv6 literals intact.
fn split_host_port(authority: &str) -> (&str, Option<&str>) {
    if authority.starts_with('[') {
        return match authority.find(']') {
            Some(end) => match authority[end + 1..].strip_prefix(':') {
                Some(port) => (&authority[..=end], Some(port)),
                None => (&authority[..=end], None),
            },
            None => (authority, None),
        };
    }
    match authority.rsplit_once(':') {
        Some((host, port)) => (host, Some(port)),
        None => (authority, None),
    }
}

fn parse_port(port: &str) -> Result<u16, String> {
    match port.parse::<u16>() {
        Ok(0) | Err(_) => Err(format!("'{}' is not a valid port", port)),
        Ok(p) => Ok(p),
    }
}
