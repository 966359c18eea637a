//! HTTP/1.1 request construction.
//!
//! # Responsibilities
//! - Build the exact request bytes, nothing normalised
//! - Origin-form (`GET /path`) or absolute-form (`GET http://host:port/path`)
//!   request line
//! - Mandatory `Host` and `Connection: close`, optional `Cookie`, then caller
//!   headers in caller order
//! - Body from form fields (multipart) or raw text, with `Content-Type` and
//!   `Content-Length` added only when the caller did not supply them
//!
//! # Design Decisions
//! - Caller header lines are written verbatim; duplicates and odd casing are
//!   the caller's business
//! - Multipart wins over a raw body when form fields are present

use crate::config::{Endpoint, Target};
use crate::error::ProbeResult;
use crate::http::multipart;

/// Content-Type used for a raw body when the caller supplied none.
pub const DEFAULT_BODY_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// A request to be serialized byte-for-byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestMessage {
    pub method: String,
    pub path: String,
    pub host: String,
    pub port: u16,
    /// Raw `Name: value` lines, in send order.
    pub headers: Vec<String>,
    pub cookie: Option<String>,
    pub body: Option<String>,
    /// `name=value` / `name=@path;filename=X;type=Y` specs.
    pub form: Vec<String>,
    /// Absolute-URI request line, for forward proxies.
    pub use_absolute_uri: bool,
}

impl RequestMessage {
    pub fn new(method: impl Into<String>, target: &Target) -> Self {
        Self {
            method: method.into(),
            path: target.path.clone(),
            host: target.endpoint.host.clone(),
            port: target.endpoint.port,
            headers: Vec::new(),
            cookie: None,
            body: None,
            form: Vec::new(),
            use_absolute_uri: false,
        }
    }

    /// The origin server this request targets.
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.host.clone(), self.port)
    }

    /// Value written into the `Host` header.
    pub fn host_header(&self) -> String {
        self.endpoint().host_header()
    }

    /// Request target as it appears in the request line.
    pub fn request_target(&self) -> String {
        if self.use_absolute_uri {
            format!("http://{}:{}{}", self.host, self.port, self.path)
        } else {
            self.path.clone()
        }
    }

    /// True if the caller already supplied header `name` (case-insensitive).
    pub fn has_header(&self, name: &str) -> bool {
        has_header(&self.headers, name)
    }
}

/// True if any raw header line carries `name` (case-insensitive).
pub fn has_header(headers: &[String], name: &str) -> bool {
    headers.iter().any(|line| {
        line.split_once(':')
            .map(|(n, _)| n.trim().eq_ignore_ascii_case(name))
            .unwrap_or(false)
    })
}

/// Serialize `req` into wire bytes.
///
/// Fails only when a multipart file field cannot be read.
pub fn build_request(req: &RequestMessage) -> ProbeResult<Vec<u8>> {
    let body: Option<(String, Vec<u8>)> = if !req.form.is_empty() {
        let multipart = multipart::build(&req.form)?;
        Some((multipart.content_type(), multipart.body))
    } else {
        req.body
            .as_ref()
            .map(|b| (DEFAULT_BODY_CONTENT_TYPE.to_string(), b.as_bytes().to_vec()))
    };

    let mut head = String::with_capacity(256);
    head.push_str(&format!("{} {} HTTP/1.1\r\n", req.method, req.request_target()));
    head.push_str(&format!("Host: {}\r\n", req.host_header()));
    head.push_str("Connection: close\r\n");
    if let Some(cookie) = &req.cookie {
        head.push_str(&format!("Cookie: {}\r\n", cookie));
    }
    for line in &req.headers {
        head.push_str(line);
        head.push_str("\r\n");
    }
    if let Some((content_type, bytes)) = &body {
        if !req.has_header("content-type") {
            head.push_str(&format!("Content-Type: {}\r\n", content_type));
        }
        if !req.has_header("content-length") {
            head.push_str(&format!("Content-Length: {}\r\n", bytes.len()));
        }
    }
    head.push_str("\r\n");

    let mut out = head.into_bytes();
    if let Some((_, bytes)) = body {
        out.extend_from_slice(&bytes);
    }
    Ok(out)
}
