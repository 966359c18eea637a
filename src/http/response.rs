//! HTTP/1.1 response parsing.
//!
//! # Responsibilities
//! - Split header block from body at the first blank line
//! - Validate the status line (`HTTP/<version> <code> <text...>`)
//! - Collect headers into a case-insensitive map, repeated names become lists
//!
//! # Design Decisions
//! - Malformed input yields [`ParsedResponse::Invalid`], never an error
//! - No transfer decoding, no decompression, no redirects: the body is the
//!   bytes after the header block, exactly as received

use std::collections::BTreeMap;

use serde::Serialize;

/// One or more values for a header name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum HeaderValue {
    Single(String),
    Multiple(Vec<String>),
}

impl HeaderValue {
    /// First value received.
    pub fn first(&self) -> &str {
        match self {
            HeaderValue::Single(v) => v,
            HeaderValue::Multiple(vs) => vs.first().map(String::as_str).unwrap_or(""),
        }
    }

    /// All values in receive order.
    pub fn values(&self) -> Vec<&str> {
        match self {
            HeaderValue::Single(v) => vec![v.as_str()],
            HeaderValue::Multiple(vs) => vs.iter().map(String::as_str).collect(),
        }
    }

    fn push(&mut self, value: String) {
        match self {
            HeaderValue::Single(existing) => {
                let first = std::mem::take(existing);
                *self = HeaderValue::Multiple(vec![first, value]);
            }
            HeaderValue::Multiple(vs) => vs.push(value),
        }
    }
}

/// Response headers keyed by lower-cased name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct HeaderMap(BTreeMap<String, HeaderValue>);

impl HeaderMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value; a repeated name turns into a list.
    pub fn append(&mut self, name: &str, value: String) {
        let key = name.to_ascii_lowercase();
        match self.0.get_mut(&key) {
            Some(existing) => existing.push(value),
            None => {
                self.0.insert(key, HeaderValue::Single(value));
            }
        }
    }

    /// Case-insensitive lookup.
    pub fn get(&self, name: &str) -> Option<&HeaderValue> {
        self.0.get(&name.to_ascii_lowercase())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &HeaderValue)> {
        self.0.iter()
    }
}

/// A successfully parsed response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseMessage {
    pub http_version: String,
    pub status_code: u16,
    pub status_text: String,
    pub headers: HeaderMap,
    /// Bytes after the header block, untouched.
    pub body: Vec<u8>,
    /// Every byte received.
    pub raw: Vec<u8>,
}

impl ResponseMessage {
    /// First value of header `name`.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(HeaderValue::first)
    }

    /// Every value of header `name`.
    pub fn header_values(&self, name: &str) -> Vec<&str> {
        self.headers.get(name).map(HeaderValue::values).unwrap_or_default()
    }

    /// `Set-Cookie` values, for an external cookie jar.
    pub fn set_cookies(&self) -> Vec<&str> {
        self.header_values("set-cookie")
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status_code)
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code)
    }

    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status_code)
    }
}

/// Outcome of [`parse_response`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedResponse {
    Valid(ResponseMessage),
    /// Not an HTTP response; the caller still has the raw bytes.
    Invalid { reason: &'static str },
}

impl ParsedResponse {
    pub fn is_valid(&self) -> bool {
        matches!(self, ParsedResponse::Valid(_))
    }

    pub fn response(&self) -> Option<&ResponseMessage> {
        match self {
            ParsedResponse::Valid(r) => Some(r),
            ParsedResponse::Invalid { .. } => None,
        }
    }
}

/// Parse raw response bytes.
pub fn parse_response(raw: &[u8]) -> ParsedResponse {
    if raw.is_empty() {
        return ParsedResponse::Invalid {
            reason: "empty response",
        };
    }

    let (head, body) = match find_header_end(raw) {
        Some(pos) => (&raw[..pos], &raw[pos + 4..]),
        None => (raw, &raw[raw.len()..]),
    };
    let head = String::from_utf8_lossy(head);
    let mut lines = head.split('\n').map(|l| l.strip_suffix('\r').unwrap_or(l));

    let Some((http_version, status_code, status_text)) = lines.next().and_then(parse_status_line)
    else {
        return ParsedResponse::Invalid {
            reason: "malformed status line",
        };
    };

    let mut headers = HeaderMap::new();
    for line in lines {
        match line.split_once(':') {
            Some((name, value)) => headers.append(name.trim(), value.trim().to_string()),
            None if line.is_empty() => {}
            None => tracing::trace!(line = %line, "Skipping header line without colon"),
        }
    }

    ParsedResponse::Valid(ResponseMessage {
        http_version,
        status_code,
        status_text,
        headers,
        body: body.to_vec(),
        raw: raw.to_vec(),
    })
}

/// Offset of the first `\r\n\r\n`, if any.
pub fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

/// First line of `head`, without its line ending.
pub fn status_line(head: &[u8]) -> String {
    let line = head.split(|&b| b == b'\n').next().unwrap_or_default();
    String::from_utf8_lossy(line).trim_end().to_string()
}

/// `HTTP/<version> <3-digit code>[ <text>]`
fn parse_status_line(line: &str) -> Option<(String, u16, String)> {
    let rest = line.strip_prefix("HTTP/")?;
    let (version, rest) = rest.split_once(' ')?;
    if version.is_empty() || !version.bytes().all(|b| b.is_ascii_digit() || b == b'.') {
        return None;
    }

    let rest = rest.trim_start_matches(' ');
    let (code, text) = match rest.split_once(' ') {
        Some((code, text)) => (code, text.trim()),
        None => (rest, ""),
    };
    if code.len() != 3 || !code.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    Some((version.to_string(), code.parse().ok()?, text.to_string()))
}
