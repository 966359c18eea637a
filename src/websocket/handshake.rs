//! Client side of the HTTP/1.1 upgrade handshake (RFC 6455 section 4).

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::BytesMut;
use rand::RngCore;
use sha1::{Digest, Sha1};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::config::Endpoint;
use crate::error::{ProbeResult, WsError};
use crate::http::response::{parse_response, status_line, ParsedResponse};
use crate::net::socket::{read_head, HeadRead};

/// Fixed GUID appended to the key before hashing.
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Only protocol version this client speaks.
pub const WS_VERSION: &str = "13";

/// Fresh `Sec-WebSocket-Key`: 16 random bytes, base64.
pub fn generate_key() -> String {
    let mut nonce = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut nonce);
    STANDARD.encode(nonce)
}

/// `Sec-WebSocket-Accept` the server must send back for `key`.
pub fn compute_accept(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    STANDARD.encode(hasher.finalize())
}

/// Parameters of an upgrade request.
#[derive(Debug, Clone)]
pub struct UpgradeRequest<'a> {
    pub endpoint: &'a Endpoint,
    pub path: &'a str,
    pub key: &'a str,
    pub subprotocols: &'a [String],
    pub cookie: Option<&'a str>,
    /// Raw `Name: value` lines, sent after the fixed upgrade headers.
    pub headers: &'a [String],
}

impl UpgradeRequest<'_> {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut head = String::with_capacity(256);
        head.push_str(&format!("GET {} HTTP/1.1\r\n", self.path));
        head.push_str(&format!("Host: {}\r\n", self.endpoint.host_header()));
        head.push_str("Upgrade: websocket\r\n");
        head.push_str("Connection: Upgrade\r\n");
        head.push_str(&format!("Sec-WebSocket-Key: {}\r\n", self.key));
        head.push_str(&format!("Sec-WebSocket-Version: {}\r\n", WS_VERSION));
        if !self.subprotocols.is_empty() {
            head.push_str(&format!(
                "Sec-WebSocket-Protocol: {}\r\n",
                self.subprotocols.join(", ")
            ));
        }
        if let Some(cookie) = self.cookie {
            head.push_str(&format!("Cookie: {}\r\n", cookie));
        }
        for line in self.headers {
            head.push_str(line);
            head.push_str("\r\n");
        }
        head.push_str("\r\n");
        head.into_bytes()
    }
}

/// Check an upgrade response header block.
///
/// Returns the subprotocol the server selected, if any.
pub fn validate_response(head: &[u8], expected_accept: &str) -> ProbeResult<Option<String>> {
    let status_line = status_line(head);
    if !status_line.contains("101") {
        return Err(WsError::Handshake(format!("unexpected status: {}", status_line)).into());
    }

    let response = match parse_response(head) {
        ParsedResponse::Valid(response) => response,
        ParsedResponse::Invalid { reason } => {
            return Err(WsError::Handshake(reason.to_string()).into());
        }
    };

    match response.header("sec-websocket-accept") {
        Some(accept) if accept == expected_accept => {}
        Some(accept) => {
            return Err(WsError::Handshake(format!(
                "Sec-WebSocket-Accept mismatch: expected {}, got {}",
                expected_accept, accept
            ))
            .into());
        }
        None => {
            return Err(WsError::Handshake("missing Sec-WebSocket-Accept".into()).into());
        }
    }

    Ok(response
        .header("sec-websocket-protocol")
        .filter(|p| !p.is_empty())
        .map(str::to_string))
}

/// Result of a completed handshake.
#[derive(Debug)]
pub struct Handshake {
    pub protocol: Option<String>,
    /// Bytes received after the `101` header block; the start of the frame
    /// stream.
    pub leftover: BytesMut,
}

/// Send `request` and read the upgrade response off `stream`.
///
/// `buf` may already hold bytes that arrived during tunnel setup.
pub async fn perform<S>(
    stream: &mut S,
    request: &UpgradeRequest<'_>,
    mut buf: BytesMut,
) -> ProbeResult<Handshake>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let expected = compute_accept(request.key);
    stream.write_all(&request.to_bytes()).await?;
    stream.flush().await?;
    tracing::debug!(endpoint = %request.endpoint, path = %request.path, "Upgrade request sent");

    let end = match read_head(stream, &mut buf).await? {
        HeadRead::Complete(end) => end,
        HeadRead::Closed => {
            return Err(WsError::Handshake("connection closed before upgrade response".into()).into());
        }
        HeadRead::Overflow => {
            return Err(WsError::Handshake("upgrade response header too large".into()).into());
        }
    };

    let leftover = buf.split_off(end);
    let protocol = validate_response(&buf, &expected)?;
    tracing::debug!(
        protocol = protocol.as_deref().unwrap_or("-"),
        leftover = leftover.len(),
        "Upgrade accepted"
    );
    Ok(Handshake { protocol, leftover })
}
