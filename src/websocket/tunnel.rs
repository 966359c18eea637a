//! HTTP `CONNECT` tunnel through a proxy.
//!
//! After a `200` the proxy connection is an opaque pipe to the target and the
//! upgrade handshake runs over it unchanged.

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::config::Endpoint;
use crate::error::{ProbeResult, WsError};
use crate::http::response::status_line;
use crate::net::socket::{read_head, HeadRead};

/// `CONNECT` request for `target`.
pub fn connect_request(target: &Endpoint) -> Vec<u8> {
    format!(
        "CONNECT {target} HTTP/1.1\r\nHost: {target}\r\nProxy-Connection: keep-alive\r\n\r\n",
        target = target
    )
    .into_bytes()
}

/// Ask the proxy on `stream` to open a tunnel to `target`.
///
/// Returns whatever the proxy sent after its header block; those bytes
/// already belong to the target.
pub async fn establish<S>(stream: &mut S, target: &Endpoint) -> ProbeResult<BytesMut>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.write_all(&connect_request(target)).await?;
    stream.flush().await?;
    tracing::debug!(endpoint = %target, "CONNECT sent");

    let mut buf = BytesMut::new();
    let end = match read_head(stream, &mut buf).await? {
        HeadRead::Complete(end) => end,
        HeadRead::Closed => {
            return Err(WsError::Tunnel {
                status_line: format!(
                    "proxy closed the connection ({} bytes received)",
                    buf.len()
                ),
            }
            .into());
        }
        HeadRead::Overflow => {
            return Err(WsError::Tunnel {
                status_line: "proxy response header too large".into(),
            }
            .into());
        }
    };

    let leftover = buf.split_off(end);
    let status_line = status_line(&buf);
    if !status_line.contains("200") {
        tracing::warn!(endpoint = %target, status = %status_line, "Proxy refused tunnel");
        return Err(WsError::Tunnel { status_line }.into());
    }

    tracing::debug!(endpoint = %target, status = %status_line, "Tunnel established");
    Ok(leftover)
}
