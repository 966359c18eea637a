//! Raw TCP transport.
//!
//! # Responsibilities
//! - Resolve and connect to an [`Endpoint`] under a connect-phase deadline
//! - One-shot mode: write a request, read until the peer closes
//! - Persistent mode: keep the socket open for repeated reads and writes
//!
//! # Design Decisions
//! - No implicit idle timeout once a persistent socket is open
//! - A fired deadline drops the socket (forcible destroy), never retries
//! - Every OS failure is translated through [`OsErrorCode`]

use std::net::SocketAddr;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use crate::config::Endpoint;
use crate::error::{ProbeError, ProbeResult, TimeoutPhase};
use crate::http::response::find_header_end;
use crate::net::diagnostics::OsErrorCode;
use crate::resilience::with_timeout;

/// Minimum spare capacity reserved before each read.
const READ_CHUNK: usize = 8 * 1024;

/// Largest header block accepted from a proxy or an upgrade response.
pub const MAX_HEAD_LEN: usize = 64 * 1024;

/// Open a TCP connection. The deadline covers resolution and connect only.
pub async fn connect(endpoint: &Endpoint, limit: Duration) -> ProbeResult<TcpStream> {
    with_timeout(TimeoutPhase::Connect, limit, connect_raw(endpoint)).await
}

/// Write `request` on an open stream and read until the peer closes.
///
/// One deadline covers the whole exchange; the stream is consumed so it is
/// destroyed on expiry.
pub async fn send_and_receive(
    stream: TcpStream,
    request: &[u8],
    limit: Duration,
) -> ProbeResult<Vec<u8>> {
    with_timeout(TimeoutPhase::Exchange, limit, exchange(stream, request)).await
}

/// Connect, send and receive under a single deadline.
pub async fn one_shot(endpoint: &Endpoint, request: &[u8], limit: Duration) -> ProbeResult<Vec<u8>> {
    with_timeout(TimeoutPhase::Exchange, limit, async {
        let stream = connect_raw(endpoint).await?;
        exchange(stream, request).await
    })
    .await
}

async fn connect_raw(endpoint: &Endpoint) -> ProbeResult<TcpStream> {
    let host = endpoint.host.trim_start_matches('[').trim_end_matches(']');

    let addrs: Vec<SocketAddr> = match tokio::net::lookup_host((host, endpoint.port)).await {
        Ok(addrs) => addrs.collect(),
        Err(e) => {
            tracing::debug!(endpoint = %endpoint, error = %e, "Name resolution failed");
            return Err(ProbeError::Connection {
                message: OsErrorCode::HostNotFound.describe(),
                code: OsErrorCode::HostNotFound,
                source: Some(e),
            });
        }
    };
    if addrs.is_empty() {
        return Err(ProbeError::connection(OsErrorCode::HostNotFound));
    }

    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                tracing::debug!(endpoint = %endpoint, peer_addr = %addr, "TCP connected");
                return Ok(stream);
            }
            Err(e) => {
                tracing::debug!(peer_addr = %addr, error = %e, "Connect attempt failed");
                last_err = Some(e);
            }
        }
    }

    Err(match last_err {
        Some(e) => e.into(),
        None => ProbeError::connection(OsErrorCode::HostNotFound),
    })
}

async fn exchange(mut stream: TcpStream, request: &[u8]) -> ProbeResult<Vec<u8>> {
    stream.write_all(request).await?;
    stream.flush().await?;
    tracing::trace!(bytes = request.len(), "Request written");

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await?;
    tracing::trace!(bytes = response.len(), "Peer closed connection");
    Ok(response)
}

/// Outcome of a single read on a persistent socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadEvent {
    /// `n` bytes were appended to the buffer.
    Data(usize),
    /// The peer closed its write side.
    Closed,
}

/// A long-lived bidirectional TCP connection.
#[derive(Debug)]
pub struct PersistentSocket {
    stream: TcpStream,
    peer: Endpoint,
}

impl PersistentSocket {
    /// Connect under a connect-phase deadline. Once open, no timer remains.
    pub async fn open(endpoint: &Endpoint, limit: Duration) -> ProbeResult<Self> {
        let stream = connect(endpoint, limit).await?;
        Ok(Self {
            stream,
            peer: endpoint.clone(),
        })
    }

    /// The endpoint this socket is connected to (the proxy, when tunnelling).
    pub fn peer(&self) -> &Endpoint {
        &self.peer
    }

    /// The underlying stream, for phases that speak their own protocol.
    pub fn stream_mut(&mut self) -> &mut TcpStream {
        &mut self.stream
    }

    pub async fn write_all(&mut self, bytes: &[u8]) -> ProbeResult<()> {
        self.stream.write_all(bytes).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Read whatever is available and append it to `buf`.
    pub async fn read_chunk(&mut self, buf: &mut BytesMut) -> ProbeResult<ReadEvent> {
        read_chunk(&mut self.stream, buf).await
    }

    /// Split into independently owned halves for full-duplex use.
    pub fn into_split(self) -> (OwnedReadHalf, OwnedWriteHalf) {
        self.stream.into_split()
    }
}

/// Read once from `reader`, appending to `buf`.
pub async fn read_chunk<R>(reader: &mut R, buf: &mut BytesMut) -> ProbeResult<ReadEvent>
where
    R: tokio::io::AsyncRead + Unpin,
{
    buf.reserve(READ_CHUNK);
    match reader.read_buf(buf).await? {
        0 => Ok(ReadEvent::Closed),
        n => Ok(ReadEvent::Data(n)),
    }
}

/// Outcome of [`read_head`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadRead {
    /// Offset just past the blank line ending the header block.
    Complete(usize),
    /// The peer closed before the header block was complete.
    Closed,
    /// More than [`MAX_HEAD_LEN`] bytes without a blank line.
    Overflow,
}

/// Read until `buf` holds a full HTTP header block.
///
/// Bytes past the header block stay in `buf`; the caller decides what they
/// belong to.
pub async fn read_head<R>(reader: &mut R, buf: &mut BytesMut) -> ProbeResult<HeadRead>
where
    R: tokio::io::AsyncRead + Unpin,
{
    loop {
        if let Some(pos) = find_header_end(buf) {
            return Ok(HeadRead::Complete(pos + 4));
        }
        if buf.len() > MAX_HEAD_LEN {
            return Ok(HeadRead::Overflow);
        }
        if read_chunk(reader, buf).await? == ReadEvent::Closed {
            return Ok(HeadRead::Closed);
        }
    }
}
