//! One-shot HTTP exchange.
//!
//! # Responsibilities
//! - Validate request parameters before any socket is opened
//! - Route to the target directly, or to a forward proxy with an
//!   absolute-URI request line
//! - Run connect + send + receive under a single deadline
//! - Return the request bytes, raw response bytes and parsed response
//!
//! # Design Decisions
//! - Reads until the peer closes (`Connection: close` contract); servers that
//!   keep the connection open will hit the exchange timeout
//! - An unparseable response is still a successful exchange; the raw bytes
//!   are what the operator wants to see

use std::time::{Duration, Instant};

use crate::config::validation::{into_probe_error, validate_request};
use crate::config::ProxyConfig;
use crate::error::ProbeResult;
use crate::http::request::{build_request, RequestMessage};
use crate::http::response::{parse_response, ParsedResponse};
use crate::net::socket;

/// Everything that crossed the wire in one exchange.
#[derive(Debug, Clone)]
pub struct HttpExchange {
    /// Bytes sent, exactly.
    pub request: Vec<u8>,
    /// Bytes received, exactly.
    pub raw: Vec<u8>,
    pub response: ParsedResponse,
    pub elapsed: Duration,
}

/// Send `request` and read the response.
pub async fn send(
    mut request: RequestMessage,
    proxy: Option<&ProxyConfig>,
    limit: Duration,
) -> ProbeResult<HttpExchange> {
    validate_request(&request.method, limit.as_millis() as u64)
        .map_err(into_probe_error)?;

    request.use_absolute_uri = proxy.is_some();
    let endpoint = match proxy {
        Some(proxy) => proxy.endpoint(),
        None => request.endpoint(),
    };
    let bytes = build_request(&request)?;

    tracing::info!(
        method = %request.method,
        request_target = %request.request_target(),
        endpoint = %endpoint,
        via_proxy = proxy.is_some(),
        request_bytes = bytes.len(),
        "Sending HTTP request"
    );

    let started = Instant::now();
    let raw = socket::one_shot(&endpoint, &bytes, limit).await?;
    let elapsed = started.elapsed();
    let response = parse_response(&raw);

    match &response {
        ParsedResponse::Valid(r) => tracing::info!(
            status = r.status_code,
            response_bytes = raw.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "HTTP response received"
        ),
        ParsedResponse::Invalid { reason } => tracing::warn!(
            reason = %reason,
            response_bytes = raw.len(),
            "Unparseable HTTP response"
        ),
    }

    Ok(HttpExchange {
        request: bytes,
        raw,
        response,
        elapsed,
    })
}
