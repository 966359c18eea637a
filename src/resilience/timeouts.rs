//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap every network phase with its own deadline
//! - Cancel the phase cleanly on expiry (the future and the socket it owns
//!   are dropped)
//! - Report which phase expired
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Timeout errors are distinct from other errors
//! - No retry: the caller decides whether to start over

use std::future::Future;
use std::time::Duration;

use crate::error::{ProbeError, ProbeResult, TimeoutPhase};

/// Run `fut` under a deadline scoped to `phase`.
///
/// The timer is cleared the instant `fut` resolves. On expiry `fut` is
/// dropped, which destroys any socket it owns.
pub async fn with_timeout<T, F>(phase: TimeoutPhase, limit: Duration, fut: F) -> ProbeResult<T>
where
    F: Future<Output = ProbeResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::debug!(%phase, timeout_ms = limit.as_millis() as u64, "Phase timed out");
            Err(ProbeError::Timeout {
                phase,
                timeout_ms: limit.as_millis() as u64,
            })
        }
    }
}
