//! Identity establishment
//!
//! The relay assigns a connection's identity asynchronously. If the
//! transport was already connected when the endpoint attached, the
//! assignment frame may have been emitted and missed, so the endpoint
//! waits a bounded time for it and then adopts the transport's locally
//! known identifier as a fallback. A single-shot latch prevents double
//! adoption when the real frame arrives late; the fallback path is
//! logged as degraded since it indicates relay/registry disagreement
//! risk.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, warn};
use vkyc_signal_core::{ConnectionHandle, ServerFrame};

/// Single-shot latch. The first `fire` wins; every later call reports
/// that the latch was already taken.
#[derive(Debug, Default)]
pub struct OnceLatch {
    fired: AtomicBool,
}

impl OnceLatch {
    pub fn new() -> Self {
        Self {
            fired: AtomicBool::new(false),
        }
    }

    /// Returns `true` exactly once.
    pub fn fire(&self) -> bool {
        !self.fired.swap(true, Ordering::SeqCst)
    }

    pub fn is_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}

/// How the endpoint's identity was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EstablishedIdentity {
    pub handle: ConnectionHandle,
    /// `true` when the assignment frame never arrived and the local
    /// identifier was adopted as a fallback
    pub degraded: bool,
}

/// Wait up to `wait` for the `identity-assigned` frame on `frames`.
///
/// Frames that arrive before the assignment are preserved in `pending`
/// for the caller to process afterwards, in arrival order. On timeout
/// the locally known `local` identifier is adopted instead, guarded by
/// `latch` so a late real assignment cannot re-establish identity.
pub async fn establish_identity(
    frames: &mut mpsc::UnboundedReceiver<ServerFrame>,
    local: ConnectionHandle,
    wait: Duration,
    latch: &OnceLatch,
    pending: &mut Vec<ServerFrame>,
) -> EstablishedIdentity {
    let deadline = tokio::time::Instant::now() + wait;
    loop {
        match tokio::time::timeout_at(deadline, frames.recv()).await {
            Ok(Some(ServerFrame::IdentityAssigned { handle })) => {
                if latch.fire() {
                    debug!(%handle, "identity assigned by relay");
                    return EstablishedIdentity {
                        handle,
                        degraded: false,
                    };
                }
                debug!(%handle, "duplicate identity assignment ignored");
            }
            Ok(Some(frame)) => pending.push(frame),
            // channel closed or wait elapsed: fall back below
            Ok(None) | Err(_) => break,
        }
    }

    if latch.fire() {
        warn!(
            handle = %local,
            wait_ms = wait.as_millis() as u64,
            "identity assignment not received, adopting local identifier (degraded)"
        );
    }
    EstablishedIdentity {
        handle: local,
        degraded: true,
    }
}
