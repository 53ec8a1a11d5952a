//! Error types for the session core

use thiserror::Error;

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;

/// Errors that can occur in an endpoint's session core.
///
/// All of these are local and recoverable: the endpoint transitions to
/// a safe state (`Idle` or `Ended`) and keeps running. Inputs the
/// transition table does not allow are not errors at all; they are
/// logged no-ops (see [`crate::state::Transition::Invalid`]).
#[derive(Debug, Error)]
pub enum SessionError {
    /// The external peer-transport library failed to produce or consume
    /// a negotiation payload
    #[error("Negotiation failed: {reason}")]
    Negotiation { reason: String },

    /// Verdict precondition: remarks must be non-empty before handoff
    #[error("Verdict remarks must not be empty")]
    EmptyRemarks,

    /// The verdict for this session was already handed off
    #[error("Verdict already submitted for this session")]
    VerdictAlreadySubmitted,

    /// Verdict requested before the session ended
    #[error("Verdict can only be recorded after the session has ended")]
    SessionNotEnded,

    /// No durable case identifier is associated with the session
    #[error("No case is bound to this session")]
    NoCaseBound,

    /// Signaling-layer failure
    #[error("Signaling error: {0}")]
    Signal(#[from] vkyc_signal_core::SignalError),

    /// The endpoint task is gone
    #[error("Endpoint channel closed")]
    ChannelClosed,
}

impl SessionError {
    /// Create a negotiation failure
    pub fn negotiation(reason: impl Into<String>) -> Self {
        Self::Negotiation {
            reason: reason.into(),
        }
    }
}
