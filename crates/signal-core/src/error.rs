//! Error types for the signaling core

use thiserror::Error;

use crate::types::{ConnectionHandle, DurableId};

/// Result type for signaling operations
pub type SignalResult<T> = Result<T, SignalError>;

/// Errors that can occur in the signaling core
#[derive(Debug, Error)]
pub enum SignalError {
    /// Target connection is no longer live. Callers must not retry;
    /// staleness is reported, not masked.
    #[error("Target connection no longer live: {handle}")]
    TargetGone { handle: ConnectionHandle },

    /// No live connection is bound to the durable identity
    #[error("No live connection for identity: {durable_id}")]
    IdentityNotFound { durable_id: DurableId },

    /// Frame received at the relay boundary did not match the control
    /// message schema
    #[error("Malformed signaling frame: {reason}")]
    MalformedFrame { reason: String },

    /// External identity store failure
    #[error("Identity store error: {message}")]
    Store { message: String },
}

impl SignalError {
    /// Create a malformed-frame error
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedFrame {
            reason: reason.into(),
        }
    }

    /// Create an identity store error
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// Create an identity-not-found error
    pub fn not_found(durable_id: &DurableId) -> Self {
        Self::IdentityNotFound {
            durable_id: durable_id.clone(),
        }
    }
}
