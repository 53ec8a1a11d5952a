//! Events emitted by an endpoint to its application layer.

use chrono::{DateTime, Utc};
use vkyc_signal_core::{ConnectionHandle, DurableId, MediaFlags};

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// This endpoint hung up
    Local,
    /// The remote endpoint hung up
    Remote,
    /// The remote endpoint's transport connection dropped
    PeerConnectionLost,
    /// The peer-transport library rejected a negotiation payload
    NegotiationFailed,
    /// The negotiation handshake did not finish in time
    NegotiationTimeout,
}

/// Notifications an endpoint pushes to the application layer (UI,
/// agent console). Purely informational; the application reacts by
/// issuing commands back to the endpoint.
#[derive(Debug, Clone, PartialEq)]
pub enum EndpointEvent {
    /// The endpoint's connection identity is known. `degraded` marks
    /// the fallback adoption path.
    IdentityEstablished {
        handle: ConnectionHandle,
        degraded: bool,
    },
    /// The durable case identifier was published for this connection
    IdentityBound { durable_id: DurableId },
    /// A call invitation arrived; the application should ring
    IncomingInvite {
        from: ConnectionHandle,
        display_name: String,
    },
    /// The remote party accepted our invite
    CallAccepted { display_name: String },
    /// Media negotiation finished; the session is live
    CallActive,
    /// The session ended
    CallEnded { reason: EndReason },
    /// The remote party declined our invite
    CallDeclined,
    /// An invite expired unanswered
    MissedCall,
    /// An outbound call could not be started
    CallFailed { reason: String },
    /// The target case has no live connection
    PeerUnreachable { durable_id: DurableId },
    /// In-call chat line from the remote party
    ChatReceived {
        sender_name: String,
        text: String,
        at: DateTime<Utc>,
    },
    /// The remote party toggled its media
    PeerMediaChanged { flags: MediaFlags },
    /// The verdict was handed to the decision-persistence collaborator
    VerdictSubmitted { durable_id: DurableId },
    /// A verdict precondition failed; the user should be re-prompted
    VerdictRejected { reason: String },
}
