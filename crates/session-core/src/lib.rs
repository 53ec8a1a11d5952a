//! Endpoint-side call session core for VKYC.
//!
//! Each connected party (verification agent or customer) runs one
//! [`CallEndpoint`]: an actor owning a per-attempt session state
//! machine that advances only through relayed control messages, since
//! the two sides of a call share no memory. The crate also houses the
//! pieces the state machine drives:
//!
//! - [`NegotiationCoordinator`]: sequences the two-message
//!   offer/answer handshake over opaque payloads from the external
//!   [`PeerTransport`] library.
//! - [`MediaChannel`]: local/remote media flags and the chat
//!   transcript for an active session.
//! - [`VerdictTrigger`]: the single, precondition-checked handoff of
//!   the accept/reject decision to the external [`VerdictSink`].
//! - identity establishment with a bounded wait and a single-shot
//!   fallback latch.

pub mod config;
pub mod endpoint;
pub mod error;
pub mod events;
pub mod identity;
pub mod media;
pub mod negotiation;
pub mod state;
pub mod verdict;

pub use config::EndpointConfig;
pub use endpoint::{CallEndpoint, EndpointCommand};
pub use error::{SessionError, SessionResult};
pub use events::{EndReason, EndpointEvent};
pub use identity::{establish_identity, EstablishedIdentity, OnceLatch};
pub use media::{ChatDirection, ChatEntry, MediaChannel};
pub use negotiation::{CallRole, LoopbackPeerTransport, NegotiationCoordinator, PeerTransport};
pub use state::{next_state, SessionInput, SessionState, Transition};
pub use verdict::{
    ArtifactRef, CapturedArtifact, Decision, NullVerdictSink, Verdict, VerdictSink, VerdictTrigger,
};
