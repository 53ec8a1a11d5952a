//! Relay-side core for VKYC call sessions.
//!
//! This crate owns the three pieces of process-wide state that let two
//! independently connected parties (a verification agent and a customer)
//! find each other and exchange signaling frames:
//!
//! - [`ConnectionRegistry`]: issues an opaque [`ConnectionHandle`] per
//!   live transport connection and invalidates it on disconnect.
//! - [`IdentityDirectory`]: maps a durable case identifier to the
//!   current connection handle of the party that owns it, backed by an
//!   external [`IdentityStore`] with an in-process cache.
//! - [`SignalingRelay`]: a stateless router that wraps a
//!   [`ControlMessage`] in an [`Envelope`] and delivers it to a target
//!   handle, or reports the target gone.
//!
//! [`SignalHub`] composes the three into the single object a signaling
//! process hosts. The relay never inspects message semantics beyond
//! routing; call state lives entirely in `vkyc-session-core` endpoints.

pub mod directory;
pub mod error;
pub mod hub;
pub mod registry;
pub mod relay;
pub mod types;

pub use directory::{
    BindingSource, FallbackStore, IdentityDirectory, IdentityStore, InMemoryIdentityStore,
    ResolvedBinding,
};
pub use error::{SignalError, SignalResult};
pub use hub::SignalHub;
pub use registry::ConnectionRegistry;
pub use relay::{parse_frame, RouteOutcome, SignalingRelay};
pub use types::{
    ConnectionHandle, ControlMessage, DurableId, Envelope, MediaFlags, MediaKind, MediaToggle,
    ServerFrame,
};
