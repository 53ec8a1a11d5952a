//! Wire-level types shared by the relay and the endpoints.

use serde::{Deserialize, Serialize};

/// Opaque identifier for one live transport connection.
///
/// Created when a transport connects, invalidated when it disconnects,
/// never reused. Owned exclusively by the
/// [`ConnectionRegistry`](crate::registry::ConnectionRegistry).
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct ConnectionHandle(pub uuid::Uuid);

impl ConnectionHandle {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl std::fmt::Display for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Stable identifier for a verification case, surviving reconnects.
///
/// Binds to at most one live [`ConnectionHandle`] at any instant; the
/// newest connection wins.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct DurableId(pub String);

impl DurableId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DurableId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl std::fmt::Display for DurableId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which media track a status update refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Audio,
    Video,
    Both,
}

/// Enablement carried by a media status update: a single flag for one
/// track, or a `[mic, video]` pair for a full sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MediaToggle {
    Single(bool),
    Pair([bool; 2]),
}

/// Current audio/video enablement for one endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaFlags {
    pub mic: bool,
    pub video: bool,
}

impl Default for MediaFlags {
    fn default() -> Self {
        Self {
            mic: true,
            video: true,
        }
    }
}

impl MediaFlags {
    /// Render the flags as a full-sync toggle pair.
    pub fn as_pair(&self) -> MediaToggle {
        MediaToggle::Pair([self.mic, self.video])
    }
}

/// Control messages exchanged between endpoints through the relay.
///
/// Immutable and relayed verbatim; the relay only adds the
/// [`Envelope`]. Negotiation payloads are opaque blobs produced and
/// consumed by the external peer-transport library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "body", rename_all = "kebab-case")]
pub enum ControlMessage {
    /// Call invitation, optionally carrying the offer-direction payload
    Invite {
        display_name: String,
        payload: Option<serde_json::Value>,
    },
    /// Call acceptance, optionally carrying the answer-direction payload
    /// plus the acceptor's starting media flags
    Accept {
        display_name: String,
        payload: Option<serde_json::Value>,
        initial_media: MediaFlags,
    },
    /// Call declined by the ringing party
    Decline,
    /// Standalone negotiation payload when not carried by Invite/Accept
    NegotiationPayload { payload: serde_json::Value },
    /// Media enablement change or full sync
    MediaStatus { kind: MediaKind, toggle: MediaToggle },
    /// In-call chat line
    ChatText { text: String, sender_name: String },
    /// Call termination; idempotent at the receiver
    EndCall,
}

impl ControlMessage {
    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            ControlMessage::Invite { .. } => "invite",
            ControlMessage::Accept { .. } => "accept",
            ControlMessage::Decline => "decline",
            ControlMessage::NegotiationPayload { .. } => "negotiation-payload",
            ControlMessage::MediaStatus { .. } => "media-status",
            ControlMessage::ChatText { .. } => "chat",
            ControlMessage::EndCall => "end-call",
        }
    }
}

/// Envelope added by the relay around a relayed control message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub from: ConnectionHandle,
    pub to: ConnectionHandle,
    pub message: ControlMessage,
}

/// Frames delivered to an endpoint over its transport connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "body", rename_all = "kebab-case")]
pub enum ServerFrame {
    /// Identity assignment for a freshly registered connection
    IdentityAssigned { handle: ConnectionHandle },
    /// A control message relayed from another endpoint
    Relayed(Envelope),
    /// Another connection dropped; endpoints check it against their
    /// current call peer
    PeerDisconnected { handle: ConnectionHandle },
}
