//! Media/chat control channel state
//!
//! Pure per-session bookkeeping for the small control messages that
//! flow while a call is `Active`: media-enabled toggles and chat text.
//! The endpoint relays these; this module tracks the local and remote
//! views and the chat transcript. Messages received outside `Active`
//! are dropped by the endpoint, never queued.

use chrono::{DateTime, Utc};
use vkyc_signal_core::{ControlMessage, MediaFlags, MediaKind, MediaToggle};

/// Direction of a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatDirection {
    Sent,
    Received,
}

/// One chat line with its sender and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatEntry {
    pub sender_name: String,
    pub text: String,
    pub at: DateTime<Utc>,
    pub direction: ChatDirection,
}

/// Media and chat state for one call attempt.
#[derive(Debug)]
pub struct MediaChannel {
    local: MediaFlags,
    remote: Option<MediaFlags>,
    transcript: Vec<ChatEntry>,
}

impl MediaChannel {
    pub fn new(local: MediaFlags) -> Self {
        Self {
            local,
            remote: None,
            transcript: Vec::new(),
        }
    }

    pub fn local(&self) -> MediaFlags {
        self.local
    }

    pub fn remote(&self) -> Option<MediaFlags> {
        self.remote
    }

    /// Flip one local track, returning the status message to relay.
    pub fn toggle_local(&mut self, kind: MediaKind, enabled: bool) -> ControlMessage {
        match kind {
            MediaKind::Audio => self.local.mic = enabled,
            MediaKind::Video => self.local.video = enabled,
            MediaKind::Both => {
                self.local.mic = enabled;
                self.local.video = enabled;
            }
        }
        ControlMessage::MediaStatus {
            kind,
            toggle: match kind {
                MediaKind::Both => self.local.as_pair(),
                _ => MediaToggle::Single(enabled),
            },
        }
    }

    /// The one-time full sync pushed when the session turns `Active`,
    /// so the remote has a correct starting view. No periodic
    /// heartbeat follows.
    pub fn initial_sync(&self) -> ControlMessage {
        ControlMessage::MediaStatus {
            kind: MediaKind::Both,
            toggle: self.local.as_pair(),
        }
    }

    /// Apply a peer status update, returning the remote view afterward.
    pub fn apply_remote(&mut self, kind: MediaKind, toggle: MediaToggle) -> MediaFlags {
        let mut remote = self.remote.unwrap_or_default();
        match (kind, toggle) {
            (MediaKind::Audio, MediaToggle::Single(enabled)) => remote.mic = enabled,
            (MediaKind::Video, MediaToggle::Single(enabled)) => remote.video = enabled,
            (_, MediaToggle::Pair([mic, video])) => {
                remote.mic = mic;
                remote.video = video;
            }
            (MediaKind::Both, MediaToggle::Single(enabled)) => {
                remote.mic = enabled;
                remote.video = enabled;
            }
        }
        self.remote = Some(remote);
        remote
    }

    /// Seed the remote view from the initial flags carried by `accept`.
    pub fn set_remote(&mut self, flags: MediaFlags) {
        self.remote = Some(flags);
    }

    pub fn push_sent(&mut self, sender_name: &str, text: &str) {
        self.transcript.push(ChatEntry {
            sender_name: sender_name.to_string(),
            text: text.to_string(),
            at: Utc::now(),
            direction: ChatDirection::Sent,
        });
    }

    pub fn push_received(&mut self, sender_name: &str, text: &str) {
        self.transcript.push(ChatEntry {
            sender_name: sender_name.to_string(),
            text: text.to_string(),
            at: Utc::now(),
            direction: ChatDirection::Received,
        });
    }

    pub fn transcript(&self) -> &[ChatEntry] {
        &self.transcript
    }
}
