//! Endpoint configuration

use std::time::Duration;

use vkyc_signal_core::{DurableId, MediaFlags};

/// Configuration for one call endpoint.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    /// Name shown to the remote party
    pub display_name: String,
    /// Starting media enablement
    pub media: MediaFlags,
    /// Bounded wait for the identity-assignment frame before the local
    /// identifier is adopted as a degraded fallback
    pub identity_wait: Duration,
    /// When set, invite this case automatically once identity is
    /// established (exactly once, latch-guarded)
    pub auto_invite_target: Option<DurableId>,
    /// Settle delay before the automatic invite, letting transport
    /// handshakes finish
    pub auto_invite_delay: Duration,
    /// How long an unanswered invite rings before expiring back to
    /// idle as a missed call
    pub invite_timeout: Duration,
    /// How long the negotiation handshake may take before the session
    /// is ended
    pub negotiation_timeout: Duration,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            display_name: "anonymous".to_string(),
            media: MediaFlags::default(),
            identity_wait: Duration::from_secs(1),
            auto_invite_target: None,
            auto_invite_delay: Duration::from_millis(500),
            invite_timeout: Duration::from_secs(45),
            negotiation_timeout: Duration::from_secs(30),
        }
    }
}

impl EndpointConfig {
    /// Configuration with the given display name
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            ..Default::default()
        }
    }

    /// Invite this case automatically once identity is established
    pub fn with_auto_invite(mut self, target: DurableId) -> Self {
        self.auto_invite_target = Some(target);
        self
    }

    /// Override the invite expiry
    pub fn with_invite_timeout(mut self, timeout: Duration) -> Self {
        self.invite_timeout = timeout;
        self
    }

    /// Override the identity-assignment wait
    pub fn with_identity_wait(mut self, wait: Duration) -> Self {
        self.identity_wait = wait;
        self
    }
}
