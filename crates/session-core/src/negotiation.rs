//! Peer negotiation coordinator
//!
//! Sequencing only: exactly one offer-direction payload and one
//! answer-direction payload must be exchanged before negotiation may
//! complete, negotiation never begins before the call is accepted and
//! never continues after cancellation. Payload contents are opaque;
//! they are produced and consumed by the external peer-transport
//! library behind [`PeerTransport`].

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{SessionError, SessionResult};

/// Role of this endpoint in the current call attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallRole {
    /// Originated the invite; produces the offer, consumes the answer
    Caller,
    /// Received the invite; consumes the offer, produces the answer
    Callee,
}

/// External peer-transport library establishing the direct media path.
/// Treated as a black box; payloads are opaque blobs.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Produce the offer-direction payload for a new outbound call.
    async fn create_offer(&self) -> SessionResult<Value>;

    /// Consume the remote offer and produce the answer-direction
    /// payload.
    async fn answer_offer(&self, offer: &Value) -> SessionResult<Value>;

    /// Consume the remote answer, completing the handshake.
    async fn apply_answer(&self, answer: &Value) -> SessionResult<()>;

    /// Tear down the media path.
    async fn close(&self);
}

/// In-process stand-in for a real peer transport. Produces synthetic
/// payloads; used by tests and single-process demos.
pub struct LoopbackPeerTransport;

#[async_trait]
impl PeerTransport for LoopbackPeerTransport {
    async fn create_offer(&self) -> SessionResult<Value> {
        Ok(serde_json::json!({ "type": "offer", "sdp": uuid::Uuid::new_v4().to_string() }))
    }

    async fn answer_offer(&self, offer: &Value) -> SessionResult<Value> {
        if offer.get("type").and_then(Value::as_str) != Some("offer") {
            return Err(SessionError::negotiation("remote payload is not an offer"));
        }
        Ok(serde_json::json!({ "type": "answer", "sdp": uuid::Uuid::new_v4().to_string() }))
    }

    async fn apply_answer(&self, answer: &Value) -> SessionResult<()> {
        if answer.get("type").and_then(Value::as_str) != Some("answer") {
            return Err(SessionError::negotiation("remote payload is not an answer"));
        }
        Ok(())
    }

    async fn close(&self) {}
}

/// Tracks the two-message handshake for one call attempt.
#[derive(Debug)]
pub struct NegotiationCoordinator {
    role: CallRole,
    offer_recorded: bool,
    answer_recorded: bool,
    accepted: bool,
    cancelled: bool,
}

impl NegotiationCoordinator {
    pub fn new(role: CallRole) -> Self {
        Self {
            role,
            offer_recorded: false,
            answer_recorded: false,
            accepted: false,
            cancelled: false,
        }
    }

    pub fn role(&self) -> CallRole {
        self.role
    }

    /// The call was accepted; answer-direction payloads may now flow.
    pub fn mark_accepted(&mut self) {
        self.accepted = true;
    }

    /// Record the offer-direction payload. The offer travels with the
    /// invite, so acceptance is not required yet.
    pub fn record_offer(&mut self) -> SessionResult<()> {
        if self.cancelled {
            return Err(SessionError::negotiation("negotiation was cancelled"));
        }
        if self.offer_recorded {
            return Err(SessionError::negotiation("duplicate offer payload"));
        }
        self.offer_recorded = true;
        Ok(())
    }

    /// Record the answer-direction payload. Requires acceptance and a
    /// prior offer; reversing the order blocks progression.
    pub fn record_answer(&mut self) -> SessionResult<()> {
        if self.cancelled {
            return Err(SessionError::negotiation("negotiation was cancelled"));
        }
        if !self.accepted {
            return Err(SessionError::negotiation("answer payload before accept"));
        }
        if !self.offer_recorded {
            return Err(SessionError::negotiation("answer payload before offer"));
        }
        if self.answer_recorded {
            return Err(SessionError::negotiation("duplicate answer payload"));
        }
        self.answer_recorded = true;
        Ok(())
    }

    /// Discard the handshake. No payload arriving afterwards may
    /// resurrect the session.
    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    /// Whether exactly one payload flowed in each direction after
    /// acceptance.
    pub fn is_complete(&self) -> bool {
        self.accepted && self.offer_recorded && self.answer_recorded && !self.cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_requires_offer_then_answer_after_accept() {
        let mut negotiation = NegotiationCoordinator::new(CallRole::Caller);
        assert!(!negotiation.is_complete());

        negotiation.record_offer().unwrap();
        // answer before accept must block
        assert!(negotiation.record_answer().is_err());
        assert!(!negotiation.is_complete());

        negotiation.mark_accepted();
        negotiation.record_answer().unwrap();
        assert!(negotiation.is_complete());
    }

    #[test]
    fn answer_before_offer_blocks_progression() {
        let mut negotiation = NegotiationCoordinator::new(CallRole::Callee);
        negotiation.mark_accepted();
        assert!(negotiation.record_answer().is_err());
        assert!(!negotiation.is_complete());
    }

    #[test]
    fn duplicate_payloads_are_rejected() {
        let mut negotiation = NegotiationCoordinator::new(CallRole::Caller);
        negotiation.record_offer().unwrap();
        assert!(negotiation.record_offer().is_err());

        negotiation.mark_accepted();
        negotiation.record_answer().unwrap();
        assert!(negotiation.record_answer().is_err());
        assert!(negotiation.is_complete());
    }

    #[test]
    fn cancellation_discards_pending_negotiation() {
        let mut negotiation = NegotiationCoordinator::new(CallRole::Caller);
        negotiation.record_offer().unwrap();
        negotiation.mark_accepted();
        negotiation.cancel();

        assert!(negotiation.record_answer().is_err());
        assert!(!negotiation.is_complete());
    }

    #[tokio::test]
    async fn loopback_transport_round_trip() {
        let transport = LoopbackPeerTransport;
        let offer = transport.create_offer().await.unwrap();
        let answer = transport.answer_offer(&offer).await.unwrap();
        transport.apply_answer(&answer).await.unwrap();

        // a malformed blob propagates as a negotiation failure
        assert!(transport
            .apply_answer(&serde_json::json!({ "garbage": true }))
            .await
            .is_err());
    }
}
