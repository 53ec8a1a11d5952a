//! Signaling relay
//!
//! Stateless message router. Given a target connection handle and a
//! control message, it wraps the message in an [`Envelope`] and pushes
//! it onto the target's transport queue, or reports the target gone.
//! The relay never inspects payload semantics beyond routing and never
//! blocks waiting for the target to process a frame.

use std::sync::Arc;

use tracing::{trace, warn};

use crate::error::{SignalError, SignalResult};
use crate::registry::ConnectionRegistry;
use crate::types::{ConnectionHandle, ControlMessage, Envelope, ServerFrame};

/// Outcome of a routing attempt. `TargetGone` is authoritative; callers
/// must surface it to their user rather than retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    Delivered,
    TargetGone,
}

/// Stateless router over the connection registry
pub struct SignalingRelay {
    registry: Arc<ConnectionRegistry>,
}

impl SignalingRelay {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Route one control message from `from` to `to`.
    ///
    /// Fire-and-forget: delivery is acknowledged only at transport
    /// level. Returns [`RouteOutcome::TargetGone`] synchronously when
    /// the target handle is no longer live.
    pub fn route(
        &self,
        from: ConnectionHandle,
        to: ConnectionHandle,
        message: ControlMessage,
    ) -> RouteOutcome {
        if !self.registry.is_live(&to) {
            trace!(%from, %to, kind = message.kind(), "route target gone");
            return RouteOutcome::TargetGone;
        }
        let kind = message.kind();
        let frame = ServerFrame::Relayed(Envelope { from, to, message });
        if self.registry.send(&to, frame) {
            trace!(%from, %to, kind, "frame relayed");
            RouteOutcome::Delivered
        } else {
            RouteOutcome::TargetGone
        }
    }

    /// Route a raw JSON frame arriving at the relay boundary.
    ///
    /// Untyped transports land here; malformed frames are rejected with
    /// an error instead of being forwarded blindly.
    pub fn route_raw(&self, frame: serde_json::Value) -> SignalResult<RouteOutcome> {
        let envelope = parse_frame(frame)?;
        Ok(self.route(envelope.from, envelope.to, envelope.message))
    }
}

/// Validate a raw JSON frame against the envelope schema.
pub fn parse_frame(frame: serde_json::Value) -> SignalResult<Envelope> {
    serde_json::from_value(frame).map_err(|err| {
        warn!(%err, "rejecting malformed signaling frame");
        SignalError::malformed(err.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::mpsc;

    fn setup() -> (Arc<ConnectionRegistry>, SignalingRelay) {
        let registry = Arc::new(ConnectionRegistry::new());
        let relay = SignalingRelay::new(registry.clone());
        (registry, relay)
    }

    #[test]
    fn routes_to_live_target_and_reports_gone_after_unregister() {
        let (registry, relay) = setup();
        let (tx_a, _rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        let a = registry.register(tx_a);
        let b = registry.register(tx_b);

        let outcome = relay.route(a, b, ControlMessage::EndCall);
        assert_eq!(outcome, RouteOutcome::Delivered);
        match rx_b.try_recv().unwrap() {
            ServerFrame::Relayed(envelope) => {
                assert_eq!(envelope.from, a);
                assert_eq!(envelope.to, b);
                assert_eq!(envelope.message, ControlMessage::EndCall);
            }
            other => panic!("unexpected frame: {other:?}"),
        }

        registry.unregister(&b);
        assert_eq!(relay.route(a, b, ControlMessage::EndCall), RouteOutcome::TargetGone);
    }

    #[test]
    fn malformed_frames_are_rejected_at_the_boundary() {
        let (_registry, relay) = setup();
        let err = relay
            .route_raw(json!({ "type": "invite", "whatever": 1 }))
            .unwrap_err();
        assert!(matches!(err, SignalError::MalformedFrame { .. }));
    }

    #[test]
    fn well_formed_raw_frame_is_routed() {
        let (registry, relay) = setup();
        let (tx_a, _rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        let a = registry.register(tx_a);
        let b = registry.register(tx_b);

        let frame = serde_json::to_value(Envelope {
            from: a,
            to: b,
            message: ControlMessage::ChatText {
                text: "hello".into(),
                sender_name: "agent".into(),
            },
        })
        .unwrap();

        assert_eq!(relay.route_raw(frame).unwrap(), RouteOutcome::Delivered);
        assert!(matches!(rx_b.try_recv().unwrap(), ServerFrame::Relayed(_)));
    }
}
