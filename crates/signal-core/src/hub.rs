//! Signaling hub
//!
//! Composition root for the relay side: one [`SignalHub`] per
//! signaling process, owning the connection registry, the identity
//! directory and the stateless relay. Endpoints connect to it, receive
//! their assigned handle, authenticate their durable identity, and
//! route control messages to peers.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::info;

use crate::directory::{IdentityDirectory, IdentityStore, InMemoryIdentityStore};
use crate::error::{SignalError, SignalResult};
use crate::registry::ConnectionRegistry;
use crate::relay::{RouteOutcome, SignalingRelay};
use crate::types::{ConnectionHandle, ControlMessage, DurableId, ServerFrame};

pub struct SignalHub {
    registry: Arc<ConnectionRegistry>,
    directory: Arc<IdentityDirectory>,
    relay: SignalingRelay,
}

impl SignalHub {
    pub fn new(store: Arc<dyn IdentityStore>) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let relay = SignalingRelay::new(registry.clone());
        Self {
            registry,
            directory: Arc::new(IdentityDirectory::new(store)),
            relay,
        }
    }

    /// Hub with a purely in-process identity store.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryIdentityStore::new()))
    }

    /// Accept a new transport connection.
    ///
    /// Registers the connection, pushes the `identity-assigned` frame
    /// onto its queue, and hands the receiving half to the endpoint.
    pub fn connect(&self) -> (ConnectionHandle, mpsc::UnboundedReceiver<ServerFrame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = self.registry.register(tx);
        let _ = self
            .registry
            .send(&handle, ServerFrame::IdentityAssigned { handle });
        info!(%handle, "transport connected");
        (handle, rx)
    }

    /// Tear down a connection.
    ///
    /// Invalidates the handle immediately, clears the identity binding
    /// if this connection still owns it, and tells the remaining
    /// connections so in-flight sessions with this peer can end.
    pub async fn disconnect(&self, handle: ConnectionHandle) -> SignalResult<()> {
        self.registry.unregister(&handle);
        if let Some(durable_id) = self.directory.identity_of(&handle) {
            self.directory.unbind_if_current(&durable_id, handle).await?;
        }
        self.registry
            .broadcast_except(&handle, &ServerFrame::PeerDisconnected { handle });
        info!(%handle, "transport disconnected");
        Ok(())
    }

    /// Idempotent identity readback: re-push the `identity-assigned`
    /// frame for a connection that may have missed the original.
    pub fn request_identity(&self, handle: ConnectionHandle) -> SignalResult<()> {
        if self
            .registry
            .send(&handle, ServerFrame::IdentityAssigned { handle })
        {
            Ok(())
        } else {
            Err(SignalError::TargetGone { handle })
        }
    }

    /// Publish the caller's durable identity for its connection.
    /// Called once a party authenticates on a connection; lazily, on
    /// first authenticated action.
    pub async fn authenticate(
        &self,
        durable_id: &DurableId,
        handle: ConnectionHandle,
    ) -> SignalResult<()> {
        self.directory.bind(durable_id, handle).await
    }

    /// Translate a durable case identifier into a live handle.
    pub async fn resolve(&self, durable_id: &DurableId) -> SignalResult<ConnectionHandle> {
        self.directory.resolve(durable_id).await
    }

    /// Route a control message between two handles.
    pub fn route(
        &self,
        from: ConnectionHandle,
        to: ConnectionHandle,
        message: ControlMessage,
    ) -> RouteOutcome {
        self.relay.route(from, to, message)
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn directory(&self) -> &IdentityDirectory {
        &self.directory
    }

    pub fn relay(&self) -> &SignalingRelay {
        &self.relay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_assigns_identity_frame_first() {
        let hub = SignalHub::in_memory();
        let (handle, mut rx) = hub.connect();
        match rx.try_recv().unwrap() {
            ServerFrame::IdentityAssigned { handle: assigned } => assert_eq!(assigned, handle),
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[tokio::test]
    async fn disconnect_invalidates_and_notifies_peers() {
        let hub = SignalHub::in_memory();
        let (a, mut rx_a) = hub.connect();
        let (b, _rx_b) = hub.connect();
        let case = DurableId::from("CASE-2");
        hub.authenticate(&case, b).await.unwrap();

        hub.disconnect(b).await.unwrap();
        assert!(!hub.registry().is_live(&b));
        assert_eq!(hub.route(a, b, ControlMessage::EndCall), RouteOutcome::TargetGone);
        assert!(hub.resolve(&case).await.is_err());

        // a sees the identity frame then the peer loss
        assert!(matches!(rx_a.try_recv().unwrap(), ServerFrame::IdentityAssigned { .. }));
        assert!(matches!(
            rx_a.try_recv().unwrap(),
            ServerFrame::PeerDisconnected { handle } if handle == b
        ));
    }

    #[tokio::test]
    async fn identity_readback_fails_for_a_dead_handle() {
        let hub = SignalHub::in_memory();
        let (handle, mut rx) = hub.connect();
        assert!(matches!(rx.try_recv().unwrap(), ServerFrame::IdentityAssigned { .. }));

        hub.request_identity(handle).unwrap();
        assert!(matches!(rx.try_recv().unwrap(), ServerFrame::IdentityAssigned { .. }));

        hub.disconnect(handle).await.unwrap();
        assert!(matches!(
            hub.request_identity(handle),
            Err(SignalError::TargetGone { handle: gone }) if gone == handle
        ));
    }

    #[tokio::test]
    async fn reconnect_supersedes_stale_binding() {
        let hub = SignalHub::in_memory();
        let case = DurableId::from("CASE-3");
        let (old, _rx_old) = hub.connect();
        hub.authenticate(&case, old).await.unwrap();

        let (new, _rx_new) = hub.connect();
        hub.authenticate(&case, new).await.unwrap();

        // the stale connection drops afterwards; resolution must keep
        // pointing at the reconnect
        hub.disconnect(old).await.unwrap();
        assert_eq!(hub.resolve(&case).await.unwrap(), new);
    }
}
