//! Connection registry
//!
//! Maps each live transport connection to an opaque
//! [`ConnectionHandle`]. Unregistering synchronously invalidates the
//! handle: any subsequent relay lookup fails immediately, with no
//! stale delivery and no retries. Handles are uuid-backed and never
//! reused.

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::debug;

use crate::types::{ConnectionHandle, ServerFrame};

struct ConnectionEntry {
    tx: mpsc::UnboundedSender<ServerFrame>,
}

/// In-memory registry of live connections
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionHandle, ConnectionEntry>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    /// Register a newly connected transport and issue its handle.
    pub fn register(&self, tx: mpsc::UnboundedSender<ServerFrame>) -> ConnectionHandle {
        let handle = ConnectionHandle::new();
        self.connections.insert(handle, ConnectionEntry { tx });
        debug!(%handle, "connection registered");
        handle
    }

    /// Invalidate a handle. A disconnect is authoritative and
    /// immediate; the handle fails every later lookup.
    pub fn unregister(&self, handle: &ConnectionHandle) {
        if self.connections.remove(handle).is_some() {
            debug!(%handle, "connection unregistered");
        }
    }

    /// Whether the handle still refers to a live connection.
    pub fn is_live(&self, handle: &ConnectionHandle) -> bool {
        self.connections.contains_key(handle)
    }

    /// Push a frame to one connection. Returns `false` if the handle is
    /// gone or its receiver has been dropped. Never blocks on the
    /// receiver processing the frame.
    pub(crate) fn send(&self, handle: &ConnectionHandle, frame: ServerFrame) -> bool {
        match self.connections.get(handle) {
            Some(entry) => entry.tx.send(frame).is_ok(),
            None => false,
        }
    }

    /// Push a frame to every live connection except `skip`.
    pub(crate) fn broadcast_except(&self, skip: &ConnectionHandle, frame: &ServerFrame) {
        for entry in self.connections.iter() {
            if entry.key() != skip {
                let _ = entry.value().tx.send(frame.clone());
            }
        }
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unregistered_handle_is_dead_forever() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let handle = registry.register(tx);
        assert!(registry.is_live(&handle));

        registry.unregister(&handle);
        assert!(!registry.is_live(&handle));
        assert!(!registry.send(&handle, ServerFrame::PeerDisconnected { handle }));
        // a second unregister is a no-op
        registry.unregister(&handle);
        assert!(!registry.is_live(&handle));
    }

    #[test]
    fn send_fails_when_receiver_dropped() {
        let registry = ConnectionRegistry::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = registry.register(tx);
        drop(rx);
        assert!(!registry.send(&handle, ServerFrame::IdentityAssigned { handle }));
    }
}
