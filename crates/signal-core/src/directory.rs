//! Identity directory
//!
//! Maps a durable case identifier to the current connection handle of
//! the party owning it. The in-process cache sits in front of an
//! external [`IdentityStore`] (database, ledger); a cache miss asks the
//! store, and a store miss surfaces as `IdentityNotFound`.
//!
//! Two races are handled here:
//! - reconnect superseding a stale session: `bind` is last-write-wins
//!   per durable id;
//! - a stale disconnect clobbering a newer reconnect:
//!   `unbind_if_current` only clears the binding when the disconnecting
//!   handle is still the current one.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, warn};

use crate::error::{SignalError, SignalResult};
use crate::types::{ConnectionHandle, DurableId};

/// External persistence for identity bindings.
///
/// Implementations are expected to be idempotent; the directory calls
/// each operation once and does not retry.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Record `handle` as the current connection for `durable_id`,
    /// overwriting any prior binding.
    async fn publish(&self, durable_id: &DurableId, handle: ConnectionHandle) -> SignalResult<()>;

    /// Look up the current connection for `durable_id`.
    async fn lookup(&self, durable_id: &DurableId) -> SignalResult<Option<ConnectionHandle>>;

    /// Clear the binding for `durable_id`, but only if `handle` is
    /// still the recorded one.
    async fn clear_if_current(
        &self,
        durable_id: &DurableId,
        handle: ConnectionHandle,
    ) -> SignalResult<()>;
}

/// Trivial in-memory store, used in tests and single-process setups.
pub struct InMemoryIdentityStore {
    entries: DashMap<DurableId, ConnectionHandle>,
}

impl InMemoryIdentityStore {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

#[async_trait]
impl IdentityStore for InMemoryIdentityStore {
    async fn publish(&self, durable_id: &DurableId, handle: ConnectionHandle) -> SignalResult<()> {
        self.entries.insert(durable_id.clone(), handle);
        Ok(())
    }

    async fn lookup(&self, durable_id: &DurableId) -> SignalResult<Option<ConnectionHandle>> {
        Ok(self.entries.get(durable_id).map(|e| *e.value()))
    }

    async fn clear_if_current(
        &self,
        durable_id: &DurableId,
        handle: ConnectionHandle,
    ) -> SignalResult<()> {
        self.entries.remove_if(durable_id, |_, current| *current == handle);
        Ok(())
    }
}

/// Which layer of a fallback chain answered a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingSource {
    Primary,
    Secondary,
}

/// A binding resolved through a [`FallbackStore`], tagged with the
/// layer that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedBinding {
    pub handle: ConnectionHandle,
    pub source: BindingSource,
}

/// Composable two-layer store: a primary (e.g. ledger-backed) layer
/// with a secondary (e.g. database) standby.
///
/// Writes go to both layers so the secondary can answer when the
/// primary is unavailable; reads prefer the primary and fall back with
/// a typed source tag rather than implicit control flow.
pub struct FallbackStore {
    primary: Arc<dyn IdentityStore>,
    secondary: Arc<dyn IdentityStore>,
}

impl FallbackStore {
    pub fn new(primary: Arc<dyn IdentityStore>, secondary: Arc<dyn IdentityStore>) -> Self {
        Self { primary, secondary }
    }

    /// Resolve through the chain, reporting which layer answered.
    pub async fn lookup_tagged(
        &self,
        durable_id: &DurableId,
    ) -> SignalResult<Option<ResolvedBinding>> {
        match self.primary.lookup(durable_id).await {
            Ok(Some(handle)) => {
                return Ok(Some(ResolvedBinding {
                    handle,
                    source: BindingSource::Primary,
                }))
            }
            Ok(None) => {}
            Err(err) => {
                warn!(%durable_id, %err, "primary identity store lookup failed, trying secondary");
            }
        }
        Ok(self
            .secondary
            .lookup(durable_id)
            .await?
            .map(|handle| ResolvedBinding {
                handle,
                source: BindingSource::Secondary,
            }))
    }
}

#[async_trait]
impl IdentityStore for FallbackStore {
    async fn publish(&self, durable_id: &DurableId, handle: ConnectionHandle) -> SignalResult<()> {
        let primary = self.primary.publish(durable_id, handle).await;
        let secondary = self.secondary.publish(durable_id, handle).await;
        match (primary, secondary) {
            (Err(p), Err(s)) => {
                warn!(%durable_id, primary = %p, secondary = %s, "both identity store layers rejected publish");
                Err(s)
            }
            (Err(p), Ok(())) => {
                warn!(%durable_id, %p, "primary identity store rejected publish, secondary holds the binding");
                Ok(())
            }
            _ => Ok(()),
        }
    }

    async fn lookup(&self, durable_id: &DurableId) -> SignalResult<Option<ConnectionHandle>> {
        Ok(self.lookup_tagged(durable_id).await?.map(|r| r.handle))
    }

    async fn clear_if_current(
        &self,
        durable_id: &DurableId,
        handle: ConnectionHandle,
    ) -> SignalResult<()> {
        let primary = self.primary.clear_if_current(durable_id, handle).await;
        let secondary = self.secondary.clear_if_current(durable_id, handle).await;
        primary.and(secondary)
    }
}

/// Directory of durable-identity-to-connection bindings with an
/// in-process cache over the external store.
pub struct IdentityDirectory {
    cache: DashMap<DurableId, ConnectionHandle>,
    by_handle: DashMap<ConnectionHandle, DurableId>,
    store: Arc<dyn IdentityStore>,
}

impl IdentityDirectory {
    pub fn new(store: Arc<dyn IdentityStore>) -> Self {
        Self {
            cache: DashMap::new(),
            by_handle: DashMap::new(),
            store,
        }
    }

    /// Directory backed only by an in-memory store.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryIdentityStore::new()))
    }

    /// Bind `durable_id` to `handle`, overwriting any prior binding.
    /// Newest connection wins; this models a reconnect superseding a
    /// stale session.
    pub async fn bind(&self, durable_id: &DurableId, handle: ConnectionHandle) -> SignalResult<()> {
        if let Some(previous) = self.cache.insert(durable_id.clone(), handle) {
            self.by_handle
                .remove_if(&previous, |_, owner| owner == durable_id);
        }
        self.by_handle.insert(handle, durable_id.clone());
        self.store.publish(durable_id, handle).await?;
        debug!(%durable_id, %handle, "identity bound");
        Ok(())
    }

    /// Resolve the current connection handle for `durable_id`.
    /// Cache miss falls through to the external store; a store miss is
    /// `IdentityNotFound`.
    pub async fn resolve(&self, durable_id: &DurableId) -> SignalResult<ConnectionHandle> {
        if let Some(handle) = self.cache.get(durable_id) {
            return Ok(*handle.value());
        }
        match self.store.lookup(durable_id).await? {
            Some(handle) => {
                self.cache.insert(durable_id.clone(), handle);
                self.by_handle.insert(handle, durable_id.clone());
                Ok(handle)
            }
            None => Err(SignalError::not_found(durable_id)),
        }
    }

    /// Clear the binding on disconnect, but only if `handle` is still
    /// the current one. Returns whether a binding was cleared.
    pub async fn unbind_if_current(
        &self,
        durable_id: &DurableId,
        handle: ConnectionHandle,
    ) -> SignalResult<bool> {
        let removed = self
            .cache
            .remove_if(durable_id, |_, current| *current == handle)
            .is_some();
        if removed {
            self.by_handle.remove(&handle);
            self.store.clear_if_current(durable_id, handle).await?;
            debug!(%durable_id, %handle, "identity unbound");
        } else {
            debug!(%durable_id, %handle, "stale unbind ignored, a newer connection holds the identity");
        }
        Ok(removed)
    }

    /// Reverse lookup: which durable identity authenticated on `handle`.
    pub fn identity_of(&self, handle: &ConnectionHandle) -> Option<DurableId> {
        self.by_handle.get(handle).map(|e| e.value().clone())
    }
}
