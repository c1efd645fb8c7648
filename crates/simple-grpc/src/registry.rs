//! Table of running server instances.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use simple_core::InstanceId;
use thiserror::Error;
use tokio::runtime::Handle;

use crate::bridge::SubscriberSlot;
use crate::transport::{Listener, TransportError, WorkerGroup};

/// Shared handle to an instance's listener.
pub type SharedListener = Arc<tokio::sync::Mutex<Listener>>;

/// Errors from registry lookups and inserts.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// An instance with this id is already starting or running
    #[error("{0} is already registered")]
    Occupied(InstanceId),
    /// No instance with this id
    #[error("{0} is not registered")]
    Unknown(InstanceId),
    /// The instance exists but has not finished binding
    #[error("{0} is still starting")]
    Starting(InstanceId),
    /// The worker group could not be created
    #[error(transparent)]
    Worker(#[from] TransportError),
}

/// Resources owned on behalf of one instance.
#[derive(Debug)]
struct Instance {
    worker: WorkerGroup,
    listener: Option<SharedListener>,
    port: Option<u16>,
    slot: Arc<SubscriberSlot>,
}

/// What a freshly reserved instance needs to bind.
#[derive(Debug)]
pub struct Reservation {
    /// Runtime to bind and serve on
    pub worker: Handle,
    /// Slot the instance's service delivers into
    pub slot: Arc<SubscriberSlot>,
}

/// Instances keyed by [`InstanceId`].
///
/// One lock guards the table. Listener shutdown and message delivery use
/// their own locks so neither holds the table while it waits.
#[derive(Debug, Default)]
pub struct Registry {
    instances: Mutex<HashMap<InstanceId, Instance>>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, HashMap<InstanceId, Instance>> {
        self.instances.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim `id` and allocate its worker group.
    ///
    /// The check and the insert happen under one lock, so two concurrent
    /// starts for the same id cannot both allocate a worker group.
    pub fn reserve(
        &self,
        id: InstanceId,
        worker_threads: usize,
    ) -> Result<Reservation, RegistryError> {
        let mut table = self.table();
        if table.contains_key(&id) {
            return Err(RegistryError::Occupied(id));
        }

        let worker = WorkerGroup::new(worker_threads)?;
        let handle = worker.handle().ok_or(TransportError::Released)?;
        let slot = Arc::new(SubscriberSlot::new());
        table.insert(
            id,
            Instance {
                worker,
                listener: None,
                port: None,
                slot: Arc::clone(&slot),
            },
        );

        Ok(Reservation {
            worker: handle,
            slot,
        })
    }

    /// Record the bound listener for a reserved instance.
    ///
    /// Hands the listener back if the instance vanished in the meantime.
    pub fn attach_listener(&self, id: InstanceId, listener: Listener) -> Result<u16, Listener> {
        let mut table = self.table();
        let Some(instance) = table.get_mut(&id) else {
            return Err(listener);
        };

        let port = listener.port();
        instance.port = Some(port);
        instance.listener = Some(Arc::new(tokio::sync::Mutex::new(listener)));
        Ok(port)
    }

    /// The bound port of a running instance.
    pub fn port(&self, id: InstanceId) -> Option<u16> {
        self.table().get(&id).and_then(|i| i.port)
    }

    /// The listener of a running instance.
    pub fn listener(&self, id: InstanceId) -> Result<SharedListener, RegistryError> {
        let table = self.table();
        let instance = table.get(&id).ok_or(RegistryError::Unknown(id))?;
        instance
            .listener
            .as_ref()
            .map(Arc::clone)
            .ok_or(RegistryError::Starting(id))
    }

    /// The subscriber slot of a registered instance.
    pub fn slot(&self, id: InstanceId) -> Option<Arc<SubscriberSlot>> {
        self.table().get(&id).map(|i| Arc::clone(&i.slot))
    }

    /// Remove `id` and release its worker group. Returns whether it existed.
    pub fn release(&self, id: InstanceId) -> bool {
        let removed = self.table().remove(&id);
        match removed {
            Some(mut instance) => {
                instance.worker.release();
                true
            }
            None => false,
        }
    }

    /// Whether `id` is registered.
    pub fn contains(&self, id: InstanceId) -> bool {
        self.table().contains_key(&id)
    }

    /// Number of registered instances.
    pub fn len(&self) -> usize {
        self.table().len()
    }

    /// Whether no instance is registered.
    pub fn is_empty(&self) -> bool {
        self.table().is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reserve_rejects_occupied_id() {
        let registry = Registry::new();
        let id = InstanceId::new();

        registry.reserve(id, 1).unwrap();
        let err = registry.reserve(id, 1).unwrap_err();
        assert!(matches!(err, RegistryError::Occupied(other) if other == id));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_reserved_instance_is_starting() {
        let registry = Registry::new();
        let id = InstanceId::new();
        registry.reserve(id, 1).unwrap();

        assert!(registry.contains(id));
        assert_eq!(registry.port(id), None);
        assert!(matches!(
            registry.listener(id),
            Err(RegistryError::Starting(_))
        ));
        assert!(registry.slot(id).is_some());
    }

    #[tokio::test]
    async fn test_release() {
        let registry = Registry::new();
        let id = InstanceId::new();
        registry.reserve(id, 1).unwrap();

        assert!(registry.release(id));
        assert!(!registry.release(id));
        assert!(registry.is_empty());
        assert!(matches!(
            registry.listener(id),
            Err(RegistryError::Unknown(_))
        ));
    }

    #[tokio::test]
    async fn test_many_instances() {
        let registry = Registry::new();
        let ids: Vec<_> = (0..3).map(|_| InstanceId::new()).collect();
        for id in &ids {
            registry.reserve(*id, 1).unwrap();
        }
        assert_eq!(registry.len(), 3);

        registry.release(ids[1]);
        assert!(registry.contains(ids[0]));
        assert!(!registry.contains(ids[1]));
        assert!(registry.contains(ids[2]));
    }
}
