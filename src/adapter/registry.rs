//! Registry of open adapters.
//!
//! Ids are assigned sequentially starting from 1. A closed adapter is
//! removed; its id is not reused.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{Adapter, AdapterBuilder, AdapterId};
use crate::error::{DriverError, Result};
use crate::transport::Transport;

/// Open adapters by id.
pub struct AdapterRegistry {
    adapters: RwLock<HashMap<AdapterId, Arc<Adapter>>>,
    next_id: AtomicU32,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self {
            adapters: RwLock::new(HashMap::new()),
            next_id: AtomicU32::new(1),
        }
    }

    /// Open an adapter with a freshly assigned id and register it.
    pub fn open<T>(&self, builder: AdapterBuilder, transport: T) -> Result<Arc<Adapter>>
    where
        T: Transport + 'static,
    {
        let id = AdapterId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let adapter = Arc::new(builder.id(id).open(transport)?);
        self.write().insert(id, adapter.clone());
        Ok(adapter)
    }

    pub fn get(&self, id: AdapterId) -> Option<Arc<Adapter>> {
        self.read().get(&id).cloned()
    }

    /// Unregister and close an adapter.
    pub fn close(&self, id: AdapterId) -> Result<()> {
        let adapter = self.write().remove(&id).ok_or(DriverError::Closed)?;
        adapter.close()
    }

    /// Close every registered adapter, returning the first error.
    pub fn close_all(&self) -> Result<()> {
        let adapters: Vec<_> = self.write().drain().map(|(_, a)| a).collect();
        let mut first_error = None;
        for adapter in adapters {
            if let Err(e) = adapter.close() {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Registered ids in ascending order.
    pub fn ids(&self) -> Vec<AdapterId> {
        let mut ids: Vec<_> = self.read().keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<AdapterId, Arc<Adapter>>> {
        self.adapters.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<AdapterId, Arc<Adapter>>> {
        self.adapters.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}
