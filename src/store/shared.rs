use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::StoreConfig;
use crate::store::Store;
use crate::{ObjectId, StoreError};

/// A cloneable, thread-safe handle over a [`Store`]: one coarse mutex
/// held for the whole duration of every operation.
///
/// This is the full extent of the concurrency story; there is no
/// finer-grained locking and no multi-process support.
#[derive(Clone)]
pub struct SharedStore {
    inner: Arc<Mutex<Store>>,
}

impl SharedStore {
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        Ok(Self::new(Store::open(config)?))
    }

    pub fn new(store: Store) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Store>, StoreError> {
        self.inner.lock().map_err(|_| StoreError::LockPoisoned)
    }

    pub fn store(&self, payload: &[u8]) -> Result<ObjectId, StoreError> {
        self.lock()?.store(payload)
    }

    pub fn read(&self, id: ObjectId) -> Result<Vec<u8>, StoreError> {
        self.lock()?.read(id)
    }

    pub fn update(&self, id: ObjectId, payload: &[u8]) -> Result<(), StoreError> {
        self.lock()?.update(id, payload)
    }

    pub fn delete(&self, id: ObjectId) -> Result<(), StoreError> {
        self.lock()?.delete(id)
    }

    pub fn contains(&self, id: ObjectId) -> Result<bool, StoreError> {
        self.lock()?.contains(id)
    }

    pub fn ids(&self) -> Result<Vec<ObjectId>, StoreError> {
        self.lock()?.ids()
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        self.lock()?.len()
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        self.lock()?.is_empty()
    }

    pub fn file_size(&self) -> Result<u64, StoreError> {
        self.lock()?.file_size()
    }

    pub fn compact(&self) -> Result<(), StoreError> {
        self.lock()?.compact()
    }

    pub fn close(&self) -> Result<(), StoreError> {
        self.lock()?.close()
    }
}
