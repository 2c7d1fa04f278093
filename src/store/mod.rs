use tracing::warn;

use crate::config::StoreConfig;
use crate::engine::DataFileEngine;
use crate::{ObjectId, StoreError};

pub mod shared;
pub mod typed;

/// The byte-level store: opaque payloads addressed by stable 64-bit
/// ids, persisted in one data file.
///
/// All operations are blocking and the store is not internally
/// synchronized; callers that need concurrent access wrap it in a
/// [`shared::SharedStore`].
pub struct Store {
    engine: DataFileEngine,
}

impl Store {
    /// Open the store, creating the data file if needed.
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        Ok(Self {
            engine: DataFileEngine::open(config)?,
        })
    }

    /// Persist a payload under a fresh id.
    pub fn store(&mut self, payload: &[u8]) -> Result<ObjectId, StoreError> {
        let index = self.engine.reserve(payload.len() as u64)?;

        if let Err(err) = self.engine.write(&index, payload) {
            // drop the reservation again so a failed store leaves no
            // object with an unwritten payload behind
            if let Err(rollback) = self.engine.free(&index) {
                warn!(id = index.id, %rollback, "could not roll back reservation");
            }
            return Err(err);
        }

        Ok(index.id)
    }

    pub fn read(&mut self, id: ObjectId) -> Result<Vec<u8>, StoreError> {
        let index = self.engine.index_of(id)?;
        self.engine.read(&index)
    }

    /// Replace the payload of `id`. The payload may move; the id never
    /// does.
    pub fn update(&mut self, id: ObjectId, payload: &[u8]) -> Result<(), StoreError> {
        let old = self.engine.index_of(id)?;

        self.engine.free(&old)?;
        let fresh = self.engine.reserve_for(id, payload.len() as u64)?;
        self.engine.write(&fresh, payload)
    }

    pub fn delete(&mut self, id: ObjectId) -> Result<(), StoreError> {
        let index = self.engine.index_of(id)?;
        self.engine.free(&index)
    }

    pub fn contains(&self, id: ObjectId) -> Result<bool, StoreError> {
        self.engine.contains(id)
    }

    /// Snapshot of all live ids, in ascending order.
    pub fn ids(&self) -> Result<Vec<ObjectId>, StoreError> {
        self.engine.ids()
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        self.engine.len()
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        self.engine.is_empty()
    }

    pub fn file_size(&self) -> Result<u64, StoreError> {
        self.engine.file_size()
    }

    /// Reclaim dead space and shrink the data file where possible.
    pub fn compact(&mut self) -> Result<(), StoreError> {
        self.engine.compact()
    }

    /// Flush and release the data file. Every later operation fails
    /// with [`StoreError::Closed`].
    pub fn close(&mut self) -> Result<(), StoreError> {
        self.engine.close()
    }
}
