use std::collections::HashMap;
use std::sync::{Arc, Weak};

use tracing::debug;

use crate::codec::ObjectCodec;
use crate::config::StoreConfig;
use crate::store::Store;
use crate::{ObjectId, StoreError};

/// A typed view over a [`Store`]: payloads are encoded and decoded
/// through an [`ObjectCodec`], and decoded values are kept in a weak
/// cache so repeated reads of a value that the host still holds do not
/// touch the file.
///
/// Cache lookups fall through to the engine whenever the entry is
/// missing or already dropped; the cache never extends a value's
/// lifetime.
pub struct ObjectStore<T, C> {
    store: Store,
    codec: C,
    cache: HashMap<ObjectId, Weak<T>>,
}

impl<T, C> ObjectStore<T, C>
where
    C: ObjectCodec<T>,
{
    pub fn open(config: StoreConfig, codec: C) -> Result<Self, StoreError> {
        Ok(Self {
            store: Store::open(config)?,
            codec,
            cache: HashMap::new(),
        })
    }

    pub fn from_store(store: Store, codec: C) -> Self {
        Self {
            store,
            codec,
            cache: HashMap::new(),
        }
    }

    /// Persist a value under a fresh id.
    pub fn insert(&mut self, value: &T) -> Result<ObjectId, StoreError> {
        let payload = self.codec.encode_to_vec(value)?;
        self.store.store(&payload)
    }

    /// Fetch a value, serving it from the weak cache when the host
    /// still holds a strong reference to it.
    pub fn get(&mut self, id: ObjectId) -> Result<Arc<T>, StoreError> {
        if let Some(cached) = self.cache.get(&id).and_then(Weak::upgrade) {
            debug!(id, "value served from cache");
            return Ok(cached);
        }

        let payload = self.store.read(id)?;
        let value = Arc::new(self.codec.decode_from_slice(&payload)?);
        self.cache.insert(id, Arc::downgrade(&value));

        Ok(value)
    }

    /// Replace the value stored under `id`.
    pub fn set(&mut self, id: ObjectId, value: &T) -> Result<(), StoreError> {
        let payload = self.codec.encode_to_vec(value)?;
        self.store.update(id, &payload)?;
        self.cache.remove(&id);
        Ok(())
    }

    pub fn remove(&mut self, id: ObjectId) -> Result<(), StoreError> {
        self.store.delete(id)?;
        self.cache.remove(&id);
        Ok(())
    }

    pub fn contains(&self, id: ObjectId) -> Result<bool, StoreError> {
        self.store.contains(id)
    }

    pub fn ids(&self) -> Result<Vec<ObjectId>, StoreError> {
        self.store.ids()
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        self.store.len()
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        self.store.is_empty()
    }

    /// Materialize every value, over a snapshot of the id set taken
    /// before the first read.
    pub fn iter(&mut self) -> Result<Vec<(ObjectId, Arc<T>)>, StoreError> {
        self.store
            .ids()?
            .into_iter()
            .map(|id| Ok((id, self.get(id)?)))
            .collect()
    }

    /// Materialize every value whose decoded form matches `predicate`,
    /// over a snapshot of the id set.
    pub fn find(
        &mut self,
        predicate: impl Fn(&T) -> bool,
    ) -> Result<Vec<(ObjectId, Arc<T>)>, StoreError> {
        let matches = self
            .iter()?
            .into_iter()
            .filter(|(_, value)| predicate(value))
            .collect();

        Ok(matches)
    }

    pub fn compact(&mut self) -> Result<(), StoreError> {
        self.cache.retain(|_, weak| weak.strong_count() > 0);
        self.store.compact()
    }

    pub fn close(&mut self) -> Result<(), StoreError> {
        self.cache.clear();
        self.store.close()
    }
}
