//! Entity lookup used to hydrate query hits.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::schema::IndexedEntity;

/// Source of live entities, consulted by key for every hydrated hit.
///
/// A miss is not an error: the index may briefly list entities the store
/// has already dropped.
pub trait EntityCache<E: IndexedEntity>: Send + Sync {
    fn get(&self, key: &E::Key) -> Option<E>;
}

impl<E, F> EntityCache<E> for F
where
    E: IndexedEntity,
    F: Fn(&E::Key) -> Option<E> + Send + Sync,
{
    fn get(&self, key: &E::Key) -> Option<E> {
        self(key)
    }
}

/// Map-backed cache for tests and embedded callers.
pub struct InMemoryEntityCache<E: IndexedEntity> {
    entries: RwLock<HashMap<E::Key, E>>,
}

impl<E: IndexedEntity> InMemoryEntityCache<E> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Store an entity under its key, returning the previous one.
    pub fn insert(&self, entity: E) -> Option<E> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(entity.key(), entity)
    }

    pub fn remove(&self, key: &E::Key) -> Option<E> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<E: IndexedEntity> Default for InMemoryEntityCache<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: IndexedEntity> FromIterator<E> for InMemoryEntityCache<E> {
    fn from_iter<I: IntoIterator<Item = E>>(iter: I) -> Self {
        let cache = Self::new();
        for entity in iter {
            cache.insert(entity);
        }
        cache
    }
}

impl<E: IndexedEntity> EntityCache<E> for InMemoryEntityCache<E> {
    fn get(&self, key: &E::Key) -> Option<E> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }
}
