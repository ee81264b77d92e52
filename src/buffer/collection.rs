//! Collection index
//!
//! Lazily builds and keeps one `T` per network variant. Used for the write
//! buffers, the read caches and the bus caches alike.

use crate::resource::VariantKey;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

type Factory<T> = Box<dyn Fn(VariantKey) -> T + Send + Sync>;

/// Process-wide map of network variant to collection
///
/// Lookups construct at most once per key: the factory runs under the index
/// lock, so it must only allocate. The lock is never held while `T` is used.
pub struct CollectionIndex<T> {
    factory: Factory<T>,
    collections: Mutex<HashMap<VariantKey, Arc<T>>>,
}

impl<T> CollectionIndex<T> {
    pub fn new(factory: impl Fn(VariantKey) -> T + Send + Sync + 'static) -> Self {
        Self {
            factory: Box::new(factory),
            collections: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<VariantKey, Arc<T>>> {
        self.collections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Existing collection of a variant, or a new one from the factory
    pub fn get_collection(&self, key: VariantKey) -> Arc<T> {
        self.lock()
            .entry(key)
            .or_insert_with(|| Arc::new((self.factory)(key)))
            .clone()
    }

    pub fn get_existing(&self, key: VariantKey) -> Option<Arc<T>> {
        self.lock().get(&key).cloned()
    }

    /// Install a prepared collection, replacing any existing one
    pub fn insert(&self, key: VariantKey, collection: T) -> Arc<T> {
        let collection = Arc::new(collection);
        self.lock().insert(key, collection.clone());
        collection
    }

    /// Drop every variant of a network, returning what was dropped
    ///
    /// Unflushed writes held by a dropped buffer are lost.
    pub fn remove_collection(&self, network_id: Uuid) -> Vec<(VariantKey, Arc<T>)> {
        let mut collections = self.lock();
        let keys: Vec<_> = collections
            .keys()
            .filter(|k| k.network_id == network_id)
            .copied()
            .collect();
        let mut removed: Vec<_> = keys
            .into_iter()
            .filter_map(|k| collections.remove(&k).map(|c| (k, c)))
            .collect();
        removed.sort_by_key(|(k, _)| *k);
        removed
    }

    pub fn remove_variant(&self, key: VariantKey) -> Option<Arc<T>> {
        self.lock().remove(&key)
    }

    /// Snapshot of every tracked collection, ordered by key
    pub fn entries(&self) -> Vec<(VariantKey, Arc<T>)> {
        let mut entries: Vec<_> = self
            .lock()
            .iter()
            .map(|(k, c)| (*k, c.clone()))
            .collect();
        entries.sort_by_key(|(k, _)| *k);
        entries
    }

    /// Snapshot of one network's collections, ordered by variant number
    pub fn network_entries(&self, network_id: Uuid) -> Vec<(VariantKey, Arc<T>)> {
        let mut entries: Vec<_> = self
            .lock()
            .iter()
            .filter(|(k, _)| k.network_id == network_id)
            .map(|(k, c)| (*k, c.clone()))
            .collect();
        entries.sort_by_key(|(k, _)| *k);
        entries
    }

    /// Call `f` on every tracked collection
    ///
    /// Iterates over a snapshot, so `f` may itself use the index.
    pub fn apply_to_all(&self, mut f: impl FnMut(VariantKey, &T)) {
        for (key, collection) in self.entries() {
            f(key, &collection);
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl<T> std::fmt::Debug for CollectionIndex<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionIndex")
            .field("collections", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_factory_runs_once_per_key() {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = built.clone();
        let index = CollectionIndex::new(move |k: VariantKey| {
            counter.fetch_add(1, Ordering::SeqCst);
            k.variant_num
        });
        let key = VariantKey::initial(Uuid::new_v4());
        let a = index.get_collection(key);
        let b = index.get_collection(key);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(built.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_construction_is_shared() {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = built.clone();
        let index = Arc::new(CollectionIndex::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Mutex::new(Vec::<i32>::new())
        }));
        let key = VariantKey::initial(Uuid::new_v4());

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let index = index.clone();
                std::thread::spawn(move || {
                    index.get_collection(key).lock().unwrap().push(i);
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(built.load(Ordering::SeqCst), 1);
        assert_eq!(index.get_collection(key).lock().unwrap().len(), 16);
    }

    #[test]
    fn test_remove_collection_drops_every_variant() {
        let index = CollectionIndex::new(|k: VariantKey| k.variant_num);
        let kept = Uuid::new_v4();
        let dropped = Uuid::new_v4();
        index.get_collection(VariantKey::new(dropped, 0));
        index.get_collection(VariantKey::new(dropped, 1));
        index.get_collection(VariantKey::new(kept, 0));

        let removed = index.remove_collection(dropped);
        assert_eq!(removed.len(), 2);
        let remaining: Vec<_> = index.entries().into_iter().map(|(k, _)| k).collect();
        assert_eq!(remaining, vec![VariantKey::new(kept, 0)]);
    }

    #[test]
    fn test_apply_to_all_may_reenter() {
        let index = CollectionIndex::new(|k: VariantKey| k.variant_num);
        let id = Uuid::new_v4();
        index.get_collection(VariantKey::new(id, 0));
        index.get_collection(VariantKey::new(id, 3));

        let mut seen = Vec::new();
        index.apply_to_all(|k, v| {
            assert!(index.get_existing(k).is_some());
            seen.push(*v);
        });
        assert_eq!(seen, vec![0, 3]);
    }
}
