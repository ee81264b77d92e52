//! Cache handler
//!
//! Owns one [`ReadCache`] per network variant.

use super::read_cache::ReadCache;
use crate::buffer::CollectionIndex;
use crate::resource::VariantKey;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug)]
pub struct CacheHandler {
    caches: CollectionIndex<ReadCache>,
}

impl Default for CacheHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheHandler {
    pub fn new() -> Self {
        Self {
            caches: CollectionIndex::new(ReadCache::new),
        }
    }

    /// Cache of a variant, created empty on first use
    pub fn get_cache(&self, key: VariantKey) -> Arc<ReadCache> {
        self.caches.get_collection(key)
    }

    pub fn get_existing(&self, key: VariantKey) -> Option<Arc<ReadCache>> {
        self.caches.get_existing(key)
    }

    /// Install a prepared cache, e.g. the copy made when cloning a variant
    pub fn install(&self, cache: ReadCache) -> Arc<ReadCache> {
        self.caches.insert(cache.key(), cache)
    }

    /// Drop every cached variant of a network
    ///
    /// Loads still in flight finish against the dropped cache and are lost.
    pub fn invalidate(&self, network_id: Uuid) -> usize {
        let dropped = self.caches.remove_collection(network_id).len();
        if dropped > 0 {
            tracing::debug!("invalidated {} cached variants of {}", dropped, network_id);
        }
        dropped
    }

    pub fn invalidate_variant(&self, key: VariantKey) -> bool {
        self.caches.remove_variant(key).is_some()
    }

    /// Every cached variant, ordered by key
    pub fn cached_variants(&self) -> Vec<VariantKey> {
        self.caches.entries().into_iter().map(|(k, _)| k).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{Attributes, InjectionAttributes, Resource, ResourceRef, ResourceType, TerminalAttributes};

    #[test]
    fn test_invalidate_drops_every_variant_of_network() {
        let handler = CacheHandler::new();
        let id = Uuid::new_v4();
        let other = Uuid::new_v4();
        handler.get_cache(VariantKey::new(id, 0));
        handler.get_cache(VariantKey::new(id, 1));
        handler.get_cache(VariantKey::new(other, 0));

        assert_eq!(handler.invalidate(id), 2);
        assert_eq!(handler.cached_variants(), vec![VariantKey::new(other, 0)]);
    }

    #[test]
    fn test_fresh_cache_after_invalidate() {
        let handler = CacheHandler::new();
        let key = VariantKey::initial(Uuid::new_v4());
        handler.get_cache(key).put(ResourceRef::new(Resource::new(
            "l1",
            0,
            Attributes::Load(InjectionAttributes::new(TerminalAttributes::at_node("vl", 1))),
        )));
        handler.invalidate(key.network_id);
        assert!(handler.get_cache(key).cached(ResourceType::Load, "l1").is_none());
    }
}
