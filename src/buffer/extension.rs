//! External attribute buffer
//!
//! Pending removals of secondary attribute sets (extensions, operational
//! limits groups), batched per resource type and merged per resource id.

use crate::resource::ResourceType;
use anyhow::Result;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::future::Future;

/// Combines a newly queued value into the one already pending for an id
pub type MergeFn<V> = fn(&mut V, V);

/// Merge for name sets: union
pub fn union_names(pending: &mut BTreeSet<String>, more: BTreeSet<String>) {
    pending.extend(more);
}

/// Pending removals of one variant, keyed by resource type then resource id
///
/// `Clone` gives an independent buffer starting from the same snapshot.
#[derive(Debug, Clone)]
pub struct ExternalAttributeBuffer<V> {
    pending: BTreeMap<ResourceType, HashMap<String, V>>,
    merge: MergeFn<V>,
}

/// Removal buffer of named sets, the shape the store's batch removals take
pub type NameRemovalBuffer = ExternalAttributeBuffer<BTreeSet<String>>;

impl NameRemovalBuffer {
    pub fn for_names() -> Self {
        Self::new(union_names)
    }

    pub fn add_name(&mut self, resource_type: ResourceType, id: &str, name: &str) {
        self.add(resource_type, id, BTreeSet::from([name.to_string()]));
    }

    pub fn contains_name(&self, resource_type: ResourceType, id: &str, name: &str) -> bool {
        self.pending
            .get(&resource_type)
            .and_then(|ids| ids.get(id))
            .is_some_and(|names| names.contains(name))
    }
}

impl<V> ExternalAttributeBuffer<V> {
    pub fn new(merge: MergeFn<V>) -> Self {
        Self {
            pending: BTreeMap::new(),
            merge,
        }
    }

    /// Queue a removal, merging with anything already pending for the id
    pub fn add(&mut self, resource_type: ResourceType, id: &str, value: V) {
        let ids = self.pending.entry(resource_type).or_default();
        match ids.get_mut(id) {
            Some(existing) => (self.merge)(existing, value),
            None => {
                ids.insert(id.to_string(), value);
            }
        }
    }

    /// Drop everything pending for a resource that is itself being removed
    pub fn forget_resource(&mut self, resource_type: ResourceType, id: &str) {
        if let Some(ids) = self.pending.get_mut(&resource_type) {
            ids.remove(id);
            if ids.is_empty() {
                self.pending.remove(&resource_type);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Number of resource ids with pending removals
    pub fn len(&self) -> usize {
        self.pending.values().map(HashMap::len).sum()
    }

    pub fn pending(&self, resource_type: ResourceType) -> Option<&HashMap<String, V>> {
        self.pending.get(&resource_type)
    }

    /// Issue one removal per resource type, in type declaration order
    ///
    /// A type's batch is dropped only after `remove` succeeded for it; the
    /// first failure stops the flush and leaves the remaining types pending.
    pub async fn flush<F, Fut>(&mut self, mut remove: F) -> Result<()>
    where
        V: Clone,
        F: FnMut(ResourceType, HashMap<String, V>) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let types: Vec<_> = self.pending.keys().copied().collect();
        for resource_type in types {
            let Some(batch) = self.pending.get(&resource_type).cloned() else {
                continue;
            };
            remove(resource_type, batch).await?;
            self.pending.remove(&resource_type);
        }
        Ok(())
    }
}
