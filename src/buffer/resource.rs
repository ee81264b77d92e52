//! Resource write buffer
//!
//! Pending creates, updates and removes of one resource type in one network
//! variant, coalesced until the next flush.

use crate::resource::{ResourceRef, ResourceType, VariantKey};
use crate::store::NetworkStoreClient;
use anyhow::Result;
use std::collections::HashMap;

/// A buffered write, remembering when it was first queued
#[derive(Debug, Clone)]
struct Pending {
    seq: u64,
    resource: ResourceRef,
}

/// Number of pending operations per kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingCounts {
    pub create: usize,
    pub update: usize,
    pub remove: usize,
}

impl PendingCounts {
    pub fn total(&self) -> usize {
        self.create + self.update + self.remove
    }
}

impl std::ops::AddAssign for PendingCounts {
    fn add_assign(&mut self, other: Self) {
        self.create += other.create;
        self.update += other.update;
        self.remove += other.remove;
    }
}

/// Write buffer of one resource type
///
/// An id is never pending create and pending update at the same time. Each
/// collection keeps first-insertion order, which is the order ids are sent in.
#[derive(Debug, Clone)]
pub struct ResourceWriteBuffer {
    resource_type: ResourceType,
    next_seq: u64,
    create: HashMap<String, Pending>,
    update: HashMap<String, Pending>,
    remove: HashMap<String, u64>,
}

impl ResourceWriteBuffer {
    pub fn new(resource_type: ResourceType) -> Self {
        Self {
            resource_type,
            next_seq: 0,
            create: HashMap::new(),
            update: HashMap::new(),
            remove: HashMap::new(),
        }
    }

    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    fn seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    /// Queue a create, replacing any queued create of the same id
    pub fn create(&mut self, resource: ResourceRef) {
        let id = resource.id();
        self.update.remove(&id);
        if let Some(pending) = self.create.get_mut(&id) {
            pending.resource = resource;
            return;
        }
        let seq = self.seq();
        self.create.insert(id, Pending { seq, resource });
    }

    /// Queue an update
    ///
    /// A resource still pending create has never reached the store; its
    /// create will carry the latest state, so no update is queued.
    pub fn update(&mut self, resource: ResourceRef) {
        let id = resource.id();
        if let Some(pending) = self.create.get_mut(&id) {
            if !pending.resource.ptr_eq(&resource) {
                pending.resource = resource;
            }
            return;
        }
        if let Some(pending) = self.update.get_mut(&id) {
            pending.resource = resource;
            return;
        }
        let seq = self.seq();
        self.update.insert(id, Pending { seq, resource });
    }

    pub fn remove(&mut self, id: &str) {
        self.remove_all([id]);
    }

    /// Queue removals
    ///
    /// Ids only pending create are simply forgotten; the store never saw them.
    pub fn remove_all<'a>(&mut self, ids: impl IntoIterator<Item = &'a str>) {
        for id in ids {
            if self.create.remove(id).is_some() {
                continue;
            }
            self.update.remove(id);
            if !self.remove.contains_key(id) {
                let seq = self.seq();
                self.remove.insert(id.to_string(), seq);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.create.is_empty() && self.update.is_empty() && self.remove.is_empty()
    }

    pub fn counts(&self) -> PendingCounts {
        PendingCounts {
            create: self.create.len(),
            update: self.update.len(),
            remove: self.remove.len(),
        }
    }

    pub fn is_pending_create(&self, id: &str) -> bool {
        self.create.contains_key(id)
    }

    pub fn is_pending_update(&self, id: &str) -> bool {
        self.update.contains_key(id)
    }

    pub fn is_pending_remove(&self, id: &str) -> bool {
        self.remove.contains_key(id)
    }

    fn ordered(pending: &HashMap<String, Pending>) -> Vec<&Pending> {
        let mut entries: Vec<_> = pending.values().collect();
        entries.sort_by_key(|p| p.seq);
        entries
    }

    /// Ids pending removal, in queue order
    pub fn pending_removals(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.remove.iter().collect();
        ids.sort_by_key(|(_, seq)| **seq);
        ids.into_iter().map(|(id, _)| id.clone()).collect()
    }

    /// Send pending operations: removes, then creates, then updates
    ///
    /// Each phase is cleared only once its remote call succeeded; a failure
    /// returns the store error unchanged and leaves that phase and the
    /// following ones pending.
    pub async fn flush(&mut self, client: &dyn NetworkStoreClient, key: VariantKey) -> Result<()> {
        if !self.remove.is_empty() {
            let ids = self.pending_removals();
            tracing::debug!(
                "flush {}: removing {} {} resources",
                key,
                ids.len(),
                self.resource_type
            );
            client
                .remove_resources(key.network_id, key.variant_num, self.resource_type, ids)
                .await?;
            self.remove.clear();
        }

        if !self.create.is_empty() {
            let resources: Vec<_> = Self::ordered(&self.create)
                .into_iter()
                .map(|p| p.resource.snapshot())
                .collect();
            tracing::debug!(
                "flush {}: creating {} {} resources",
                key,
                resources.len(),
                self.resource_type
            );
            client
                .create_resources(key.network_id, self.resource_type, resources)
                .await?;
            self.create.clear();
        }

        if !self.update.is_empty() {
            let resources: Vec<_> = Self::ordered(&self.update)
                .into_iter()
                .map(|p| p.resource.snapshot())
                .collect();
            tracing::debug!(
                "flush {}: updating {} {} resources",
                key,
                resources.len(),
                self.resource_type
            );
            client
                .update_resources(key.network_id, self.resource_type, resources)
                .await?;
            self.update.clear();
        }

        Ok(())
    }

    /// Copy of this buffer for another variant
    ///
    /// `resolve` maps an id to the target variant's own handle; ids it cannot
    /// resolve get a detached deep copy.
    pub fn clone_for_variant(
        &self,
        variant_num: i32,
        resolve: impl Fn(&str) -> Option<ResourceRef>,
    ) -> Self {
        let retarget = |pending: &HashMap<String, Pending>| -> HashMap<String, Pending> {
            pending
                .iter()
                .map(|(id, p)| {
                    let resource = resolve(id).unwrap_or_else(|| {
                        ResourceRef::new(p.resource.read().for_variant(variant_num))
                    });
                    (
                        id.clone(),
                        Pending {
                            seq: p.seq,
                            resource,
                        },
                    )
                })
                .collect()
        };
        Self {
            resource_type: self.resource_type,
            next_seq: self.next_seq,
            create: retarget(&self.create),
            update: retarget(&self.update),
            remove: self.remove.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{Attributes, InjectionAttributes, Resource, TerminalAttributes};
    use crate::store::{InMemoryNetworkStore, StoreOp};
    use uuid::Uuid;

    fn load(id: &str) -> ResourceRef {
        ResourceRef::new(Resource::new(
            id,
            0,
            Attributes::Load(InjectionAttributes::new(TerminalAttributes::at_node("vl", 1))),
        ))
    }

    fn key() -> VariantKey {
        VariantKey::initial(Uuid::new_v4())
    }

    #[test]
    fn test_update_of_pending_create_is_absorbed() {
        let mut buffer = ResourceWriteBuffer::new(ResourceType::Load);
        let l1 = load("l1");
        buffer.create(l1.clone());
        buffer.update(l1);
        assert_eq!(
            buffer.counts(),
            PendingCounts {
                create: 1,
                update: 0,
                remove: 0
            }
        );
    }

    #[test]
    fn test_remove_of_pending_create_leaves_nothing() {
        let mut buffer = ResourceWriteBuffer::new(ResourceType::Load);
        buffer.create(load("l1"));
        buffer.remove("l1");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_remove_drops_pending_update() {
        let mut buffer = ResourceWriteBuffer::new(ResourceType::Load);
        buffer.update(load("l1"));
        buffer.remove("l1");
        assert!(!buffer.is_pending_update("l1"));
        assert!(buffer.is_pending_remove("l1"));
    }

    #[test]
    fn test_removal_order_is_queue_order() {
        let mut buffer = ResourceWriteBuffer::new(ResourceType::Load);
        buffer.remove_all(["c", "a", "b"]);
        buffer.remove("a");
        assert_eq!(buffer.pending_removals(), vec!["c", "a", "b"]);
    }

    #[tokio::test]
    async fn test_flush_order_is_remove_create_update() {
        let store = InMemoryNetworkStore::new();
        let key = key();
        store.insert(key.network_id, load("old").snapshot());
        store.insert(key.network_id, load("kept").snapshot());

        let mut buffer = ResourceWriteBuffer::new(ResourceType::Load);
        buffer.update(load("kept"));
        buffer.create(load("new"));
        buffer.remove("old");
        buffer.flush(&store, key).await.unwrap();

        let ops: Vec<_> = store.calls().into_iter().map(|c| c.op).collect();
        assert_eq!(ops, vec![StoreOp::Remove, StoreOp::Create, StoreOp::Update]);
        assert!(buffer.is_empty());
    }

    #[tokio::test]
    async fn test_second_flush_is_silent() {
        let store = InMemoryNetworkStore::new();
        let key = key();
        let mut buffer = ResourceWriteBuffer::new(ResourceType::Load);
        buffer.create(load("l1"));
        buffer.flush(&store, key).await.unwrap();
        store.clear_calls();
        buffer.flush(&store, key).await.unwrap();
        assert_eq!(store.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_failed_flush_keeps_pending_phase() {
        let store = InMemoryNetworkStore::new();
        let key = key();
        let mut buffer = ResourceWriteBuffer::new(ResourceType::Load);
        buffer.remove("gone");
        buffer.create(load("l1"));
        store.fail(StoreOp::Create);

        let err = buffer.flush(&store, key).await.unwrap_err();
        assert!(err.to_string().contains("create_resources"));
        assert_eq!(buffer.counts().remove, 0);
        assert_eq!(buffer.counts().create, 1);

        store.recover(StoreOp::Create);
        buffer.flush(&store, key).await.unwrap();
        assert!(buffer.is_empty());
        assert!(store.stored(key, ResourceType::Load, "l1").is_some());
    }

    #[tokio::test]
    async fn test_flush_sends_latest_state_of_shared_handle() {
        let store = InMemoryNetworkStore::new();
        let key = key();
        let l1 = load("l1");
        let mut buffer = ResourceWriteBuffer::new(ResourceType::Load);
        buffer.create(l1.clone());
        if let Some(inj) = l1.write().attributes.as_injection_mut() {
            inj.p = Some(7.0);
        }
        buffer.flush(&store, key).await.unwrap();
        let stored = store.stored(key, ResourceType::Load, "l1").unwrap();
        assert_eq!(stored.attributes.as_injection().and_then(|i| i.p), Some(7.0));
    }

    #[test]
    fn test_clone_for_variant_is_independent() {
        let mut buffer = ResourceWriteBuffer::new(ResourceType::Load);
        buffer.create(load("l1"));
        buffer.remove("l0");
        let mut copy = buffer.clone_for_variant(1, |_| None);
        copy.remove("l1");
        assert!(buffer.is_pending_create("l1"));
        assert!(!copy.is_pending_create("l1"));
        assert!(copy.is_pending_remove("l0"));
    }
}
