//! Network root write buffer
//!
//! The network's own root resource is stored once per variant, so its buffer
//! is keyed by variant number instead of resource id.

use crate::resource::{ResourceRef, INITIAL_VARIANT_NUM};
use crate::store::NetworkStoreClient;
use anyhow::Result;
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Pending writes of one network's root resources
#[derive(Debug, Clone)]
pub struct NetworkWriteBuffer {
    network_id: Uuid,
    create: BTreeMap<i32, ResourceRef>,
    update: BTreeMap<i32, ResourceRef>,
    remove: BTreeSet<i32>,
    delete_network: bool,
}

impl NetworkWriteBuffer {
    pub fn new(network_id: Uuid) -> Self {
        Self {
            network_id,
            create: BTreeMap::new(),
            update: BTreeMap::new(),
            remove: BTreeSet::new(),
            delete_network: false,
        }
    }

    pub fn network_id(&self) -> Uuid {
        self.network_id
    }

    pub fn create(&mut self, variant_num: i32, root: ResourceRef) {
        self.update.remove(&variant_num);
        self.create.insert(variant_num, root);
    }

    pub fn update(&mut self, variant_num: i32, root: ResourceRef) {
        if let Some(pending) = self.create.get_mut(&variant_num) {
            *pending = root;
            return;
        }
        self.update.insert(variant_num, root);
    }

    /// Queue removal of one variant
    pub fn remove(&mut self, variant_num: i32) {
        if self.create.remove(&variant_num).is_some() {
            return;
        }
        self.update.remove(&variant_num);
        self.remove.insert(variant_num);
    }

    /// Queue deletion of the whole network
    ///
    /// A network whose base case is still pending create never reached the
    /// store, so nothing is sent for it unless an earlier delete of the same
    /// id is still pending.
    pub fn delete_network(&mut self) {
        let never_stored = self.create.contains_key(&INITIAL_VARIANT_NUM);
        self.create.clear();
        self.update.clear();
        self.remove.clear();
        self.delete_network |= !never_stored;
    }

    pub fn is_pending_create(&self, variant_num: i32) -> bool {
        self.create.contains_key(&variant_num)
    }

    pub fn is_empty(&self) -> bool {
        !self.delete_network
            && self.create.is_empty()
            && self.update.is_empty()
            && self.remove.is_empty()
    }

    /// Send pending root writes: network delete, variant removals, then
    /// creates, then updates
    ///
    /// Same contract as the resource buffers: each phase is cleared only once
    /// its remote calls succeeded. Roots queued after a delete are a new
    /// network with the same id and are created in the same flush.
    pub async fn flush(&mut self, client: &dyn NetworkStoreClient) -> Result<()> {
        if self.delete_network {
            tracing::debug!("flush {}: deleting network", self.network_id);
            client.delete_network(self.network_id).await?;
            self.delete_network = false;
        }

        while let Some(variant_num) = self.remove.first().copied() {
            tracing::debug!("flush {}: removing variant {}", self.network_id, variant_num);
            client
                .delete_network_variant(self.network_id, variant_num)
                .await?;
            self.remove.remove(&variant_num);
        }

        if !self.create.is_empty() {
            let roots: Vec<_> = self.create.values().map(ResourceRef::snapshot).collect();
            tracing::debug!("flush {}: creating {} variants", self.network_id, roots.len());
            client.create_networks(roots).await?;
            self.create.clear();
        }

        if !self.update.is_empty() {
            let roots: Vec<_> = self.update.values().map(ResourceRef::snapshot).collect();
            tracing::debug!("flush {}: updating {} variants", self.network_id, roots.len());
            client.update_networks(roots).await?;
            self.update.clear();
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{Attributes, NetworkAttributes, Resource, ResourceType, VariantKey, INITIAL_VARIANT_ID};
    use crate::store::{InMemoryNetworkStore, StoreOp};
    use std::collections::BTreeMap as Props;

    fn root(network_id: Uuid, variant_num: i32) -> ResourceRef {
        ResourceRef::new(Resource::new(
            "grid",
            variant_num,
            Attributes::Network(NetworkAttributes {
                uuid: network_id,
                variant_id: INITIAL_VARIANT_ID.to_string(),
                name: None,
                case_date: chrono::Utc::now(),
                properties: Props::new(),
            }),
        ))
    }

    #[tokio::test]
    async fn test_create_then_update_sends_single_create() {
        let store = InMemoryNetworkStore::new();
        let id = Uuid::new_v4();
        let mut buffer = NetworkWriteBuffer::new(id);
        let r = root(id, 0);
        buffer.create(0, r.clone());
        buffer.update(0, r);
        buffer.flush(&store).await.unwrap();

        assert_eq!(store.call_count(StoreOp::CreateNetworks), 1);
        assert_eq!(store.call_count(StoreOp::UpdateNetworks), 0);
        assert!(store.has_variant(VariantKey::initial(id)));
    }

    #[tokio::test]
    async fn test_delete_of_unflushed_network_is_silent() {
        let store = InMemoryNetworkStore::new();
        let id = Uuid::new_v4();
        let mut buffer = NetworkWriteBuffer::new(id);
        buffer.create(0, root(id, 0));
        buffer.delete_network();
        assert!(buffer.is_empty());
        buffer.flush(&store).await.unwrap();
        assert_eq!(store.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_delete_of_stored_network_is_sent() {
        let store = InMemoryNetworkStore::new();
        let id = Uuid::new_v4();
        store.insert(id, root(id, 0).snapshot());
        let mut buffer = NetworkWriteBuffer::new(id);
        buffer.update(0, root(id, 0));
        buffer.delete_network();
        buffer.flush(&store).await.unwrap();

        assert_eq!(store.call_count(StoreOp::DeleteNetwork), 1);
        assert_eq!(store.call_count(StoreOp::UpdateNetworks), 0);
        assert!(store.stored(VariantKey::initial(id), ResourceType::Network, "grid").is_none());
    }

    #[tokio::test]
    async fn test_recreate_after_delete_is_sent_in_same_flush() {
        let store = InMemoryNetworkStore::new();
        let id = Uuid::new_v4();
        store.insert(id, root(id, 0).snapshot());
        let mut buffer = NetworkWriteBuffer::new(id);
        buffer.delete_network();
        buffer.create(0, root(id, 0));
        buffer.flush(&store).await.unwrap();

        let ops: Vec<_> = store.calls().into_iter().map(|c| c.op).collect();
        assert_eq!(ops, vec![StoreOp::DeleteNetwork, StoreOp::CreateNetworks]);
        assert!(store.has_variant(VariantKey::initial(id)));
        assert!(buffer.is_empty());
    }

    #[tokio::test]
    async fn test_second_delete_keeps_pending_delete() {
        let store = InMemoryNetworkStore::new();
        let id = Uuid::new_v4();
        store.insert(id, root(id, 0).snapshot());
        let mut buffer = NetworkWriteBuffer::new(id);
        buffer.delete_network();
        buffer.create(0, root(id, 0));
        buffer.delete_network();
        buffer.flush(&store).await.unwrap();

        let ops: Vec<_> = store.calls().into_iter().map(|c| c.op).collect();
        assert_eq!(ops, vec![StoreOp::DeleteNetwork]);
        assert!(!store.has_variant(VariantKey::initial(id)));
    }

    #[tokio::test]
    async fn test_failed_delete_keeps_recreate_queued() {
        let store = InMemoryNetworkStore::new();
        let id = Uuid::new_v4();
        store.insert(id, root(id, 0).snapshot());
        let mut buffer = NetworkWriteBuffer::new(id);
        buffer.delete_network();
        buffer.create(0, root(id, 0));

        store.fail(StoreOp::DeleteNetwork);
        assert!(buffer.flush(&store).await.is_err());
        assert!(buffer.is_pending_create(0));
        assert_eq!(store.call_count(StoreOp::CreateNetworks), 0);

        store.recover(StoreOp::DeleteNetwork);
        buffer.flush(&store).await.unwrap();
        assert!(buffer.is_empty());
        assert_eq!(store.call_count(StoreOp::CreateNetworks), 1);
    }

    #[tokio::test]
    async fn test_variant_removal_survives_failure() {
        let store = InMemoryNetworkStore::new();
        let id = Uuid::new_v4();
        let mut buffer = NetworkWriteBuffer::new(id);
        buffer.remove(2);
        store.fail(StoreOp::DeleteVariant);
        assert!(buffer.flush(&store).await.is_err());
        assert!(!buffer.is_empty());

        store.recover(StoreOp::DeleteVariant);
        buffer.flush(&store).await.unwrap();
        assert!(buffer.is_empty());
    }
}
