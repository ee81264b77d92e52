//! Write buffers
//!
//! Local mutations are queued here and sent to the remote store in batches
//! on flush.
//!
//! # Module Structure
//!
//! - [`resource`] - Per resource type create/update/remove buffer
//! - [`extension`] - Removal buffer for extensions and operational limits groups
//! - [`network`] - Root resource buffer, keyed by variant number
//! - [`collection`] - Lazily built per-variant index of buffers, caches, etc.
//!
//! A variant's buffers are grouped in [`VariantBuffers`], flushed in this
//! order: resource buffers in resource type declaration order, then extension
//! removals, then limits group removals.

pub mod collection;
pub mod extension;
pub mod network;
pub mod resource;

pub use collection::CollectionIndex;
pub use extension::{union_names, ExternalAttributeBuffer, MergeFn, NameRemovalBuffer};
pub use network::NetworkWriteBuffer;
pub use resource::{PendingCounts, ResourceWriteBuffer};

use crate::resource::{ResourceRef, ResourceType, VariantKey};
use crate::store::NetworkStoreClient;
use anyhow::Result;
use std::collections::BTreeMap;

/// Every pending write of one network variant
#[derive(Debug, Clone)]
pub struct VariantBuffers {
    key: VariantKey,
    resources: BTreeMap<ResourceType, ResourceWriteBuffer>,
    extension_removals: NameRemovalBuffer,
    limits_group_removals: NameRemovalBuffer,
}

impl VariantBuffers {
    pub fn new(key: VariantKey) -> Self {
        Self {
            key,
            resources: BTreeMap::new(),
            extension_removals: NameRemovalBuffer::for_names(),
            limits_group_removals: NameRemovalBuffer::for_names(),
        }
    }

    pub fn key(&self) -> VariantKey {
        self.key
    }

    fn buffer_mut(&mut self, resource_type: ResourceType) -> &mut ResourceWriteBuffer {
        self.resources
            .entry(resource_type)
            .or_insert_with(|| ResourceWriteBuffer::new(resource_type))
    }

    pub fn buffer(&self, resource_type: ResourceType) -> Option<&ResourceWriteBuffer> {
        self.resources.get(&resource_type)
    }

    pub fn create(&mut self, resource: ResourceRef) {
        let resource_type = resource.resource_type();
        self.buffer_mut(resource_type).create(resource);
    }

    pub fn update(&mut self, resource: ResourceRef) {
        let resource_type = resource.resource_type();
        self.buffer_mut(resource_type).update(resource);
    }

    /// Queue removals; pending extension and limits removals of the same
    /// resources become moot and are dropped
    pub fn remove<'a>(&mut self, resource_type: ResourceType, ids: impl IntoIterator<Item = &'a str>) {
        let ids: Vec<&str> = ids.into_iter().collect();
        for id in &ids {
            self.extension_removals.forget_resource(resource_type, id);
            self.limits_group_removals.forget_resource(resource_type, id);
        }
        self.buffer_mut(resource_type).remove_all(ids);
    }

    pub fn remove_extension(&mut self, resource_type: ResourceType, id: &str, name: &str) {
        self.extension_removals.add_name(resource_type, id, name);
    }

    pub fn remove_limits_group(&mut self, resource_type: ResourceType, id: &str, group_key: &str) {
        self.limits_group_removals.add_name(resource_type, id, group_key);
    }

    pub fn extension_removals(&self) -> &NameRemovalBuffer {
        &self.extension_removals
    }

    pub fn limits_group_removals(&self) -> &NameRemovalBuffer {
        &self.limits_group_removals
    }

    pub fn counts(&self) -> PendingCounts {
        let mut counts = PendingCounts::default();
        for buffer in self.resources.values() {
            counts += buffer.counts();
        }
        counts.remove += self.extension_removals.len() + self.limits_group_removals.len();
        counts
    }

    pub fn is_empty(&self) -> bool {
        self.resources.values().all(ResourceWriteBuffer::is_empty)
            && self.extension_removals.is_empty()
            && self.limits_group_removals.is_empty()
    }

    /// Flush every buffer of the variant, stopping at the first failure
    pub async fn flush(&mut self, client: &dyn NetworkStoreClient) -> Result<PendingCounts> {
        let flushed = self.counts();
        let key = self.key;

        for buffer in self.resources.values_mut() {
            buffer.flush(client, key).await?;
        }

        self.extension_removals
            .flush(|resource_type, batch| {
                client.remove_extension_attributes(
                    key.network_id,
                    key.variant_num,
                    resource_type,
                    batch,
                )
            })
            .await?;

        self.limits_group_removals
            .flush(|resource_type, batch| {
                client.remove_operational_limits_groups(
                    key.network_id,
                    key.variant_num,
                    resource_type,
                    batch,
                )
            })
            .await?;

        self.resources.retain(|_, b| !b.is_empty());
        Ok(flushed)
    }

    /// Independent copy of the pending writes for another variant
    ///
    /// `resolve` maps a resource to the target variant's own handle.
    pub fn clone_for_variant(
        &self,
        target: VariantKey,
        resolve: impl Fn(ResourceType, &str) -> Option<ResourceRef>,
    ) -> Self {
        let resources = self
            .resources
            .iter()
            .map(|(t, buffer)| {
                let copy = buffer.clone_for_variant(target.variant_num, |id| resolve(*t, id));
                (*t, copy)
            })
            .collect();
        Self {
            key: target,
            resources,
            extension_removals: self.extension_removals.clone(),
            limits_group_removals: self.limits_group_removals.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{
        Attributes, BranchAttributes, InjectionAttributes, Resource, SwitchAttributes,
        TerminalAttributes,
    };
    use crate::store::{InMemoryNetworkStore, StoreOp};
    use uuid::Uuid;

    fn load(id: &str) -> ResourceRef {
        ResourceRef::new(Resource::new(
            id,
            0,
            Attributes::Load(InjectionAttributes::new(TerminalAttributes::at_node("vl", 1))),
        ))
    }

    fn switch(id: &str) -> ResourceRef {
        ResourceRef::new(Resource::new(
            id,
            0,
            Attributes::Switch(SwitchAttributes::between_nodes("vl", 0, 1, false)),
        ))
    }

    #[tokio::test]
    async fn test_flush_visits_types_in_declaration_order() {
        let store = InMemoryNetworkStore::new();
        let key = VariantKey::initial(Uuid::new_v4());
        let mut buffers = VariantBuffers::new(key);
        buffers.create(load("l1"));
        buffers.create(switch("s1"));
        buffers.remove_extension(ResourceType::Load, "l0", "detail");

        let flushed = buffers.flush(&store).await.unwrap();
        assert_eq!(flushed.create, 2);

        let calls = store.calls();
        let types: Vec<_> = calls.iter().map(|c| (c.op, c.resource_type)).collect();
        assert_eq!(
            types,
            vec![
                (StoreOp::Create, Some(ResourceType::Switch)),
                (StoreOp::Create, Some(ResourceType::Load)),
                (StoreOp::RemoveExtensions, Some(ResourceType::Load)),
            ]
        );
        assert!(buffers.is_empty());
    }

    #[test]
    fn test_removing_resource_drops_its_extension_removals() {
        let key = VariantKey::initial(Uuid::new_v4());
        let mut buffers = VariantBuffers::new(key);
        buffers.remove_extension(ResourceType::Line, "line1", "position");
        buffers.remove_limits_group(ResourceType::Line, "line1", "winter@1");
        buffers.remove(ResourceType::Line, ["line1"]);

        assert!(buffers.extension_removals().is_empty());
        assert!(buffers.limits_group_removals().is_empty());
        assert_eq!(buffers.counts().remove, 1);
    }

    #[test]
    fn test_clone_for_variant_retargets_handles() {
        let network_id = Uuid::new_v4();
        let mut buffers = VariantBuffers::new(VariantKey::initial(network_id));
        let line = ResourceRef::new(Resource::new(
            "line1",
            0,
            Attributes::Line(BranchAttributes::new(
                TerminalAttributes::at_node("vl1", 1),
                TerminalAttributes::at_node("vl2", 1),
            )),
        ));
        buffers.update(line.clone());

        let target_copy = ResourceRef::new(line.read().for_variant(1));
        let copy = buffers.clone_for_variant(VariantKey::new(network_id, 1), |_, id| {
            (id == "line1").then(|| target_copy.clone())
        });

        assert_eq!(copy.key().variant_num, 1);
        assert!(copy
            .buffer(ResourceType::Line)
            .is_some_and(|b| b.is_pending_update("line1")));
        assert_eq!(buffers.counts().update, 1);
    }
}
