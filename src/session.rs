//! Network store session
//!
//! The explicit context through which every caller-facing operation runs.
//! A session owns the process-wide indexes: one read cache, one set of write
//! buffers, one bus cache and one preload state per network variant, plus one
//! root buffer per network. Nothing here is global; two sessions never share
//! state.
//!
//! # Read path
//!
//! The first read of a variant runs the configured preloading strategy once.
//! Every read then goes through the variant's [`ReadCache`], which loads on
//! miss with at most one remote call per key.
//!
//! # Write path
//!
//! Mutations update the cached handle in place and queue the same handle in
//! the variant's buffers. Nothing reaches the remote store before
//! [`NetworkStoreSession::flush`].
//!
//! # Topology
//!
//! Bus partitions are computed lazily per voltage level and cached. Any
//! mutation that changes a resource's topology signature drops the cached
//! partitions of the voltage levels it touches.

use crate::buffer::{CollectionIndex, NetworkWriteBuffer, PendingCounts, VariantBuffers};
use crate::cache::{CacheHandler, ReadCache};
use crate::preload::{LoadedTypes, PreloadReport, PreloadingOrchestrator, PreloadingStrategy};
use crate::resource::{
    group_key, Attributes, ExtensionAttributes, LimitsSelection, OperationalLimitsGroup, Resource,
    ResourceRef, ResourceType, Side, VariantKey, INITIAL_VARIANT_NUM,
};
use crate::store::{NetworkStoreClient, StoreError};
use crate::topology::{self, BusCache, BusPartition, CalculatedBus, TopologyError, VoltageLevelView};
use anyhow::Result;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, PoisonError};
use std::time::Instant;
use tokio::sync::{Mutex, OnceCell};
use uuid::Uuid;

/// Preload state of one variant
#[derive(Debug, Default)]
struct VariantPreload {
    done: OnceCell<PreloadReport>,
    loaded_types: LoadedTypes,
}

impl VariantPreload {
    /// State of a variant known to be complete without any remote load
    fn completed(types: impl IntoIterator<Item = ResourceType>) -> Self {
        Self {
            done: OnceCell::new_with(Some(PreloadReport::default())),
            loaded_types: Arc::new(std::sync::Mutex::new(types.into_iter().collect())),
        }
    }
}

/// Voltage levels whose bus partition may depend on a resource
fn affected_voltage_levels(resource: &Resource) -> Vec<String> {
    match &resource.attributes {
        Attributes::Network(_) | Attributes::Substation(_) => Vec::new(),
        Attributes::VoltageLevel(_) => vec![resource.id.clone()],
        attributes => attributes
            .container_ids()
            .into_iter()
            .map(str::to_string)
            .collect(),
    }
}

pub struct NetworkStoreSession {
    client: Arc<dyn NetworkStoreClient>,
    caches: CacheHandler,
    buffers: CollectionIndex<Mutex<VariantBuffers>>,
    /// Keyed by the base variant of each network
    root_buffers: CollectionIndex<Mutex<NetworkWriteBuffer>>,
    roots: CollectionIndex<OnceCell<Option<ResourceRef>>>,
    buses: CollectionIndex<BusCache>,
    preloads: CollectionIndex<VariantPreload>,
    orchestrator: PreloadingOrchestrator,
}

impl NetworkStoreSession {
    pub fn new(client: Arc<dyn NetworkStoreClient>, strategy: PreloadingStrategy) -> Self {
        Self {
            orchestrator: PreloadingOrchestrator::new(strategy, client.clone()),
            client,
            caches: CacheHandler::new(),
            buffers: CollectionIndex::new(|key| Mutex::new(VariantBuffers::new(key))),
            root_buffers: CollectionIndex::new(|key: VariantKey| {
                Mutex::new(NetworkWriteBuffer::new(key.network_id))
            }),
            roots: CollectionIndex::new(|_| OnceCell::new()),
            buses: CollectionIndex::new(|_| BusCache::new()),
            preloads: CollectionIndex::new(|_| VariantPreload::default()),
        }
    }

    pub fn strategy(&self) -> &PreloadingStrategy {
        self.orchestrator.strategy()
    }

    pub fn client(&self) -> &Arc<dyn NetworkStoreClient> {
        &self.client
    }

    fn root_buffer(&self, network_id: Uuid) -> Arc<Mutex<NetworkWriteBuffer>> {
        self.root_buffers
            .get_collection(VariantKey::initial(network_id))
    }

    fn invalidate_buses(&self, key: VariantKey, voltage_levels: impl IntoIterator<Item = String>) {
        if let Some(buses) = self.buses.get_existing(key) {
            for voltage_level_id in voltage_levels {
                buses.invalidate(&voltage_level_id);
            }
        }
    }

    // =========================================================================
    // Preloading
    // =========================================================================

    /// Run the preloading strategy for a variant, once
    ///
    /// A failed preload is not remembered: the next read tries again.
    pub async fn preload(&self, key: VariantKey) -> Result<PreloadReport> {
        let cache = self.caches.get_cache(key);
        let preload = self.preloads.get_collection(key);
        let report = preload
            .done
            .get_or_try_init(|| self.orchestrator.load_resources(&cache, &preload.loaded_types))
            .await?;
        Ok(report.clone())
    }

    /// Types a completed preload brought in fully
    pub fn loaded_types(&self, key: VariantKey) -> BTreeSet<ResourceType> {
        self.preloads
            .get_existing(key)
            .map(|p| {
                p.loaded_types
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone()
            })
            .unwrap_or_default()
    }

    /// Cache of a variant, preloaded if the strategy asks for it
    async fn cache(&self, key: VariantKey) -> Result<Arc<ReadCache>> {
        if self.orchestrator.strategy().is_enabled() {
            self.preload(key).await?;
        }
        Ok(self.caches.get_cache(key))
    }

    // =========================================================================
    // Networks and variants
    // =========================================================================

    /// Register a new network from its root resource
    ///
    /// Every collection of the new variant is known to be empty, so reads of
    /// it never reach the remote store before the first flush.
    pub async fn create_network(&self, root: Resource) -> Result<ResourceRef> {
        let Attributes::Network(attributes) = &root.attributes else {
            anyhow::bail!("'{}' is not a network root resource", root.id);
        };
        let key = VariantKey::new(attributes.uuid, root.variant_num);
        let known = self
            .roots
            .get_existing(key)
            .and_then(|cell| cell.get().cloned())
            .flatten();
        if known.is_some() {
            return Err(StoreError::AlreadyExists {
                key,
                resource_type: ResourceType::Network,
                id: root.id.clone(),
            }
            .into());
        }

        let handle = ResourceRef::new(root);
        self.roots
            .insert(key, OnceCell::new_with(Some(Some(handle.clone()))));
        self.root_buffer(key.network_id)
            .lock()
            .await
            .create(key.variant_num, handle.clone());

        let cache = self.caches.get_cache(key);
        for resource_type in ResourceType::contained() {
            cache
                .load_all(resource_type, || async { anyhow::Ok(Vec::new()) })
                .await?;
            cache
                .load_all_extensions(resource_type, || async { anyhow::Ok(HashMap::new()) })
                .await?;
            if resource_type.has_operational_limits() {
                cache
                    .load_limits(resource_type, LimitsSelection::All, || async {
                        anyhow::Ok(HashMap::new())
                    })
                    .await?;
            }
        }
        self.preloads
            .insert(key, VariantPreload::completed(ResourceType::contained()));

        tracing::info!("created network {}", key);
        Ok(handle)
    }

    /// Root resource of a variant
    pub async fn get_network(&self, key: VariantKey) -> Result<Option<ResourceRef>> {
        let cell = self.roots.get_collection(key);
        let root = cell
            .get_or_try_init(|| async {
                let root = self
                    .client
                    .get_network(key.network_id, key.variant_num)
                    .await?;
                Ok::<_, anyhow::Error>(root.map(ResourceRef::new))
            })
            .await?;
        Ok(root.clone())
    }

    /// Mutate the root resource of a variant and queue its update
    pub async fn modify_network(
        &self,
        key: VariantKey,
        mutate: impl FnOnce(&mut Resource),
    ) -> Result<ResourceRef> {
        let root = self
            .get_network(key)
            .await?
            .ok_or(StoreError::UnknownNetwork(key.network_id))?;
        mutate(&mut root.write());
        self.root_buffer(key.network_id)
            .lock()
            .await
            .update(key.variant_num, root.clone());
        Ok(root)
    }

    /// Clone a variant into a new one
    ///
    /// The remote clone runs immediately, after the root buffer is flushed so
    /// the source exists remotely. The source cache is copied into the target
    /// and the source's pending writes are queued for the target too.
    pub async fn clone_variant(
        &self,
        network_id: Uuid,
        source_variant_num: i32,
        target_variant_num: i32,
        target_variant_id: &str,
    ) -> Result<()> {
        let source = VariantKey::new(network_id, source_variant_num);
        let target = VariantKey::new(network_id, target_variant_num);

        if let Some(root) = self
            .root_buffers
            .get_existing(VariantKey::initial(network_id))
        {
            root.lock().await.flush(self.client.as_ref()).await?;
        }
        self.client
            .clone_network_variant(
                network_id,
                source_variant_num,
                target_variant_num,
                target_variant_id,
            )
            .await?;

        self.drop_variant(target);
        let target_cache = match self.caches.get_existing(source) {
            Some(cache) => self.caches.install(cache.clone_for_variant(target)),
            None => self.caches.get_cache(target),
        };
        // The cloned cache already holds everything the source preloaded
        if let Some(preload) = self
            .preloads
            .get_existing(source)
            .filter(|p| p.done.initialized())
        {
            let types = preload
                .loaded_types
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            self.preloads.insert(target, VariantPreload::completed(types));
        }
        if let Some(buffers) = self.buffers.get_existing(source) {
            let cloned = buffers
                .lock()
                .await
                .clone_for_variant(target, |t, id| target_cache.cached(t, id));
            self.buffers.insert(target, Mutex::new(cloned));
        }

        tracing::info!(
            "cloned {} into variant {} ('{}')",
            source,
            target_variant_num,
            target_variant_id
        );
        Ok(())
    }

    /// Queue removal of a variant and forget everything held for it
    pub async fn remove_variant(&self, network_id: Uuid, variant_num: i32) -> Result<()> {
        if variant_num == INITIAL_VARIANT_NUM {
            anyhow::bail!(
                "the base variant of {} is only removed with the network",
                network_id
            );
        }
        self.root_buffer(network_id)
            .lock()
            .await
            .remove(variant_num);
        self.drop_variant(VariantKey::new(network_id, variant_num));
        Ok(())
    }

    /// Queue deletion of a network; its unflushed writes are discarded
    pub async fn delete_network(&self, network_id: Uuid) {
        self.root_buffer(network_id).lock().await.delete_network();
        self.buffers.remove_collection(network_id);
        self.invalidate(network_id);
        tracing::info!("deleted network {}", network_id);
    }

    fn drop_variant(&self, key: VariantKey) {
        self.caches.invalidate_variant(key);
        self.buffers.remove_variant(key);
        self.roots.remove_variant(key);
        self.buses.remove_variant(key);
        self.preloads.remove_variant(key);
    }

    /// Drop every cached variant of a network; pending writes are kept
    pub fn invalidate(&self, network_id: Uuid) -> usize {
        self.roots.remove_collection(network_id);
        self.buses.remove_collection(network_id);
        self.preloads.remove_collection(network_id);
        self.caches.invalidate(network_id)
    }

    // =========================================================================
    // Resources
    // =========================================================================

    pub async fn get_resource(
        &self,
        key: VariantKey,
        resource_type: ResourceType,
        id: &str,
    ) -> Result<Option<ResourceRef>> {
        let cache = self.cache(key).await?;
        cache
            .get_resource(resource_type, id, || {
                self.client
                    .get_resource(key.network_id, key.variant_num, resource_type, id)
            })
            .await
    }

    /// Every resource of a type, ordered by id
    pub async fn get_resources(
        &self,
        key: VariantKey,
        resource_type: ResourceType,
    ) -> Result<Vec<ResourceRef>> {
        let cache = self.cache(key).await?;
        cache
            .get_resources(resource_type, || {
                self.client
                    .get_resources(key.network_id, key.variant_num, resource_type)
            })
            .await
    }

    /// Resources of a type belonging to one container
    pub async fn get_container_resources(
        &self,
        key: VariantKey,
        resource_type: ResourceType,
        container_id: &str,
    ) -> Result<Vec<ResourceRef>> {
        let cache = self.cache(key).await?;
        cache
            .get_container_resources(resource_type, container_id, || {
                self.client.get_container_resources(
                    key.network_id,
                    key.variant_num,
                    resource_type,
                    container_id,
                )
            })
            .await
    }

    /// Cache a new resource and queue its creation
    pub async fn create_resource(&self, key: VariantKey, resource: Resource) -> Result<ResourceRef> {
        let resource_type = resource.resource_type();
        if resource_type == ResourceType::Network {
            anyhow::bail!("network roots are created with create_network");
        }
        let cache = self.cache(key).await?;
        if cache.cached(resource_type, &resource.id).is_some() {
            return Err(StoreError::AlreadyExists {
                key,
                resource_type,
                id: resource.id,
            }
            .into());
        }

        let affected = affected_voltage_levels(&resource);
        let handle = ResourceRef::new(resource.for_variant(key.variant_num));
        cache.put(handle.clone());
        self.buffers
            .get_collection(key)
            .lock()
            .await
            .create(handle.clone());
        self.invalidate_buses(key, affected);
        Ok(handle)
    }

    /// Mutate a resource in place and queue its update
    ///
    /// The mutation runs on a copy; id and type must be left unchanged.
    pub async fn modify_resource(
        &self,
        key: VariantKey,
        resource_type: ResourceType,
        id: &str,
        mutate: impl FnOnce(&mut Resource),
    ) -> Result<ResourceRef> {
        let handle = self
            .get_resource(key, resource_type, id)
            .await?
            .ok_or_else(|| StoreError::UnknownResource {
                key,
                resource_type,
                id: id.to_string(),
            })?;

        let before = handle.snapshot();
        let mut after = before.clone();
        mutate(&mut after);
        if after.id != before.id || after.resource_type() != resource_type {
            anyhow::bail!("mutation of {} '{}' changed its id or type", resource_type, id);
        }

        let mut affected = BTreeSet::new();
        if before.attributes.topology_signature() != after.attributes.topology_signature() {
            affected.extend(affected_voltage_levels(&before));
            affected.extend(affected_voltage_levels(&after));
        }
        *handle.write() = after;

        self.buffers
            .get_collection(key)
            .lock()
            .await
            .update(handle.clone());
        self.invalidate_buses(key, affected);
        Ok(handle)
    }

    pub async fn remove_resource(
        &self,
        key: VariantKey,
        resource_type: ResourceType,
        id: &str,
    ) -> Result<bool> {
        Ok(self.remove_resources(key, resource_type, &[id]).await? == 1)
    }

    /// Remove resources from the cache and queue their removal
    ///
    /// Unknown ids are skipped. Returns how many resources were removed.
    pub async fn remove_resources(
        &self,
        key: VariantKey,
        resource_type: ResourceType,
        ids: &[&str],
    ) -> Result<usize> {
        let mut removed = Vec::new();
        let mut affected = BTreeSet::new();
        for id in ids {
            match self.get_resource(key, resource_type, id).await? {
                Some(handle) => {
                    affected.extend(affected_voltage_levels(&handle.read()));
                    removed.push(*id);
                }
                None => tracing::warn!("{}: cannot remove unknown {} '{}'", key, resource_type, id),
            }
        }
        if removed.is_empty() {
            return Ok(0);
        }

        let cache = self.caches.get_cache(key);
        for id in &removed {
            cache.remove(resource_type, id);
        }
        self.buffers
            .get_collection(key)
            .lock()
            .await
            .remove(resource_type, removed.iter().copied());
        self.invalidate_buses(key, affected);
        Ok(removed.len())
    }

    /// Open or close a switch; returns whether its state changed
    pub async fn set_switch_open(&self, key: VariantKey, switch_id: &str, open: bool) -> Result<bool> {
        let switch = self
            .get_resource(key, ResourceType::Switch, switch_id)
            .await?
            .ok_or_else(|| StoreError::UnknownResource {
                key,
                resource_type: ResourceType::Switch,
                id: switch_id.to_string(),
            })?;
        let current = switch.read().attributes.as_switch().map(|s| s.open);
        if current == Some(open) {
            return Ok(false);
        }
        self.modify_resource(key, ResourceType::Switch, switch_id, |resource| {
            if let Some(switch) = resource.attributes.as_switch_mut() {
                switch.open = open;
            }
        })
        .await?;
        tracing::debug!(
            "{}: switch '{}' {}",
            key,
            switch_id,
            if open { "opened" } else { "closed" }
        );
        Ok(true)
    }

    // =========================================================================
    // Extensions and operational limits
    // =========================================================================

    pub async fn get_extension(
        &self,
        key: VariantKey,
        resource_type: ResourceType,
        id: &str,
        name: &str,
    ) -> Result<Option<ExtensionAttributes>> {
        let cache = self.cache(key).await?;
        cache
            .get_extension(resource_type, id, name, || {
                self.client.get_resource_extension(
                    key.network_id,
                    key.variant_num,
                    resource_type,
                    id,
                    name,
                )
            })
            .await
    }

    /// Drop an extension from the cache and queue its removal
    pub async fn remove_extension(
        &self,
        key: VariantKey,
        resource_type: ResourceType,
        id: &str,
        name: &str,
    ) -> Result<bool> {
        let cache = self.cache(key).await?;
        let was_cached = cache.remove_extension(resource_type, id, name);
        self.buffers
            .get_collection(key)
            .lock()
            .await
            .remove_extension(resource_type, id, name);
        Ok(was_cached)
    }

    /// Every limits group of one branch
    pub async fn limits_groups(
        &self,
        key: VariantKey,
        resource_type: ResourceType,
        branch_id: &str,
    ) -> Result<Vec<OperationalLimitsGroup>> {
        let cache = self.cache(key).await?;
        cache
            .branch_limits_groups(resource_type, branch_id, || {
                self.client.get_branch_operational_limits_groups(
                    key.network_id,
                    key.variant_num,
                    resource_type,
                    branch_id,
                )
            })
            .await
    }

    /// Limits groups currently selected on each side of a branch
    ///
    /// Served from cache when the type was bulk loaded at any level.
    pub async fn selected_limits_groups(
        &self,
        key: VariantKey,
        resource_type: ResourceType,
        branch_id: &str,
    ) -> Result<Vec<OperationalLimitsGroup>> {
        let Some(branch) = self.get_resource(key, resource_type, branch_id).await? else {
            return Ok(Vec::new());
        };
        let selected: BTreeSet<String> = {
            let branch = branch.read();
            [Side::One, Side::Two, Side::Three]
                .into_iter()
                .filter_map(|side| {
                    branch
                        .attributes
                        .selected_limits_group(side)
                        .map(|id| group_key(id, side))
                })
                .collect()
        };
        if selected.is_empty() {
            return Ok(Vec::new());
        }

        let cache = self.cache(key).await?;
        let groups = if cache.limits_loaded(resource_type).is_some() {
            cache.cached_limits_groups(resource_type, branch_id)
        } else {
            self.limits_groups(key, resource_type, branch_id).await?
        };
        Ok(groups
            .into_iter()
            .filter(|g| selected.contains(&g.key()))
            .collect())
    }

    /// Drop a limits group from the cache and queue its removal
    pub async fn remove_limits_group(
        &self,
        key: VariantKey,
        resource_type: ResourceType,
        branch_id: &str,
        group_id: &str,
        side: Side,
    ) -> Result<bool> {
        let group = group_key(group_id, side);
        let cache = self.cache(key).await?;
        let was_cached = cache.remove_limits_group(resource_type, branch_id, &group);
        self.buffers
            .get_collection(key)
            .lock()
            .await
            .remove_limits_group(resource_type, branch_id, &group);
        Ok(was_cached)
    }

    // =========================================================================
    // Topology
    // =========================================================================

    async fn voltage_level_view(
        &self,
        key: VariantKey,
        voltage_level_id: &str,
    ) -> Result<VoltageLevelView> {
        let voltage_level = self
            .get_resource(key, ResourceType::VoltageLevel, voltage_level_id)
            .await?
            .ok_or_else(|| TopologyError::UnknownVoltageLevel(voltage_level_id.to_string()))?;
        let mut view = VoltageLevelView::new(&voltage_level.read())?;
        for resource_type in ResourceType::topology_types() {
            for resource in self
                .get_container_resources(key, resource_type, voltage_level_id)
                .await?
            {
                view.add(&resource.read());
            }
        }
        view.sort();
        Ok(view)
    }

    /// Bus partition of a voltage level, computed on first request
    pub async fn calculate_buses(
        &self,
        key: VariantKey,
        voltage_level_id: &str,
    ) -> Result<Arc<BusPartition>> {
        let buses = self.buses.get_collection(key);
        if let Some(partition) = buses.get(voltage_level_id) {
            return Ok(partition);
        }
        let view = self.voltage_level_view(key, voltage_level_id).await?;
        let partition = topology::calculate_buses(&view)?;
        Ok(buses.insert(partition))
    }

    /// Bus an equipment terminal is connected to
    ///
    /// Answered from the cached partition when there is one, otherwise by a
    /// traversal from that terminal only.
    pub async fn bus_of(
        &self,
        key: VariantKey,
        voltage_level_id: &str,
        id: &str,
        side: Option<Side>,
    ) -> Result<Option<CalculatedBus>> {
        if let Some(partition) = self
            .buses
            .get_existing(key)
            .and_then(|b| b.get(voltage_level_id))
        {
            return Ok(partition.bus_of(id, side).cloned());
        }
        let view = self.voltage_level_view(key, voltage_level_id).await?;
        Ok(topology::calculate_bus_of(&view, id, side)?)
    }

    // =========================================================================
    // Synchronization
    // =========================================================================

    pub async fn pending_counts(&self, key: VariantKey) -> PendingCounts {
        match self.buffers.get_existing(key) {
            Some(buffers) => buffers.lock().await.counts(),
            None => PendingCounts::default(),
        }
    }

    /// Send every pending write of a network to the remote store
    ///
    /// The root buffer goes first, then each variant in order. The first
    /// failing call stops the flush; what it was sending stays queued.
    pub async fn flush(&self, network_id: Uuid) -> Result<PendingCounts> {
        let started = Instant::now();
        if let Some(root) = self
            .root_buffers
            .get_existing(VariantKey::initial(network_id))
        {
            root.lock()
                .await
                .flush(self.client.as_ref())
                .await
                .inspect_err(|e| tracing::error!("flush of {} roots failed: {:#}", network_id, e))?;
        }

        let mut flushed = PendingCounts::default();
        for (key, buffers) in self.buffers.network_entries(network_id) {
            flushed += buffers
                .lock()
                .await
                .flush(self.client.as_ref())
                .await
                .inspect_err(|e| tracing::error!("flush of {} failed: {:#}", key, e))?;
        }

        if flushed.total() > 0 {
            tracing::info!(
                "flushed {}: {} created, {} updated, {} removed in {:?}",
                network_id,
                flushed.create,
                flushed.update,
                flushed.remove,
                started.elapsed()
            );
        }
        Ok(flushed)
    }

    /// Flush every network with pending writes
    pub async fn flush_all(&self) -> Result<PendingCounts> {
        let mut networks = BTreeSet::new();
        self.root_buffers.apply_to_all(|key, _| {
            networks.insert(key.network_id);
        });
        self.buffers.apply_to_all(|key, _| {
            networks.insert(key.network_id);
        });
        let mut flushed = PendingCounts::default();
        for network_id in networks {
            flushed += self.flush(network_id).await?;
        }
        Ok(flushed)
    }
}
