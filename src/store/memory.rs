//! In-memory network store
//!
//! A [`NetworkStoreClient`] backed by plain maps. Records every call so tests
//! can assert on remote traffic, and can be told to fail or slow down.

use super::client::{NetworkStoreClient, RemovalBatch};
use super::error::StoreError;
use crate::resource::{
    group_key, Attributes, ExtensionAttributes, LimitsSelection, OperationalLimitsGroup, Resource,
    ResourceType, VariantKey,
};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use uuid::Uuid;

/// Remote operation kinds, as recorded by the in-memory store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    CreateNetworks,
    UpdateNetworks,
    DeleteNetwork,
    DeleteVariant,
    CloneVariant,
    GetNetwork,
    Create,
    Update,
    Remove,
    GetOne,
    GetAll,
    GetContainer,
    GetExtensions,
    GetAllExtensions,
    GetResourceExtension,
    RemoveExtensions,
    GetLimits,
    GetBranchLimits,
    RemoveLimits,
}

impl StoreOp {
    fn name(self) -> &'static str {
        match self {
            StoreOp::CreateNetworks => "create_networks",
            StoreOp::UpdateNetworks => "update_networks",
            StoreOp::DeleteNetwork => "delete_network",
            StoreOp::DeleteVariant => "delete_network_variant",
            StoreOp::CloneVariant => "clone_network_variant",
            StoreOp::GetNetwork => "get_network",
            StoreOp::Create => "create_resources",
            StoreOp::Update => "update_resources",
            StoreOp::Remove => "remove_resources",
            StoreOp::GetOne => "get_resource",
            StoreOp::GetAll => "get_resources",
            StoreOp::GetContainer => "get_container_resources",
            StoreOp::GetExtensions => "get_extension_attributes",
            StoreOp::GetAllExtensions => "get_all_extension_attributes",
            StoreOp::GetResourceExtension => "get_resource_extension",
            StoreOp::RemoveExtensions => "remove_extension_attributes",
            StoreOp::GetLimits => "get_operational_limits_groups",
            StoreOp::GetBranchLimits => "get_branch_operational_limits_groups",
            StoreOp::RemoveLimits => "remove_operational_limits_groups",
        }
    }
}

/// One recorded remote call
#[derive(Debug, Clone, PartialEq)]
pub struct StoreCall {
    pub op: StoreOp,
    pub resource_type: Option<ResourceType>,
    /// Ids carried by the call (created, updated, removed or fetched)
    pub ids: Vec<String>,
}

type Collection = BTreeMap<String, Resource>;

#[derive(Default)]
struct StoreState {
    networks: BTreeMap<VariantKey, Resource>,
    resources: HashMap<(VariantKey, ResourceType), Collection>,
    extensions: HashMap<(VariantKey, ResourceType), BTreeMap<String, BTreeMap<String, ExtensionAttributes>>>,
    limits: HashMap<(VariantKey, ResourceType), BTreeMap<String, Vec<OperationalLimitsGroup>>>,
}

/// In-memory store with call recording and failure injection
#[derive(Default)]
pub struct InMemoryNetworkStore {
    state: Mutex<StoreState>,
    calls: Mutex<Vec<StoreCall>>,
    failing: Mutex<HashSet<StoreOp>>,
    latency: Option<Duration>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl InMemoryNetworkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call, to widen race windows in concurrency tests
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    // =========================================================================
    // Seeding and inspection
    // =========================================================================

    /// Store a resource directly, without recording a call
    pub fn insert(&self, network_id: Uuid, resource: Resource) {
        let key = VariantKey::new(network_id, resource.variant_num);
        let mut state = lock(&self.state);
        if resource.resource_type() == ResourceType::Network {
            state.networks.insert(key, resource);
        } else {
            state
                .resources
                .entry((key, resource.resource_type()))
                .or_default()
                .insert(resource.id.clone(), resource);
        }
    }

    pub fn insert_extension(
        &self,
        key: VariantKey,
        resource_type: ResourceType,
        id: &str,
        name: &str,
        value: ExtensionAttributes,
    ) {
        lock(&self.state)
            .extensions
            .entry((key, resource_type))
            .or_default()
            .entry(id.to_string())
            .or_default()
            .insert(name.to_string(), value);
    }

    pub fn insert_limits_group(
        &self,
        key: VariantKey,
        resource_type: ResourceType,
        branch_id: &str,
        group: OperationalLimitsGroup,
    ) {
        lock(&self.state)
            .limits
            .entry((key, resource_type))
            .or_default()
            .entry(branch_id.to_string())
            .or_default()
            .push(group);
    }

    /// Current stored value of a resource
    pub fn stored(&self, key: VariantKey, resource_type: ResourceType, id: &str) -> Option<Resource> {
        let state = lock(&self.state);
        if resource_type == ResourceType::Network {
            return state.networks.get(&key).cloned();
        }
        state
            .resources
            .get(&(key, resource_type))
            .and_then(|c| c.get(id))
            .cloned()
    }

    pub fn stored_count(&self, key: VariantKey, resource_type: ResourceType) -> usize {
        lock(&self.state)
            .resources
            .get(&(key, resource_type))
            .map(|c| c.len())
            .unwrap_or(0)
    }

    pub fn stored_extension(
        &self,
        key: VariantKey,
        resource_type: ResourceType,
        id: &str,
        name: &str,
    ) -> Option<ExtensionAttributes> {
        lock(&self.state)
            .extensions
            .get(&(key, resource_type))
            .and_then(|e| e.get(id))
            .and_then(|e| e.get(name))
            .cloned()
    }

    pub fn has_variant(&self, key: VariantKey) -> bool {
        lock(&self.state).networks.contains_key(&key)
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self, op: StoreOp) -> usize {
        lock(&self.calls).iter().filter(|c| c.op == op).count()
    }

    pub fn total_calls(&self) -> usize {
        lock(&self.calls).len()
    }

    pub fn clear_calls(&self) {
        lock(&self.calls).clear();
    }

    /// Make every call of `op` fail until [`Self::recover`] is called
    pub fn fail(&self, op: StoreOp) {
        lock(&self.failing).insert(op);
    }

    pub fn recover(&self, op: StoreOp) {
        lock(&self.failing).remove(&op);
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn enter(
        &self,
        op: StoreOp,
        resource_type: Option<ResourceType>,
        ids: Vec<String>,
    ) -> Result<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        lock(&self.calls).push(StoreCall {
            op,
            resource_type,
            ids,
        });
        if lock(&self.failing).contains(&op) {
            tracing::debug!("in-memory store failing {}", op.name());
            return Err(StoreError::Simulated(op.name()).into());
        }
        Ok(())
    }

    fn belongs_to(resource: &Resource, container_id: &str) -> bool {
        resource.attributes.container_ids().contains(&container_id)
    }
}

#[async_trait]
impl NetworkStoreClient for InMemoryNetworkStore {
    async fn create_networks(&self, networks: Vec<Resource>) -> Result<()> {
        let ids = networks.iter().map(|n| n.id.clone()).collect();
        self.enter(StoreOp::CreateNetworks, Some(ResourceType::Network), ids)
            .await?;
        let mut state = lock(&self.state);
        for network in networks {
            let Attributes::Network(attrs) = &network.attributes else {
                anyhow::bail!("'{}' is not a network resource", network.id);
            };
            let key = VariantKey::new(attrs.uuid, network.variant_num);
            if state.networks.contains_key(&key) {
                return Err(StoreError::AlreadyExists {
                    key,
                    resource_type: ResourceType::Network,
                    id: network.id.clone(),
                }
                .into());
            }
            state.networks.insert(key, network);
        }
        Ok(())
    }

    async fn update_networks(&self, networks: Vec<Resource>) -> Result<()> {
        let ids = networks.iter().map(|n| n.id.clone()).collect();
        self.enter(StoreOp::UpdateNetworks, Some(ResourceType::Network), ids)
            .await?;
        let mut state = lock(&self.state);
        for network in networks {
            if let Attributes::Network(attrs) = &network.attributes {
                let key = VariantKey::new(attrs.uuid, network.variant_num);
                state.networks.insert(key, network);
            }
        }
        Ok(())
    }

    async fn delete_network(&self, network_id: Uuid) -> Result<()> {
        self.enter(StoreOp::DeleteNetwork, None, vec![network_id.to_string()])
            .await?;
        let mut state = lock(&self.state);
        state.networks.retain(|k, _| k.network_id != network_id);
        state.resources.retain(|(k, _), _| k.network_id != network_id);
        state.extensions.retain(|(k, _), _| k.network_id != network_id);
        state.limits.retain(|(k, _), _| k.network_id != network_id);
        Ok(())
    }

    async fn delete_network_variant(&self, network_id: Uuid, variant_num: i32) -> Result<()> {
        self.enter(StoreOp::DeleteVariant, None, vec![variant_num.to_string()])
            .await?;
        let key = VariantKey::new(network_id, variant_num);
        let mut state = lock(&self.state);
        state.networks.remove(&key);
        state.resources.retain(|(k, _), _| *k != key);
        state.extensions.retain(|(k, _), _| *k != key);
        state.limits.retain(|(k, _), _| *k != key);
        Ok(())
    }

    async fn clone_network_variant(
        &self,
        network_id: Uuid,
        source_variant_num: i32,
        target_variant_num: i32,
        target_variant_id: &str,
    ) -> Result<()> {
        self.enter(
            StoreOp::CloneVariant,
            None,
            vec![target_variant_id.to_string()],
        )
        .await?;
        let source = VariantKey::new(network_id, source_variant_num);
        let target = VariantKey::new(network_id, target_variant_num);
        let mut state = lock(&self.state);
        let Some(root) = state.networks.get(&source).cloned() else {
            return Err(StoreError::UnknownNetwork(network_id).into());
        };
        let mut root = root.for_variant(target_variant_num);
        if let Attributes::Network(attrs) = &mut root.attributes {
            attrs.variant_id = target_variant_id.to_string();
        }
        state.networks.insert(target, root);

        let collections: Vec<_> = state
            .resources
            .iter()
            .filter(|((k, _), _)| *k == source)
            .map(|((_, t), c)| {
                let copied: Collection = c
                    .iter()
                    .map(|(id, r)| (id.clone(), r.for_variant(target_variant_num)))
                    .collect();
                (*t, copied)
            })
            .collect();
        for (t, c) in collections {
            state.resources.insert((target, t), c);
        }
        let extensions: Vec<_> = state
            .extensions
            .iter()
            .filter(|((k, _), _)| *k == source)
            .map(|((_, t), e)| (*t, e.clone()))
            .collect();
        for (t, e) in extensions {
            state.extensions.insert((target, t), e);
        }
        let limits: Vec<_> = state
            .limits
            .iter()
            .filter(|((k, _), _)| *k == source)
            .map(|((_, t), l)| (*t, l.clone()))
            .collect();
        for (t, l) in limits {
            state.limits.insert((target, t), l);
        }
        Ok(())
    }

    async fn get_network(&self, network_id: Uuid, variant_num: i32) -> Result<Option<Resource>> {
        self.enter(StoreOp::GetNetwork, Some(ResourceType::Network), Vec::new())
            .await?;
        Ok(lock(&self.state)
            .networks
            .get(&VariantKey::new(network_id, variant_num))
            .cloned())
    }

    async fn create_resources(
        &self,
        network_id: Uuid,
        resource_type: ResourceType,
        resources: Vec<Resource>,
    ) -> Result<()> {
        let ids = resources.iter().map(|r| r.id.clone()).collect();
        self.enter(StoreOp::Create, Some(resource_type), ids).await?;
        let mut state = lock(&self.state);
        for resource in &resources {
            let key = VariantKey::new(network_id, resource.variant_num);
            let exists = state
                .resources
                .get(&(key, resource_type))
                .is_some_and(|c| c.contains_key(&resource.id));
            if exists {
                return Err(StoreError::AlreadyExists {
                    key,
                    resource_type,
                    id: resource.id.clone(),
                }
                .into());
            }
        }
        for resource in resources {
            let key = VariantKey::new(network_id, resource.variant_num);
            state
                .resources
                .entry((key, resource_type))
                .or_default()
                .insert(resource.id.clone(), resource);
        }
        Ok(())
    }

    async fn update_resources(
        &self,
        network_id: Uuid,
        resource_type: ResourceType,
        resources: Vec<Resource>,
    ) -> Result<()> {
        let ids = resources.iter().map(|r| r.id.clone()).collect();
        self.enter(StoreOp::Update, Some(resource_type), ids).await?;
        let mut state = lock(&self.state);
        for resource in resources {
            let key = VariantKey::new(network_id, resource.variant_num);
            state
                .resources
                .entry((key, resource_type))
                .or_default()
                .insert(resource.id.clone(), resource);
        }
        Ok(())
    }

    async fn remove_resources(
        &self,
        network_id: Uuid,
        variant_num: i32,
        resource_type: ResourceType,
        ids: Vec<String>,
    ) -> Result<()> {
        self.enter(StoreOp::Remove, Some(resource_type), ids.clone())
            .await?;
        let key = VariantKey::new(network_id, variant_num);
        let mut state = lock(&self.state);
        if let Some(collection) = state.resources.get_mut(&(key, resource_type)) {
            for id in &ids {
                collection.remove(id);
            }
        }
        if let Some(extensions) = state.extensions.get_mut(&(key, resource_type)) {
            for id in &ids {
                extensions.remove(id);
            }
        }
        Ok(())
    }

    async fn get_resource(
        &self,
        network_id: Uuid,
        variant_num: i32,
        resource_type: ResourceType,
        id: &str,
    ) -> Result<Option<Resource>> {
        self.enter(StoreOp::GetOne, Some(resource_type), vec![id.to_string()])
            .await?;
        Ok(self.stored(VariantKey::new(network_id, variant_num), resource_type, id))
    }

    async fn get_resources(
        &self,
        network_id: Uuid,
        variant_num: i32,
        resource_type: ResourceType,
    ) -> Result<Vec<Resource>> {
        self.enter(StoreOp::GetAll, Some(resource_type), Vec::new())
            .await?;
        let key = VariantKey::new(network_id, variant_num);
        Ok(lock(&self.state)
            .resources
            .get(&(key, resource_type))
            .map(|c| c.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn get_container_resources(
        &self,
        network_id: Uuid,
        variant_num: i32,
        resource_type: ResourceType,
        container_id: &str,
    ) -> Result<Vec<Resource>> {
        self.enter(
            StoreOp::GetContainer,
            Some(resource_type),
            vec![container_id.to_string()],
        )
        .await?;
        let key = VariantKey::new(network_id, variant_num);
        Ok(lock(&self.state)
            .resources
            .get(&(key, resource_type))
            .map(|c| {
                c.values()
                    .filter(|r| Self::belongs_to(r, container_id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get_extension_attributes(
        &self,
        network_id: Uuid,
        variant_num: i32,
        resource_type: ResourceType,
        extension_name: &str,
    ) -> Result<HashMap<String, ExtensionAttributes>> {
        self.enter(
            StoreOp::GetExtensions,
            Some(resource_type),
            vec![extension_name.to_string()],
        )
        .await?;
        let key = VariantKey::new(network_id, variant_num);
        Ok(lock(&self.state)
            .extensions
            .get(&(key, resource_type))
            .map(|e| {
                e.iter()
                    .filter_map(|(id, names)| {
                        names.get(extension_name).map(|v| (id.clone(), v.clone()))
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get_all_extension_attributes(
        &self,
        network_id: Uuid,
        variant_num: i32,
        resource_type: ResourceType,
    ) -> Result<HashMap<String, HashMap<String, ExtensionAttributes>>> {
        self.enter(StoreOp::GetAllExtensions, Some(resource_type), Vec::new())
            .await?;
        let key = VariantKey::new(network_id, variant_num);
        Ok(lock(&self.state)
            .extensions
            .get(&(key, resource_type))
            .map(|e| {
                e.iter()
                    .map(|(id, names)| {
                        let names = names.iter().map(|(n, v)| (n.clone(), v.clone())).collect();
                        (id.clone(), names)
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get_resource_extension(
        &self,
        network_id: Uuid,
        variant_num: i32,
        resource_type: ResourceType,
        id: &str,
        extension_name: &str,
    ) -> Result<Option<ExtensionAttributes>> {
        self.enter(
            StoreOp::GetResourceExtension,
            Some(resource_type),
            vec![id.to_string()],
        )
        .await?;
        Ok(self.stored_extension(
            VariantKey::new(network_id, variant_num),
            resource_type,
            id,
            extension_name,
        ))
    }

    async fn remove_extension_attributes(
        &self,
        network_id: Uuid,
        variant_num: i32,
        resource_type: ResourceType,
        removals: RemovalBatch,
    ) -> Result<()> {
        let ids = removals.keys().cloned().collect();
        self.enter(StoreOp::RemoveExtensions, Some(resource_type), ids)
            .await?;
        let key = VariantKey::new(network_id, variant_num);
        let mut state = lock(&self.state);
        if let Some(extensions) = state.extensions.get_mut(&(key, resource_type)) {
            for (id, names) in removals {
                if let Some(existing) = extensions.get_mut(&id) {
                    existing.retain(|n, _| !names.contains(n));
                }
            }
        }
        Ok(())
    }

    async fn get_operational_limits_groups(
        &self,
        network_id: Uuid,
        variant_num: i32,
        resource_type: ResourceType,
        selection: LimitsSelection,
    ) -> Result<HashMap<String, Vec<OperationalLimitsGroup>>> {
        self.enter(StoreOp::GetLimits, Some(resource_type), Vec::new())
            .await?;
        let key = VariantKey::new(network_id, variant_num);
        let state = lock(&self.state);
        let Some(limits) = state.limits.get(&(key, resource_type)) else {
            return Ok(HashMap::new());
        };
        let collection = state.resources.get(&(key, resource_type));
        let mut result = HashMap::new();
        for (branch_id, groups) in limits {
            let groups: Vec<_> = match selection {
                LimitsSelection::All => groups.clone(),
                LimitsSelection::Selected => {
                    let Some(branch) = collection.and_then(|c| c.get(branch_id)) else {
                        continue;
                    };
                    groups
                        .iter()
                        .filter(|g| {
                            branch.attributes.selected_limits_group(g.side) == Some(g.id.as_str())
                        })
                        .cloned()
                        .collect()
                }
            };
            if !groups.is_empty() {
                result.insert(branch_id.clone(), groups);
            }
        }
        Ok(result)
    }

    async fn get_branch_operational_limits_groups(
        &self,
        network_id: Uuid,
        variant_num: i32,
        resource_type: ResourceType,
        branch_id: &str,
    ) -> Result<Vec<OperationalLimitsGroup>> {
        self.enter(
            StoreOp::GetBranchLimits,
            Some(resource_type),
            vec![branch_id.to_string()],
        )
        .await?;
        let key = VariantKey::new(network_id, variant_num);
        Ok(lock(&self.state)
            .limits
            .get(&(key, resource_type))
            .and_then(|l| l.get(branch_id))
            .cloned()
            .unwrap_or_default())
    }

    async fn remove_operational_limits_groups(
        &self,
        network_id: Uuid,
        variant_num: i32,
        resource_type: ResourceType,
        removals: RemovalBatch,
    ) -> Result<()> {
        let ids = removals.keys().cloned().collect();
        self.enter(StoreOp::RemoveLimits, Some(resource_type), ids)
            .await?;
        let key = VariantKey::new(network_id, variant_num);
        let mut state = lock(&self.state);
        if let Some(limits) = state.limits.get_mut(&(key, resource_type)) {
            for (branch_id, keys) in removals {
                if let Some(groups) = limits.get_mut(&branch_id) {
                    groups.retain(|g| !keys.contains(&group_key(&g.id, g.side)));
                }
            }
        }
        Ok(())
    }
}
