//! Read cache of one network variant
//!
//! Every lookup goes through a per-key [`OnceCell`]: the first caller to miss
//! registers the cell, runs the loader, and every concurrent caller awaits
//! that same load. Resolved absences are cached too, so a second miss on an
//! unknown id costs nothing.
//!
//! Bulk loads (a whole type, one container, one extension name, limits) are
//! gated the same way and mark their scope as complete: once a type is fully
//! loaded, a miss on it is a true miss.

use crate::resource::{
    ExtensionAttributes, LimitsSelection, OperationalLimitsGroup, Resource, ResourceRef,
    ResourceType, VariantKey,
};
use anyhow::Result;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::OnceCell;

/// Single-flight cell holding a resolved value or a resolved absence
type Slot<T> = Arc<OnceCell<Option<T>>>;

/// Completion marker of a bulk load, holding how many entries it brought
type LoadGate = Arc<OnceCell<usize>>;

fn resolved<T>(value: Option<T>) -> Slot<T> {
    Arc::new(OnceCell::new_with(Some(value)))
}

fn copy_gate(gate: &LoadGate) -> LoadGate {
    Arc::new(OnceCell::new_with(gate.get().copied()))
}

#[derive(Default)]
struct TypeEntries {
    slots: HashMap<String, Slot<ResourceRef>>,
    full_load: LoadGate,
    container_loads: HashMap<String, LoadGate>,
    /// Ids removed locally; bulk loads must not bring them back
    removed: HashSet<String>,
}

#[derive(Default)]
struct ExtensionEntries {
    /// Keyed by (resource id, extension name)
    slots: HashMap<(String, String), Slot<ExtensionAttributes>>,
    name_loads: HashMap<String, LoadGate>,
    all_load: LoadGate,
    removed: HashSet<(String, String)>,
}

#[derive(Default)]
struct LimitsEntries {
    /// Branch id to groups keyed by `group_key`
    groups: HashMap<String, BTreeMap<String, OperationalLimitsGroup>>,
    selected_load: LoadGate,
    all_load: LoadGate,
    branch_loads: HashMap<String, LoadGate>,
    removed: HashSet<(String, String)>,
}

#[derive(Default)]
struct CacheState {
    types: HashMap<ResourceType, TypeEntries>,
    extensions: HashMap<ResourceType, ExtensionEntries>,
    limits: HashMap<ResourceType, LimitsEntries>,
}

impl CacheState {
    fn is_removed(&self, resource_type: ResourceType, id: &str) -> bool {
        self.types
            .get(&resource_type)
            .is_some_and(|e| e.removed.contains(id))
    }
}

/// Memoizing cache of one network variant
pub struct ReadCache {
    key: VariantKey,
    state: Mutex<CacheState>,
}

impl ReadCache {
    pub fn new(key: VariantKey) -> Self {
        Self {
            key,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn key(&self) -> VariantKey {
        self.key
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // =========================================================================
    // Resources
    // =========================================================================

    /// Cached value of a resource, without loading
    pub fn cached(&self, resource_type: ResourceType, id: &str) -> Option<ResourceRef> {
        let state = self.lock();
        state
            .types
            .get(&resource_type)?
            .slots
            .get(id)?
            .get()?
            .clone()
    }

    /// Every resolved resource of a type, ordered by id
    pub fn cached_resources(&self, resource_type: ResourceType) -> Vec<ResourceRef> {
        let state = self.lock();
        let Some(entries) = state.types.get(&resource_type) else {
            return Vec::new();
        };
        let mut resources: Vec<_> = entries
            .slots
            .iter()
            .filter_map(|(id, slot)| slot.get()?.clone().map(|r| (id.clone(), r)))
            .collect();
        resources.sort_by(|a, b| a.0.cmp(&b.0));
        resources.into_iter().map(|(_, r)| r).collect()
    }

    /// Resource by id, loading it on a miss
    ///
    /// At most one `loader` runs per id, however many callers miss at once;
    /// they all observe its result. A failed load is not cached.
    pub async fn get_resource<F, Fut>(
        &self,
        resource_type: ResourceType,
        id: &str,
        loader: F,
    ) -> Result<Option<ResourceRef>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<Resource>>>,
    {
        let slot = {
            let mut state = self.lock();
            let entries = state.types.entry(resource_type).or_default();
            if entries.removed.contains(id) {
                return Ok(None);
            }
            match entries.slots.get(id) {
                Some(slot) => slot.clone(),
                None if entries.full_load.initialized() => return Ok(None),
                None => {
                    let slot: Slot<ResourceRef> = Arc::new(OnceCell::new());
                    entries.slots.insert(id.to_string(), slot.clone());
                    slot
                }
            }
        };

        let key = self.key;
        let value = slot
            .get_or_try_init(|| async move {
                tracing::debug!("cache miss {} {} '{}'", key, resource_type, id);
                Ok::<_, anyhow::Error>(loader().await?.map(ResourceRef::new))
            })
            .await?
            .clone();

        // A local write or removal may have replaced the slot meanwhile
        let replaced = {
            let state = self.lock();
            state
                .types
                .get(&resource_type)
                .and_then(|e| e.slots.get(id))
                .filter(|current| !Arc::ptr_eq(*current, &slot))
                .map(|current| current.get().cloned().flatten())
        };
        Ok(replaced.unwrap_or(value))
    }

    /// Every resource of a type, bulk loading the type once
    pub async fn get_resources<F, Fut>(
        &self,
        resource_type: ResourceType,
        loader: F,
    ) -> Result<Vec<ResourceRef>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<Resource>>>,
    {
        self.load_all(resource_type, loader).await?;
        Ok(self.cached_resources(resource_type))
    }

    /// Bulk load a whole type once, returning how many resources it brought
    pub async fn load_all<F, Fut>(&self, resource_type: ResourceType, loader: F) -> Result<usize>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<Resource>>>,
    {
        let gate = self
            .lock()
            .types
            .entry(resource_type)
            .or_default()
            .full_load
            .clone();
        let loaded = gate
            .get_or_try_init(|| async move {
                let resources = loader().await?;
                Ok::<_, anyhow::Error>(self.absorb(resource_type, resources))
            })
            .await?;
        Ok(*loaded)
    }

    /// Resources of a type in one container, loading the container once
    ///
    /// Served from cache when the type is fully loaded. Locally created
    /// resources are included.
    pub async fn get_container_resources<F, Fut>(
        &self,
        resource_type: ResourceType,
        container_id: &str,
        loader: F,
    ) -> Result<Vec<ResourceRef>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<Resource>>>,
    {
        let gate = {
            let mut state = self.lock();
            let entries = state.types.entry(resource_type).or_default();
            if entries.full_load.initialized() {
                None
            } else {
                Some(
                    entries
                        .container_loads
                        .entry(container_id.to_string())
                        .or_default()
                        .clone(),
                )
            }
        };
        if let Some(gate) = gate {
            gate.get_or_try_init(|| async move {
                let resources = loader().await?;
                Ok::<_, anyhow::Error>(self.absorb(resource_type, resources))
            })
            .await?;
        }
        Ok(self
            .cached_resources(resource_type)
            .into_iter()
            .filter(|r| r.read().attributes.container_ids().contains(&container_id))
            .collect())
    }

    /// Merge remotely loaded resources
    ///
    /// Resolved local values win; locally removed ids are skipped.
    fn absorb(&self, resource_type: ResourceType, resources: Vec<Resource>) -> usize {
        let mut state = self.lock();
        let entries = state.types.entry(resource_type).or_default();
        let mut absorbed = 0;
        let mut skipped = 0;
        for resource in resources {
            if entries.removed.contains(&resource.id) {
                skipped += 1;
                continue;
            }
            let id = resource.id.clone();
            match entries.slots.get(&id).map(|s| s.get().map(Option::is_some)) {
                Some(Some(true)) => {}
                Some(None) => {
                    if let Some(slot) = entries.slots.get(&id) {
                        // Fails only when a single load is in flight; its result wins
                        let _ = slot.set(Some(ResourceRef::new(resource)));
                    }
                }
                _ => {
                    entries
                        .slots
                        .insert(id, resolved(Some(ResourceRef::new(resource))));
                }
            }
            absorbed += 1;
        }
        if skipped > 0 {
            tracing::warn!(
                "{}: skipped {} locally removed {} resources",
                self.key,
                skipped,
                resource_type
            );
        }
        absorbed
    }

    /// Cache a locally created or replaced resource
    pub fn put(&self, resource: ResourceRef) {
        let id = resource.id();
        let mut state = self.lock();
        let entries = state.types.entry(resource.resource_type()).or_default();
        entries.removed.remove(&id);
        entries.slots.insert(id, resolved(Some(resource)));
    }

    /// Record a local removal, returning the cached value if there was one
    pub fn remove(&self, resource_type: ResourceType, id: &str) -> Option<ResourceRef> {
        let mut state = self.lock();
        let entries = state.types.entry(resource_type).or_default();
        entries.removed.insert(id.to_string());
        let previous = entries
            .slots
            .insert(id.to_string(), resolved(None))
            .and_then(|s| s.get().cloned().flatten());
        if let Some(extensions) = state.extensions.get_mut(&resource_type) {
            extensions.slots.retain(|(rid, _), _| rid != id);
        }
        if let Some(limits) = state.limits.get_mut(&resource_type) {
            limits.groups.remove(id);
        }
        previous
    }

    pub fn is_removed(&self, resource_type: ResourceType, id: &str) -> bool {
        self.lock().is_removed(resource_type, id)
    }

    pub fn is_fully_loaded(&self, resource_type: ResourceType) -> bool {
        self.lock()
            .types
            .get(&resource_type)
            .is_some_and(|e| e.full_load.initialized())
    }

    pub fn fully_loaded_types(&self) -> Vec<ResourceType> {
        let state = self.lock();
        let mut types: Vec<_> = state
            .types
            .iter()
            .filter(|(_, e)| e.full_load.initialized())
            .map(|(t, _)| *t)
            .collect();
        types.sort();
        types
    }

    // =========================================================================
    // Extensions
    // =========================================================================

    /// One extension of one resource, loading it on a miss
    ///
    /// Once the extension name was bulk loaded for the type, a miss is final.
    pub async fn get_extension<F, Fut>(
        &self,
        resource_type: ResourceType,
        id: &str,
        name: &str,
        loader: F,
    ) -> Result<Option<ExtensionAttributes>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<ExtensionAttributes>>>,
    {
        let slot = {
            let mut state = self.lock();
            if state.is_removed(resource_type, id) {
                return Ok(None);
            }
            let entries = state.extensions.entry(resource_type).or_default();
            let slot_key = (id.to_string(), name.to_string());
            if entries.removed.contains(&slot_key) {
                return Ok(None);
            }
            let name_loaded = entries.all_load.initialized()
                || entries.name_loads.get(name).is_some_and(|g| g.initialized());
            match entries.slots.get(&slot_key) {
                Some(slot) => slot.clone(),
                None if name_loaded => return Ok(None),
                None => {
                    let slot: Slot<ExtensionAttributes> = Arc::new(OnceCell::new());
                    entries.slots.insert(slot_key, slot.clone());
                    slot
                }
            }
        };
        let value = slot
            .get_or_try_init(|| async move {
                tracing::debug!("cache miss {} {} '{}' extension {}", self.key, resource_type, id, name);
                loader().await
            })
            .await?;
        Ok(value.clone())
    }

    /// Bulk load one extension name of a type, once
    pub async fn load_extension<F, Fut>(
        &self,
        resource_type: ResourceType,
        name: &str,
        loader: F,
    ) -> Result<usize>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<HashMap<String, ExtensionAttributes>>>,
    {
        let gate = self
            .lock()
            .extensions
            .entry(resource_type)
            .or_default()
            .name_loads
            .entry(name.to_string())
            .or_default()
            .clone();
        let loaded = gate
            .get_or_try_init(|| async move {
                let values = loader().await?;
                let values = values
                    .into_iter()
                    .map(|(id, value)| (id, name.to_string(), value));
                Ok::<_, anyhow::Error>(self.absorb_extensions(resource_type, values))
            })
            .await?;
        Ok(*loaded)
    }

    /// Bulk load every extension of a type, once
    pub async fn load_all_extensions<F, Fut>(
        &self,
        resource_type: ResourceType,
        loader: F,
    ) -> Result<usize>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<HashMap<String, HashMap<String, ExtensionAttributes>>>>,
    {
        let gate = self
            .lock()
            .extensions
            .entry(resource_type)
            .or_default()
            .all_load
            .clone();
        let loaded = gate
            .get_or_try_init(|| async move {
                let values = loader().await?;
                let values = values.into_iter().flat_map(|(id, names)| {
                    names
                        .into_iter()
                        .map(move |(name, value)| (id.clone(), name, value))
                });
                Ok::<_, anyhow::Error>(self.absorb_extensions(resource_type, values))
            })
            .await?;
        Ok(*loaded)
    }

    fn absorb_extensions(
        &self,
        resource_type: ResourceType,
        values: impl Iterator<Item = (String, String, ExtensionAttributes)>,
    ) -> usize {
        let mut state = self.lock();
        let removed_resources = state
            .types
            .get(&resource_type)
            .map(|e| e.removed.clone())
            .unwrap_or_default();
        let entries = state.extensions.entry(resource_type).or_default();
        let mut absorbed = 0;
        for (id, name, value) in values {
            if removed_resources.contains(&id) {
                continue;
            }
            let slot_key = (id, name);
            if entries.removed.contains(&slot_key) {
                continue;
            }
            match entries.slots.get(&slot_key).map(|s| s.get().map(Option::is_some)) {
                Some(Some(true)) => {}
                Some(None) => {
                    if let Some(slot) = entries.slots.get(&slot_key) {
                        let _ = slot.set(Some(value));
                    }
                }
                _ => {
                    entries.slots.insert(slot_key, resolved(Some(value)));
                }
            }
            absorbed += 1;
        }
        absorbed
    }

    /// Whether a bulk load covered this extension name for the type
    pub fn is_extension_loaded(&self, resource_type: ResourceType, name: &str) -> bool {
        self.lock().extensions.get(&resource_type).is_some_and(|e| {
            e.all_load.initialized() || e.name_loads.get(name).is_some_and(|g| g.initialized())
        })
    }

    /// Names of the resolved extensions of one resource
    pub fn cached_extension_names(&self, resource_type: ResourceType, id: &str) -> Vec<String> {
        let state = self.lock();
        let Some(entries) = state.extensions.get(&resource_type) else {
            return Vec::new();
        };
        let mut names: Vec<_> = entries
            .slots
            .iter()
            .filter(|((rid, _), slot)| rid == id && matches!(slot.get(), Some(Some(_))))
            .map(|((_, name), _)| name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn put_extension(
        &self,
        resource_type: ResourceType,
        id: &str,
        name: &str,
        value: ExtensionAttributes,
    ) {
        let mut state = self.lock();
        let entries = state.extensions.entry(resource_type).or_default();
        let slot_key = (id.to_string(), name.to_string());
        entries.removed.remove(&slot_key);
        entries.slots.insert(slot_key, resolved(Some(value)));
    }

    /// Record a local extension removal, returning whether a value was cached
    pub fn remove_extension(&self, resource_type: ResourceType, id: &str, name: &str) -> bool {
        let mut state = self.lock();
        let entries = state.extensions.entry(resource_type).or_default();
        let slot_key = (id.to_string(), name.to_string());
        entries.removed.insert(slot_key.clone());
        entries
            .slots
            .insert(slot_key, resolved(None))
            .is_some_and(|s| matches!(s.get(), Some(Some(_))))
    }

    // =========================================================================
    // Operational limits
    // =========================================================================

    /// Bulk load limits groups of a branch type, once per selection level
    ///
    /// A previous `All` load already covers `Selected`.
    pub async fn load_limits<F, Fut>(
        &self,
        resource_type: ResourceType,
        selection: LimitsSelection,
        loader: F,
    ) -> Result<usize>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<HashMap<String, Vec<OperationalLimitsGroup>>>>,
    {
        let gate = {
            let mut state = self.lock();
            let entries = state.limits.entry(resource_type).or_default();
            if let Some(loaded) = entries.all_load.get() {
                return Ok(*loaded);
            }
            match selection {
                LimitsSelection::Selected => entries.selected_load.clone(),
                LimitsSelection::All => entries.all_load.clone(),
            }
        };
        let loaded = gate
            .get_or_try_init(|| async move {
                let groups = loader().await?;
                Ok::<_, anyhow::Error>(self.absorb_limits(resource_type, groups))
            })
            .await?;
        Ok(*loaded)
    }

    /// Highest selection level bulk loaded for a type
    pub fn limits_loaded(&self, resource_type: ResourceType) -> Option<LimitsSelection> {
        let state = self.lock();
        let entries = state.limits.get(&resource_type)?;
        if entries.all_load.initialized() {
            Some(LimitsSelection::All)
        } else if entries.selected_load.initialized() {
            Some(LimitsSelection::Selected)
        } else {
            None
        }
    }

    /// Every limits group of one branch, loading the branch once unless the
    /// whole type was loaded at the `All` level
    pub async fn branch_limits_groups<F, Fut>(
        &self,
        resource_type: ResourceType,
        branch_id: &str,
        loader: F,
    ) -> Result<Vec<OperationalLimitsGroup>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<OperationalLimitsGroup>>>,
    {
        let gate = {
            let mut state = self.lock();
            if state.is_removed(resource_type, branch_id) {
                return Ok(Vec::new());
            }
            let entries = state.limits.entry(resource_type).or_default();
            if entries.all_load.initialized() {
                None
            } else {
                Some(
                    entries
                        .branch_loads
                        .entry(branch_id.to_string())
                        .or_default()
                        .clone(),
                )
            }
        };
        if let Some(gate) = gate {
            gate.get_or_try_init(|| async move {
                let groups = loader().await?;
                let groups = HashMap::from([(branch_id.to_string(), groups)]);
                Ok::<_, anyhow::Error>(self.absorb_limits(resource_type, groups))
            })
            .await?;
        }
        Ok(self.cached_limits_groups(resource_type, branch_id))
    }

    fn absorb_limits(
        &self,
        resource_type: ResourceType,
        groups: HashMap<String, Vec<OperationalLimitsGroup>>,
    ) -> usize {
        let mut state = self.lock();
        let removed_resources = state
            .types
            .get(&resource_type)
            .map(|e| e.removed.clone())
            .unwrap_or_default();
        let entries = state.limits.entry(resource_type).or_default();
        let mut absorbed = 0;
        for (branch_id, branch_groups) in groups {
            if removed_resources.contains(&branch_id) {
                continue;
            }
            for group in branch_groups {
                let key = group.key();
                if entries.removed.contains(&(branch_id.clone(), key.clone())) {
                    continue;
                }
                entries
                    .groups
                    .entry(branch_id.clone())
                    .or_default()
                    .entry(key)
                    .or_insert(group);
                absorbed += 1;
            }
        }
        absorbed
    }

    /// Cached limits groups of one branch, ordered by group key
    pub fn cached_limits_groups(
        &self,
        resource_type: ResourceType,
        branch_id: &str,
    ) -> Vec<OperationalLimitsGroup> {
        self.lock()
            .limits
            .get(&resource_type)
            .and_then(|e| e.groups.get(branch_id))
            .map(|g| g.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Record a local limits group removal, returning whether it was cached
    pub fn remove_limits_group(&self, resource_type: ResourceType, branch_id: &str, key: &str) -> bool {
        let mut state = self.lock();
        let entries = state.limits.entry(resource_type).or_default();
        entries
            .removed
            .insert((branch_id.to_string(), key.to_string()));
        entries
            .groups
            .get_mut(branch_id)
            .and_then(|g| g.remove(key))
            .is_some()
    }

    // =========================================================================
    // Variants
    // =========================================================================

    /// Deep copy of every resolved entry, re-targeted at another variant
    ///
    /// Loads still in flight are not copied; the target loads them itself.
    pub fn clone_for_variant(&self, target: VariantKey) -> ReadCache {
        let state = self.lock();
        let mut copy = CacheState::default();

        for (resource_type, entries) in &state.types {
            let slots = entries
                .slots
                .iter()
                .filter_map(|(id, slot)| {
                    let value = slot.get()?.as_ref().map(|r| {
                        ResourceRef::new(r.read().for_variant(target.variant_num))
                    });
                    Some((id.clone(), resolved(value)))
                })
                .collect();
            let container_loads = entries
                .container_loads
                .iter()
                .filter(|(_, g)| g.initialized())
                .map(|(c, g)| (c.clone(), copy_gate(g)))
                .collect();
            copy.types.insert(
                *resource_type,
                TypeEntries {
                    slots,
                    full_load: copy_gate(&entries.full_load),
                    container_loads,
                    removed: entries.removed.clone(),
                },
            );
        }

        for (resource_type, entries) in &state.extensions {
            let slots = entries
                .slots
                .iter()
                .filter_map(|(k, slot)| Some((k.clone(), resolved(slot.get()?.clone()))))
                .collect();
            let name_loads = entries
                .name_loads
                .iter()
                .filter(|(_, g)| g.initialized())
                .map(|(n, g)| (n.clone(), copy_gate(g)))
                .collect();
            copy.extensions.insert(
                *resource_type,
                ExtensionEntries {
                    slots,
                    name_loads,
                    all_load: copy_gate(&entries.all_load),
                    removed: entries.removed.clone(),
                },
            );
        }

        for (resource_type, entries) in &state.limits {
            let branch_loads = entries
                .branch_loads
                .iter()
                .filter(|(_, g)| g.initialized())
                .map(|(b, g)| (b.clone(), copy_gate(g)))
                .collect();
            copy.limits.insert(
                *resource_type,
                LimitsEntries {
                    groups: entries.groups.clone(),
                    selected_load: copy_gate(&entries.selected_load),
                    all_load: copy_gate(&entries.all_load),
                    branch_loads,
                    removed: entries.removed.clone(),
                },
            );
        }

        ReadCache {
            key: target,
            state: Mutex::new(copy),
        }
    }
}

impl std::fmt::Debug for ReadCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadCache")
            .field("key", &self.key)
            .field("fully_loaded", &self.fully_loaded_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{
        Attributes, InjectionAttributes, LoadingLimits, Side, TerminalAttributes,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use uuid::Uuid;

    fn load(id: &str, vl: &str) -> Resource {
        Resource::new(
            id,
            0,
            Attributes::Load(InjectionAttributes::new(TerminalAttributes::at_node(vl, 1))),
        )
    }

    fn cache() -> ReadCache {
        ReadCache::new(VariantKey::initial(Uuid::new_v4()))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_misses_share_one_load() {
        let cache = Arc::new(cache());
        let calls = Arc::new(AtomicUsize::new(0));

        let readers: Vec<_> = (0..50)
            .map(|_| {
                let cache = cache.clone();
                let calls = calls.clone();
                tokio::spawn(async move {
                    cache
                        .get_resource(ResourceType::Load, "l1", || async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            Ok(Some(load("l1", "vl1")))
                        })
                        .await
                        .unwrap()
                })
            })
            .collect();

        let results = futures::future::join_all(readers).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let first = results[0].as_ref().unwrap().clone().unwrap();
        for result in results {
            assert!(result.unwrap().unwrap().ptr_eq(&first));
        }
    }

    #[tokio::test]
    async fn test_absence_is_cached() {
        let cache = cache();
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        for _ in 0..3 {
            let found = cache
                .get_resource(ResourceType::Load, "missing", || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(None)
                })
                .await
                .unwrap();
            assert!(found.is_none());
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_load_is_retried() {
        let cache = cache();
        let first = cache
            .get_resource(ResourceType::Load, "l1", || async { anyhow::bail!("timeout") })
            .await;
        assert!(first.is_err());
        let second = cache
            .get_resource(ResourceType::Load, "l1", || async { Ok(Some(load("l1", "vl1"))) })
            .await
            .unwrap();
        assert!(second.is_some());
    }

    #[tokio::test]
    async fn test_full_load_makes_misses_final() {
        let cache = cache();
        let loaded = cache
            .load_all(ResourceType::Load, || async {
                Ok(vec![load("l1", "vl1"), load("l2", "vl1")])
            })
            .await
            .unwrap();
        assert_eq!(loaded, 2);
        assert!(cache.is_fully_loaded(ResourceType::Load));

        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let missing = cache
            .get_resource(ResourceType::Load, "l3", || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Some(load("l3", "vl1")))
            })
            .await
            .unwrap();
        assert!(missing.is_none());
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_bulk_load_keeps_local_handle_and_skips_removed() {
        let cache = cache();
        let local = ResourceRef::new(load("l1", "vl1"));
        cache.put(local.clone());
        cache.remove(ResourceType::Load, "l2");

        let all = cache
            .get_resources(ResourceType::Load, || async {
                Ok(vec![load("l1", "other"), load("l2", "vl1"), load("l3", "vl1")])
            })
            .await
            .unwrap();

        let ids: Vec<_> = all.iter().map(ResourceRef::id).collect();
        assert_eq!(ids, vec!["l1", "l3"]);
        assert!(all[0].ptr_eq(&local));
    }

    #[tokio::test]
    async fn test_container_load_runs_once_and_sees_local_creates() {
        let cache = cache();
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        cache.put(ResourceRef::new(load("new", "vl1")));

        for _ in 0..2 {
            let in_vl1 = cache
                .get_container_resources(ResourceType::Load, "vl1", || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(vec![load("l1", "vl1")])
                })
                .await
                .unwrap();
            assert_eq!(in_vl1.len(), 2);
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_extension_bulk_load_makes_misses_final() {
        let cache = cache();
        cache
            .load_extension(ResourceType::Generator, "activePowerControl", || async {
                Ok(HashMap::from([(
                    "g1".to_string(),
                    serde_json::json!({"droop": 4.0}),
                )]))
            })
            .await
            .unwrap();

        let g2 = cache
            .get_extension(ResourceType::Generator, "g2", "activePowerControl", || async {
                Ok(Some(serde_json::json!({"droop": 1.0})))
            })
            .await
            .unwrap();
        assert!(g2.is_none());
        assert_eq!(
            cache.cached_extension_names(ResourceType::Generator, "g1"),
            vec!["activePowerControl"]
        );
    }

    #[tokio::test]
    async fn test_removed_extension_is_not_reloaded() {
        let cache = cache();
        cache.put_extension(ResourceType::Load, "l1", "detail", serde_json::json!({}));
        assert!(cache.remove_extension(ResourceType::Load, "l1", "detail"));
        let value = cache
            .get_extension(ResourceType::Load, "l1", "detail", || async {
                Ok(Some(serde_json::json!({"stale": true})))
            })
            .await
            .unwrap();
        assert!(value.is_none());
    }

    fn group(id: &str, side: Side) -> OperationalLimitsGroup {
        OperationalLimitsGroup {
            id: id.to_string(),
            side,
            current_limits: Some(LoadingLimits {
                permanent_limit: 100.0,
                temporary_limits: Vec::new(),
            }),
        }
    }

    #[tokio::test]
    async fn test_all_limits_cover_selected() {
        let cache = cache();
        cache
            .load_limits(ResourceType::Line, LimitsSelection::All, || async {
                Ok(HashMap::from([(
                    "line1".to_string(),
                    vec![group("summer", Side::One), group("winter", Side::One)],
                )]))
            })
            .await
            .unwrap();
        assert_eq!(cache.limits_loaded(ResourceType::Line), Some(LimitsSelection::All));

        let reloaded = cache
            .load_limits(ResourceType::Line, LimitsSelection::Selected, || async {
                Ok(HashMap::new())
            })
            .await
            .unwrap();
        assert_eq!(reloaded, 2);
        let groups = cache
            .branch_limits_groups(ResourceType::Line, "line1", || async { Ok(Vec::new()) })
            .await
            .unwrap();
        assert_eq!(groups.len(), 2);
    }

    #[tokio::test]
    async fn test_clone_for_variant_is_deep() {
        let cache = cache();
        cache.put(ResourceRef::new(load("l1", "vl1")));
        cache
            .load_all(ResourceType::Switch, || async { Ok(Vec::new()) })
            .await
            .unwrap();

        let target = VariantKey::new(cache.key().network_id, 1);
        let copy = cache.clone_for_variant(target);
        let original = cache.cached(ResourceType::Load, "l1").unwrap();
        let cloned = copy.cached(ResourceType::Load, "l1").unwrap();

        assert!(!original.ptr_eq(&cloned));
        assert_eq!(cloned.read().variant_num, 1);
        assert!(copy.is_fully_loaded(ResourceType::Switch));
    }
}
