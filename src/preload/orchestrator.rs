//! Preloading orchestrator
//!
//! Fans a strategy out into concurrent bulk loads: one branch per resource
//! type, and inside each branch the resources, each extension name and the
//! operational limits load side by side. The join fails as soon as any
//! branch fails.

use super::strategy::{PreloadingStrategy, ResourceDescriptor};
use crate::cache::ReadCache;
use crate::resource::ResourceType;
use crate::store::NetworkStoreClient;
use anyhow::Result;
use futures::future::try_join_all;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Resource types fully loaded into a cache, shared across load branches
pub type LoadedTypes = Arc<Mutex<BTreeSet<ResourceType>>>;

/// What one preload brought into the cache
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreloadReport {
    pub resources: BTreeMap<ResourceType, usize>,
    pub extensions: usize,
    pub limits_groups: usize,
    pub elapsed: Duration,
}

impl PreloadReport {
    pub fn resource_count(&self) -> usize {
        self.resources.values().sum()
    }
}

#[derive(Debug)]
struct BranchOutcome {
    resource_type: ResourceType,
    resources: usize,
    extensions: usize,
    limits_groups: usize,
}

/// Bulk loader of one strategy against one store
pub struct PreloadingOrchestrator {
    strategy: PreloadingStrategy,
    client: Arc<dyn NetworkStoreClient>,
}

impl PreloadingOrchestrator {
    pub fn new(strategy: PreloadingStrategy, client: Arc<dyn NetworkStoreClient>) -> Self {
        Self { strategy, client }
    }

    pub fn strategy(&self) -> &PreloadingStrategy {
        &self.strategy
    }

    /// Load every described type into `cache`, recording each fully loaded
    /// type into `loaded_types` as soon as its resources are in
    pub async fn load_resources(
        &self,
        cache: &ReadCache,
        loaded_types: &LoadedTypes,
    ) -> Result<PreloadReport> {
        let descriptors = self.strategy.descriptors();
        if descriptors.is_empty() {
            return Ok(PreloadReport::default());
        }

        let started = Instant::now();
        tracing::debug!(
            "preloading {} resource types into {}",
            descriptors.len(),
            cache.key()
        );

        let outcomes = try_join_all(
            descriptors
                .iter()
                .map(|d| self.load_descriptor(cache, d, loaded_types)),
        )
        .await?;

        let mut report = PreloadReport {
            elapsed: started.elapsed(),
            ..PreloadReport::default()
        };
        for outcome in outcomes {
            report
                .resources
                .insert(outcome.resource_type, outcome.resources);
            report.extensions += outcome.extensions;
            report.limits_groups += outcome.limits_groups;
        }

        tracing::info!(
            "preloaded {} resources, {} extensions, {} limits groups into {} in {:?}",
            report.resource_count(),
            report.extensions,
            report.limits_groups,
            cache.key(),
            report.elapsed
        );
        Ok(report)
    }

    async fn load_descriptor(
        &self,
        cache: &ReadCache,
        descriptor: &ResourceDescriptor,
        loaded_types: &LoadedTypes,
    ) -> Result<BranchOutcome> {
        let key = cache.key();
        let resource_type = descriptor.resource_type;
        let client = self.client.as_ref();

        let resources = async {
            let loaded = cache
                .load_all(resource_type, || {
                    client.get_resources(key.network_id, key.variant_num, resource_type)
                })
                .await?;
            loaded_types
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(resource_type);
            Ok::<_, anyhow::Error>(loaded)
        };

        let extensions = async {
            if descriptor.all_extensions {
                return cache
                    .load_all_extensions(resource_type, || {
                        client.get_all_extension_attributes(
                            key.network_id,
                            key.variant_num,
                            resource_type,
                        )
                    })
                    .await;
            }
            let counts = try_join_all(descriptor.extensions.iter().map(|name| {
                cache.load_extension(resource_type, name, move || {
                    client.get_extension_attributes(
                        key.network_id,
                        key.variant_num,
                        resource_type,
                        name,
                    )
                })
            }))
            .await?;
            Ok::<_, anyhow::Error>(counts.into_iter().sum::<usize>())
        };

        let limits = async {
            match descriptor.limits {
                Some(selection) => {
                    cache
                        .load_limits(resource_type, selection, || {
                            client.get_operational_limits_groups(
                                key.network_id,
                                key.variant_num,
                                resource_type,
                                selection,
                            )
                        })
                        .await
                }
                None => Ok(0),
            }
        };

        let (resources, extensions, limits_groups) =
            tokio::try_join!(resources, extensions, limits)?;
        Ok(BranchOutcome {
            resource_type,
            resources,
            extensions,
            limits_groups,
        })
    }
}
