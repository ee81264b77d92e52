//! Network store client
//!
//! The [`NetworkStoreClient`] trait is the only way this crate reaches the
//! remote store. [`RestNetworkStoreClient`] implements it over the store's
//! REST API; the in-memory store implements it for tests and offline runs.

use super::http::StoreHttpClient;
use crate::resource::{
    ExtensionAttributes, LimitsSelection, OperationalLimitsGroup, Resource, ResourceType,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use url::Url;
use uuid::Uuid;

/// Pending extension or limits-group removals of one resource type:
/// resource id to the names being removed
pub type RemovalBatch = HashMap<String, BTreeSet<String>>;

/// Every call is a network-boundary call that may fail; none is retried here.
#[async_trait]
pub trait NetworkStoreClient: Send + Sync {
    // Network root resources

    async fn create_networks(&self, networks: Vec<Resource>) -> Result<()>;

    async fn update_networks(&self, networks: Vec<Resource>) -> Result<()>;

    async fn delete_network(&self, network_id: Uuid) -> Result<()>;

    async fn delete_network_variant(&self, network_id: Uuid, variant_num: i32) -> Result<()>;

    async fn clone_network_variant(
        &self,
        network_id: Uuid,
        source_variant_num: i32,
        target_variant_num: i32,
        target_variant_id: &str,
    ) -> Result<()>;

    async fn get_network(&self, network_id: Uuid, variant_num: i32) -> Result<Option<Resource>>;

    // Contained resources

    async fn create_resources(
        &self,
        network_id: Uuid,
        resource_type: ResourceType,
        resources: Vec<Resource>,
    ) -> Result<()>;

    async fn update_resources(
        &self,
        network_id: Uuid,
        resource_type: ResourceType,
        resources: Vec<Resource>,
    ) -> Result<()>;

    async fn remove_resources(
        &self,
        network_id: Uuid,
        variant_num: i32,
        resource_type: ResourceType,
        ids: Vec<String>,
    ) -> Result<()>;

    async fn get_resource(
        &self,
        network_id: Uuid,
        variant_num: i32,
        resource_type: ResourceType,
        id: &str,
    ) -> Result<Option<Resource>>;

    async fn get_resources(
        &self,
        network_id: Uuid,
        variant_num: i32,
        resource_type: ResourceType,
    ) -> Result<Vec<Resource>>;

    /// Resources of a type belonging to one container (voltage level, or
    /// substation for voltage levels)
    async fn get_container_resources(
        &self,
        network_id: Uuid,
        variant_num: i32,
        resource_type: ResourceType,
        container_id: &str,
    ) -> Result<Vec<Resource>>;

    // Extensions

    /// One extension of every resource of a type, keyed by resource id
    async fn get_extension_attributes(
        &self,
        network_id: Uuid,
        variant_num: i32,
        resource_type: ResourceType,
        extension_name: &str,
    ) -> Result<HashMap<String, ExtensionAttributes>>;

    /// Every extension of every resource of a type
    async fn get_all_extension_attributes(
        &self,
        network_id: Uuid,
        variant_num: i32,
        resource_type: ResourceType,
    ) -> Result<HashMap<String, HashMap<String, ExtensionAttributes>>>;

    async fn get_resource_extension(
        &self,
        network_id: Uuid,
        variant_num: i32,
        resource_type: ResourceType,
        id: &str,
        extension_name: &str,
    ) -> Result<Option<ExtensionAttributes>>;

    async fn remove_extension_attributes(
        &self,
        network_id: Uuid,
        variant_num: i32,
        resource_type: ResourceType,
        removals: RemovalBatch,
    ) -> Result<()>;

    // Operational limits

    /// Limits groups of every branch of a type, keyed by branch id
    async fn get_operational_limits_groups(
        &self,
        network_id: Uuid,
        variant_num: i32,
        resource_type: ResourceType,
        selection: LimitsSelection,
    ) -> Result<HashMap<String, Vec<OperationalLimitsGroup>>>;

    async fn get_branch_operational_limits_groups(
        &self,
        network_id: Uuid,
        variant_num: i32,
        resource_type: ResourceType,
        branch_id: &str,
    ) -> Result<Vec<OperationalLimitsGroup>>;

    /// Removal batch values are group keys (see `group_key`)
    async fn remove_operational_limits_groups(
        &self,
        network_id: Uuid,
        variant_num: i32,
        resource_type: ResourceType,
        removals: RemovalBatch,
    ) -> Result<()>;
}

/// Envelope of every store response
#[derive(Debug, Serialize, Deserialize)]
pub struct TopLevelDocument<T> {
    pub data: T,
}

/// REST client for the network store
#[derive(Clone)]
pub struct RestNetworkStoreClient {
    pub http: StoreHttpClient,
    base_url: String,
}

impl RestNetworkStoreClient {
    /// Create a new client for the store served at `base_url`
    pub fn new(base_url: &str) -> Result<Self> {
        let parsed = Url::parse(base_url)
            .with_context(|| format!("Invalid network store URL: {}", base_url))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            anyhow::bail!("Unsupported network store URL scheme: {}", parsed.scheme());
        }

        let http = StoreHttpClient::new()?;

        Ok(Self {
            http,
            base_url: parsed.as_str().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // =========================================================================
    // URL helpers
    // =========================================================================

    /// Build a store API URL
    pub fn api_url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.base_url, path)
    }

    /// Build a network URL
    pub fn network_url(&self, network_id: Uuid) -> String {
        self.api_url(&format!("networks/{}", network_id))
    }

    /// Build a network variant URL
    pub fn variant_url(&self, network_id: Uuid, variant_num: i32) -> String {
        format!("{}/{}", self.network_url(network_id), variant_num)
    }

    /// Build a collection URL for writes (variant travels in each resource)
    pub fn collection_url(&self, network_id: Uuid, resource_type: ResourceType) -> String {
        format!(
            "{}/{}",
            self.network_url(network_id),
            resource_type.collection_path()
        )
    }

    /// Build a collection URL for reads and removals
    pub fn variant_collection_url(
        &self,
        network_id: Uuid,
        variant_num: i32,
        resource_type: ResourceType,
    ) -> String {
        format!(
            "{}/{}",
            self.variant_url(network_id, variant_num),
            resource_type.collection_path()
        )
    }

    /// Build a container-scoped collection URL
    pub fn container_url(
        &self,
        network_id: Uuid,
        variant_num: i32,
        resource_type: ResourceType,
        container_id: &str,
    ) -> String {
        let container_path = if resource_type == ResourceType::VoltageLevel {
            ResourceType::Substation.collection_path()
        } else {
            ResourceType::VoltageLevel.collection_path()
        };
        format!(
            "{}/{}/{}/{}",
            self.variant_url(network_id, variant_num),
            container_path,
            urlencoding::encode(container_id),
            resource_type.collection_path()
        )
    }

    /// Build an extensions-by-type URL
    pub fn type_extensions_url(
        &self,
        network_id: Uuid,
        variant_num: i32,
        resource_type: ResourceType,
    ) -> String {
        format!(
            "{}/identifiables/types/{}/extensions",
            self.variant_url(network_id, variant_num),
            resource_type
        )
    }

    /// Build an operational-limits-by-type URL
    pub fn type_limits_url(
        &self,
        network_id: Uuid,
        variant_num: i32,
        resource_type: ResourceType,
    ) -> String {
        format!(
            "{}/branch/types/{}/operationalLimitsGroup",
            self.variant_url(network_id, variant_num),
            resource_type
        )
    }
}

#[async_trait]
impl NetworkStoreClient for RestNetworkStoreClient {
    async fn create_networks(&self, networks: Vec<Resource>) -> Result<()> {
        self.http.post(&self.api_url("networks"), &networks).await
    }

    async fn update_networks(&self, networks: Vec<Resource>) -> Result<()> {
        self.http.put(&self.api_url("networks"), Some(&networks)).await
    }

    async fn delete_network(&self, network_id: Uuid) -> Result<()> {
        self.http
            .delete::<()>(&self.network_url(network_id), None)
            .await
    }

    async fn delete_network_variant(&self, network_id: Uuid, variant_num: i32) -> Result<()> {
        self.http
            .delete::<()>(&self.variant_url(network_id, variant_num), None)
            .await
    }

    async fn clone_network_variant(
        &self,
        network_id: Uuid,
        source_variant_num: i32,
        target_variant_num: i32,
        target_variant_id: &str,
    ) -> Result<()> {
        let url = format!(
            "{}/to/{}?targetVariantId={}",
            self.variant_url(network_id, source_variant_num),
            target_variant_num,
            urlencoding::encode(target_variant_id)
        );
        self.http.put::<()>(&url, None).await
    }

    async fn get_network(&self, network_id: Uuid, variant_num: i32) -> Result<Option<Resource>> {
        let doc: Option<TopLevelDocument<Vec<Resource>>> = self
            .http
            .get_optional(&self.variant_url(network_id, variant_num))
            .await?;
        Ok(doc.and_then(|d| d.data.into_iter().next()))
    }

    async fn create_resources(
        &self,
        network_id: Uuid,
        resource_type: ResourceType,
        resources: Vec<Resource>,
    ) -> Result<()> {
        self.http
            .post(&self.collection_url(network_id, resource_type), &resources)
            .await
    }

    async fn update_resources(
        &self,
        network_id: Uuid,
        resource_type: ResourceType,
        resources: Vec<Resource>,
    ) -> Result<()> {
        self.http
            .put(&self.collection_url(network_id, resource_type), Some(&resources))
            .await
    }

    async fn remove_resources(
        &self,
        network_id: Uuid,
        variant_num: i32,
        resource_type: ResourceType,
        ids: Vec<String>,
    ) -> Result<()> {
        self.http
            .delete(
                &self.variant_collection_url(network_id, variant_num, resource_type),
                Some(&ids),
            )
            .await
    }

    async fn get_resource(
        &self,
        network_id: Uuid,
        variant_num: i32,
        resource_type: ResourceType,
        id: &str,
    ) -> Result<Option<Resource>> {
        let url = format!(
            "{}/{}",
            self.variant_collection_url(network_id, variant_num, resource_type),
            urlencoding::encode(id)
        );
        let doc: Option<TopLevelDocument<Vec<Resource>>> = self.http.get_optional(&url).await?;
        Ok(doc.and_then(|d| d.data.into_iter().next()))
    }

    async fn get_resources(
        &self,
        network_id: Uuid,
        variant_num: i32,
        resource_type: ResourceType,
    ) -> Result<Vec<Resource>> {
        let doc: TopLevelDocument<Vec<Resource>> = self
            .http
            .get(&self.variant_collection_url(network_id, variant_num, resource_type))
            .await?;
        Ok(doc.data)
    }

    async fn get_container_resources(
        &self,
        network_id: Uuid,
        variant_num: i32,
        resource_type: ResourceType,
        container_id: &str,
    ) -> Result<Vec<Resource>> {
        let url = self.container_url(network_id, variant_num, resource_type, container_id);
        let doc: TopLevelDocument<Vec<Resource>> = self.http.get(&url).await?;
        Ok(doc.data)
    }

    async fn get_extension_attributes(
        &self,
        network_id: Uuid,
        variant_num: i32,
        resource_type: ResourceType,
        extension_name: &str,
    ) -> Result<HashMap<String, ExtensionAttributes>> {
        let url = format!(
            "{}/{}",
            self.type_extensions_url(network_id, variant_num, resource_type),
            urlencoding::encode(extension_name)
        );
        let doc: TopLevelDocument<HashMap<String, ExtensionAttributes>> =
            self.http.get(&url).await?;
        Ok(doc.data)
    }

    async fn get_all_extension_attributes(
        &self,
        network_id: Uuid,
        variant_num: i32,
        resource_type: ResourceType,
    ) -> Result<HashMap<String, HashMap<String, ExtensionAttributes>>> {
        let doc: TopLevelDocument<HashMap<String, HashMap<String, ExtensionAttributes>>> = self
            .http
            .get(&self.type_extensions_url(network_id, variant_num, resource_type))
            .await?;
        Ok(doc.data)
    }

    async fn get_resource_extension(
        &self,
        network_id: Uuid,
        variant_num: i32,
        _resource_type: ResourceType,
        id: &str,
        extension_name: &str,
    ) -> Result<Option<ExtensionAttributes>> {
        let url = format!(
            "{}/identifiables/{}/extensions/{}",
            self.variant_url(network_id, variant_num),
            urlencoding::encode(id),
            urlencoding::encode(extension_name)
        );
        let doc: Option<TopLevelDocument<ExtensionAttributes>> =
            self.http.get_optional(&url).await?;
        Ok(doc.map(|d| d.data))
    }

    async fn remove_extension_attributes(
        &self,
        network_id: Uuid,
        variant_num: i32,
        resource_type: ResourceType,
        removals: RemovalBatch,
    ) -> Result<()> {
        self.http
            .delete(
                &self.type_extensions_url(network_id, variant_num, resource_type),
                Some(&removals),
            )
            .await
    }

    async fn get_operational_limits_groups(
        &self,
        network_id: Uuid,
        variant_num: i32,
        resource_type: ResourceType,
        selection: LimitsSelection,
    ) -> Result<HashMap<String, Vec<OperationalLimitsGroup>>> {
        let url = format!(
            "{}/{}",
            self.type_limits_url(network_id, variant_num, resource_type),
            selection.as_str()
        );
        let doc: TopLevelDocument<HashMap<String, Vec<OperationalLimitsGroup>>> =
            self.http.get(&url).await?;
        Ok(doc.data)
    }

    async fn get_branch_operational_limits_groups(
        &self,
        network_id: Uuid,
        variant_num: i32,
        resource_type: ResourceType,
        branch_id: &str,
    ) -> Result<Vec<OperationalLimitsGroup>> {
        let url = format!(
            "{}/branch/{}/types/{}/operationalLimitsGroup",
            self.variant_url(network_id, variant_num),
            urlencoding::encode(branch_id),
            resource_type
        );
        let doc: Option<TopLevelDocument<Vec<OperationalLimitsGroup>>> =
            self.http.get_optional(&url).await?;
        Ok(doc.map(|d| d.data).unwrap_or_default())
    }

    async fn remove_operational_limits_groups(
        &self,
        network_id: Uuid,
        variant_num: i32,
        resource_type: ResourceType,
        removals: RemovalBatch,
    ) -> Result<()> {
        self.http
            .delete(
                &self.type_limits_url(network_id, variant_num, resource_type),
                Some(&removals),
            )
            .await
    }
}
