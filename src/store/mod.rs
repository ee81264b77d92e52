//! Remote network store interaction module
//!
//! This module is the boundary with the remote, versioned network store.
//!
//! # Module Structure
//!
//! - [`client`] - The `NetworkStoreClient` trait and its REST implementation
//! - [`http`] - HTTP utilities for REST calls
//! - [`error`] - Typed store errors
//! - [`memory`] - In-memory store with call recording (tests, offline runs)
//!
//! # Example
//!
//! ```ignore
//! use gridcache::store::{NetworkStoreClient, RestNetworkStoreClient};
//!
//! async fn example(network_id: uuid::Uuid) -> anyhow::Result<()> {
//!     let client = RestNetworkStoreClient::new("http://localhost:8080")?;
//!     let switches = client
//!         .get_resources(network_id, 0, gridcache::resource::ResourceType::Switch)
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod error;
pub mod http;
pub mod memory;

pub use client::{NetworkStoreClient, RemovalBatch, RestNetworkStoreClient, TopLevelDocument};
pub use error::StoreError;
pub use memory::{InMemoryNetworkStore, StoreCall, StoreOp};
