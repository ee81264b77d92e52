//! Resource model
//!
//! This module defines the closed set of resources stored in a remote network
//! store: a type tag, typed attributes, and the shared handle through which
//! the read cache and the write buffers see the same in-memory value.
//!
//! # Architecture
//!
//! - [`types`] - Resource type tags, variant keys, branch sides
//! - [`attributes`] - Typed attribute payloads, one variant per resource type
//! - [`limits`] - Operational limits groups attached to branches
//!
//! # Ownership
//!
//! A [`ResourceRef`] is the canonical in-memory copy of one resource. The
//! cache stores it, the write buffer keeps a clone of the handle (not of the
//! value), so an attribute mutation made through the handle is what the next
//! flush sends. Flushing takes a snapshot of each handle.

pub mod attributes;
pub mod limits;
pub mod types;

pub use attributes::*;
pub use limits::*;
pub use types::*;

use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Extension attribute set, opaque to this layer
pub type ExtensionAttributes = serde_json::Value;

/// One identifiable unit of a network model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub id: String,
    #[serde(default)]
    pub variant_num: i32,
    pub attributes: Attributes,
}

impl Resource {
    pub fn new(id: &str, variant_num: i32, attributes: Attributes) -> Self {
        Self {
            id: id.to_string(),
            variant_num,
            attributes,
        }
    }

    pub fn resource_type(&self) -> ResourceType {
        self.attributes.resource_type()
    }

    /// Deep copy of this resource re-targeted at another variant
    pub fn for_variant(&self, variant_num: i32) -> Self {
        Self {
            variant_num,
            ..self.clone()
        }
    }
}

/// Shared, mutable handle on a cached resource
#[derive(Debug, Clone)]
pub struct ResourceRef(Arc<RwLock<Resource>>);

impl ResourceRef {
    pub fn new(resource: Resource) -> Self {
        Self(Arc::new(RwLock::new(resource)))
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Resource> {
        self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Resource> {
        self.0.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Owned copy of the current value
    pub fn snapshot(&self) -> Resource {
        self.read().clone()
    }

    pub fn id(&self) -> String {
        self.read().id.clone()
    }

    pub fn resource_type(&self) -> ResourceType {
        self.read().resource_type()
    }

    /// Whether both handles point at the same in-memory resource
    pub fn ptr_eq(&self, other: &ResourceRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl From<Resource> for ResourceRef {
    fn from(resource: Resource) -> Self {
        Self::new(resource)
    }
}
