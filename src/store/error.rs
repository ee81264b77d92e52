//! Store errors
//!
//! Typed failures that callers may need to tell apart. They travel inside
//! `anyhow::Error` and can be recovered with `downcast_ref::<StoreError>()`.

use crate::resource::{ResourceType, VariantKey};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The remote store answered with a non-success status
    #[error("{method} {url} failed with status {status}")]
    Http {
        method: &'static str,
        url: String,
        status: u16,
    },

    /// The remote store rejected a create for an id it already holds
    #[error("{resource_type} '{id}' already exists in {key}")]
    AlreadyExists {
        key: VariantKey,
        resource_type: ResourceType,
        id: String,
    },

    #[error("network {0} is unknown")]
    UnknownNetwork(Uuid),

    #[error("{resource_type} '{id}' not found in {key}")]
    UnknownResource {
        key: VariantKey,
        resource_type: ResourceType,
        id: String,
    },

    /// Injected failure of the in-memory store
    #[error("simulated failure of {0}")]
    Simulated(&'static str),
}

impl StoreError {
    pub fn status(&self) -> Option<u16> {
        match self {
            StoreError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}
