//! Calculated bus cache
//!
//! One instance per variant. A partition stays valid until a topology
//! relevant mutation touches its voltage level.

use super::model::BusPartition;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Default)]
pub struct BusCache {
    partitions: Mutex<HashMap<String, Arc<BusPartition>>>,
}

impl BusCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, voltage_level_id: &str) -> Option<Arc<BusPartition>> {
        self.partitions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(voltage_level_id)
            .cloned()
    }

    pub fn insert(&self, partition: BusPartition) -> Arc<BusPartition> {
        let partition = Arc::new(partition);
        self.partitions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(partition.voltage_level_id.clone(), partition.clone());
        partition
    }

    /// Drop the partition of one voltage level; true if one was cached
    pub fn invalidate(&self, voltage_level_id: &str) -> bool {
        let removed = self
            .partitions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(voltage_level_id)
            .is_some();
        if removed {
            tracing::debug!("invalidated buses of voltage level '{}'", voltage_level_id);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.partitions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
