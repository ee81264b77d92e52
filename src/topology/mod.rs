//! Topology engine
//!
//! Derives electrical buses from the switch graph of a voltage level.
//!
//! # Module Structure
//!
//! - [`model`] - Voltage level snapshot, calculated buses and partitions
//! - [`graph`] - Switch graph and the traversal shared by both representations
//! - [`node_breaker`] - Nodes joined by switches and internal connections
//! - [`bus_breaker`] - Configured buses joined by switches
//! - [`cache`] - Per-variant cache of calculated partitions
//!
//! Bus ids are deterministic: a node/breaker bus is named
//! `{voltage level}_{smallest node}`, a bus/breaker bus is named after its
//! smallest configured bus with a `_merge` suffix.

pub mod bus_breaker;
pub mod cache;
pub mod graph;
pub mod model;
pub mod node_breaker;

pub use bus_breaker::{BusBreakerTopology, MERGED_BUS_SUFFIX};
pub use cache::BusCache;
pub use graph::{AbstractTopology, SwitchGraph};
pub use model::{BusPartition, CalculatedBus, SwitchEdge, Vertex, VoltageLevelView};
pub use node_breaker::NodeBreakerTopology;

use crate::resource::{Side, TopologyKind};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TopologyError {
    #[error("voltage level '{0}' not found")]
    UnknownVoltageLevel(String),
    #[error("'{owner}' refers to unknown vertex {vertex} of voltage level '{voltage_level_id}'")]
    UnknownVertex {
        voltage_level_id: String,
        owner: String,
        vertex: String,
    },
    #[error("voltage level '{voltage_level_id}' is {actual:?}, expected {expected:?}")]
    TopologyKindMismatch {
        voltage_level_id: String,
        expected: TopologyKind,
        actual: TopologyKind,
    },
}

/// Every bus of a voltage level, using the view's own representation
pub fn calculate_buses(view: &VoltageLevelView) -> Result<BusPartition, TopologyError> {
    match view.topology_kind {
        TopologyKind::NodeBreaker => NodeBreakerTopology.calculate_buses(view),
        TopologyKind::BusBreaker => BusBreakerTopology.calculate_buses(view),
    }
}

/// Bus of one equipment terminal, `None` when it is disconnected or not in
/// the voltage level
pub fn calculate_bus_of(
    view: &VoltageLevelView,
    id: &str,
    side: Option<Side>,
) -> Result<Option<CalculatedBus>, TopologyError> {
    match view.topology_kind {
        TopologyKind::NodeBreaker => NodeBreakerTopology.calculate_bus_of(view, id, side),
        TopologyKind::BusBreaker => BusBreakerTopology.calculate_bus_of(view, id, side),
    }
}
