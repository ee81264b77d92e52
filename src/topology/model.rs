//! Topology model
//!
//! Inputs and outputs of bus derivation: a snapshot of one voltage level's
//! resources, the equipment terminals attached to its graph, and the
//! resulting bus partition.

use super::TopologyError;
use crate::resource::{
    Attributes, InternalConnection, Resource, ResourceType, Side, SwitchAttributes, TopologyKind,
};
use std::collections::{BTreeSet, HashMap};

/// Equipment terminal attached to a voltage level graph
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Vertex {
    pub id: String,
    pub resource_type: ResourceType,
    /// Side of branches and three-windings transformers
    pub side: Option<Side>,
    /// Node of a node/breaker terminal
    pub node: Option<i32>,
    /// Connected bus of a bus/breaker terminal; absent when disconnected
    pub bus: Option<String>,
}

/// Switch of a voltage level, as seen by the graph
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchEdge {
    pub id: String,
    pub attributes: SwitchAttributes,
}

/// Snapshot of everything bus derivation needs from one voltage level
#[derive(Debug, Clone, PartialEq)]
pub struct VoltageLevelView {
    pub voltage_level_id: String,
    pub topology_kind: TopologyKind,
    pub internal_connections: Vec<InternalConnection>,
    pub configured_buses: BTreeSet<String>,
    pub switches: Vec<SwitchEdge>,
    pub terminals: Vec<Vertex>,
}

impl VoltageLevelView {
    /// Empty view of a voltage level resource
    pub fn new(voltage_level: &Resource) -> Result<Self, TopologyError> {
        let Attributes::VoltageLevel(attributes) = &voltage_level.attributes else {
            return Err(TopologyError::UnknownVoltageLevel(voltage_level.id.clone()));
        };
        Ok(Self {
            voltage_level_id: voltage_level.id.clone(),
            topology_kind: attributes.topology_kind,
            internal_connections: attributes.internal_connections.clone(),
            configured_buses: BTreeSet::new(),
            switches: Vec::new(),
            terminals: Vec::new(),
        })
    }

    /// View built from a voltage level and any resources; those outside the
    /// voltage level are ignored
    pub fn from_resources<'a>(
        voltage_level: &Resource,
        resources: impl IntoIterator<Item = &'a Resource>,
    ) -> Result<Self, TopologyError> {
        let mut view = Self::new(voltage_level)?;
        for resource in resources {
            view.add(resource);
        }
        view.sort();
        Ok(view)
    }

    /// Take one resource into account
    pub fn add(&mut self, resource: &Resource) {
        match &resource.attributes {
            Attributes::Switch(switch) if switch.voltage_level_id == self.voltage_level_id => {
                self.switches.push(SwitchEdge {
                    id: resource.id.clone(),
                    attributes: switch.clone(),
                });
            }
            Attributes::ConfiguredBus(bus) if bus.voltage_level_id == self.voltage_level_id => {
                self.configured_buses.insert(resource.id.clone());
            }
            attributes => {
                for (side, terminal) in attributes.terminals() {
                    if terminal.voltage_level_id != self.voltage_level_id {
                        continue;
                    }
                    self.terminals.push(Vertex {
                        id: resource.id.clone(),
                        resource_type: resource.resource_type(),
                        side,
                        node: terminal.node,
                        bus: terminal.bus.clone(),
                    });
                }
            }
        }
    }

    /// Order switches and terminals by id, so derivation is deterministic
    pub fn sort(&mut self) {
        self.switches.sort_by(|a, b| a.id.cmp(&b.id));
        self.terminals.sort();
    }

    pub fn find_terminal(&self, id: &str, side: Option<Side>) -> Option<&Vertex> {
        self.terminals
            .iter()
            .find(|v| v.id == id && (side.is_none() || v.side == side))
    }
}

/// One electrical bus: vertices connected through closed switches
#[derive(Debug, Clone, PartialEq)]
pub struct CalculatedBus {
    pub id: String,
    pub voltage_level_id: String,
    /// Equipment terminals on the bus, ordered
    pub vertices: Vec<Vertex>,
    /// Nodes merged into the bus (node/breaker)
    pub nodes: Vec<i32>,
    /// Configured buses merged into the bus (bus/breaker)
    pub configured_buses: Vec<String>,
}

impl CalculatedBus {
    pub fn contains(&self, id: &str, side: Option<Side>) -> bool {
        self.vertices
            .iter()
            .any(|v| v.id == id && (side.is_none() || v.side == side))
    }

    /// Ids of the equipment connected to the bus
    pub fn equipment_ids(&self) -> BTreeSet<&str> {
        self.vertices.iter().map(|v| v.id.as_str()).collect()
    }
}

/// Every bus of one voltage level
#[derive(Debug, Clone, PartialEq)]
pub struct BusPartition {
    pub voltage_level_id: String,
    pub topology_kind: TopologyKind,
    buses: Vec<CalculatedBus>,
    by_terminal: HashMap<(String, Option<Side>), usize>,
}

impl BusPartition {
    pub fn new(voltage_level_id: &str, topology_kind: TopologyKind, buses: Vec<CalculatedBus>) -> Self {
        let mut by_terminal = HashMap::new();
        for (index, bus) in buses.iter().enumerate() {
            for vertex in &bus.vertices {
                by_terminal.insert((vertex.id.clone(), vertex.side), index);
            }
        }
        Self {
            voltage_level_id: voltage_level_id.to_string(),
            topology_kind,
            buses,
            by_terminal,
        }
    }

    pub fn buses(&self) -> &[CalculatedBus] {
        &self.buses
    }

    pub fn len(&self) -> usize {
        self.buses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buses.is_empty()
    }

    pub fn bus(&self, bus_id: &str) -> Option<&CalculatedBus> {
        self.buses.iter().find(|b| b.id == bus_id)
    }

    pub fn bus_ids(&self) -> Vec<&str> {
        self.buses.iter().map(|b| b.id.as_str()).collect()
    }

    /// Bus an equipment terminal is connected to
    pub fn bus_of(&self, id: &str, side: Option<Side>) -> Option<&CalculatedBus> {
        self.by_terminal
            .get(&(id.to_string(), side))
            .and_then(|i| self.buses.get(*i))
    }
}
