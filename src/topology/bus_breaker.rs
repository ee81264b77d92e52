//! Bus/breaker topology
//!
//! Vertices are the configured buses of the voltage level. Switches join two
//! configured buses and every equipment terminal is connected to at most one.
//! Each set of configured buses merged through closed switches is one bus,
//! named after its smallest configured bus id.

use super::graph::{AbstractTopology, SwitchGraph};
use super::model::{CalculatedBus, SwitchEdge, Vertex, VoltageLevelView};
use super::TopologyError;
use crate::resource::TopologyKind;

/// Suffix appended to the smallest configured bus id of a merged bus
pub const MERGED_BUS_SUFFIX: &str = "_merge";

#[derive(Debug, Clone, Copy, Default)]
pub struct BusBreakerTopology;

fn configured_bus(
    view: &VoltageLevelView,
    owner: &str,
    bus: Option<&String>,
) -> Result<String, TopologyError> {
    match bus {
        Some(bus) if view.configured_buses.contains(bus) => Ok(bus.clone()),
        other => Err(TopologyError::UnknownVertex {
            voltage_level_id: view.voltage_level_id.clone(),
            owner: owner.to_string(),
            vertex: format!("{:?}", other),
        }),
    }
}

impl AbstractTopology for BusBreakerTopology {
    type Key = String;

    fn kind(&self) -> TopologyKind {
        TopologyKind::BusBreaker
    }

    fn terminal_key(
        &self,
        view: &VoltageLevelView,
        vertex: &Vertex,
    ) -> Result<Option<String>, TopologyError> {
        match &vertex.bus {
            None => Ok(None),
            Some(bus) => configured_bus(view, &vertex.id, Some(bus)).map(Some),
        }
    }

    fn switch_ends(
        &self,
        view: &VoltageLevelView,
        switch: &SwitchEdge,
    ) -> Result<(String, String), TopologyError> {
        Ok((
            configured_bus(view, &switch.id, switch.attributes.bus1.as_ref())?,
            configured_bus(view, &switch.id, switch.attributes.bus2.as_ref())?,
        ))
    }

    fn seed(&self, view: &VoltageLevelView, graph: &mut SwitchGraph<String>) {
        for bus in &view.configured_buses {
            graph.add_vertex(bus.clone());
        }
    }

    fn is_bus(&self, _graph: &SwitchGraph<String>, _component: &[String]) -> bool {
        true
    }

    fn bus_id(&self, view: &VoltageLevelView, component: &[String]) -> String {
        match component.first() {
            Some(smallest) => format!("{}{}", smallest, MERGED_BUS_SUFFIX),
            None => format!("{}{}", view.voltage_level_id, MERGED_BUS_SUFFIX),
        }
    }

    fn describe(&self, component: &[String], bus: &mut CalculatedBus) {
        bus.configured_buses = component.to_vec();
    }
}
