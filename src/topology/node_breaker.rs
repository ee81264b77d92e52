//! Node/breaker topology
//!
//! Vertices are integer nodes. Switches and internal connections join
//! nodes; equipment terminals sit on nodes. A component with no equipment
//! on any of its nodes is not a bus.

use super::graph::{AbstractTopology, SwitchGraph};
use super::model::{CalculatedBus, SwitchEdge, Vertex, VoltageLevelView};
use super::TopologyError;
use crate::resource::TopologyKind;

#[derive(Debug, Clone, Copy, Default)]
pub struct NodeBreakerTopology;

fn node(view: &VoltageLevelView, owner: &str, node: Option<i32>) -> Result<i32, TopologyError> {
    match node {
        Some(n) if n >= 0 => Ok(n),
        other => Err(TopologyError::UnknownVertex {
            voltage_level_id: view.voltage_level_id.clone(),
            owner: owner.to_string(),
            vertex: format!("{:?}", other),
        }),
    }
}

impl AbstractTopology for NodeBreakerTopology {
    type Key = i32;

    fn kind(&self) -> TopologyKind {
        TopologyKind::NodeBreaker
    }

    fn terminal_key(
        &self,
        view: &VoltageLevelView,
        vertex: &Vertex,
    ) -> Result<Option<i32>, TopologyError> {
        node(view, &vertex.id, vertex.node).map(Some)
    }

    fn switch_ends(
        &self,
        view: &VoltageLevelView,
        switch: &SwitchEdge,
    ) -> Result<(i32, i32), TopologyError> {
        Ok((
            node(view, &switch.id, switch.attributes.node1)?,
            node(view, &switch.id, switch.attributes.node2)?,
        ))
    }

    fn seed(&self, view: &VoltageLevelView, graph: &mut SwitchGraph<i32>) {
        for connection in &view.internal_connections {
            graph.add_edge(connection.node1, connection.node2, None, false);
        }
    }

    fn is_bus(&self, graph: &SwitchGraph<i32>, component: &[i32]) -> bool {
        component.iter().any(|n| !graph.terminals_at(n).is_empty())
    }

    fn bus_id(&self, view: &VoltageLevelView, component: &[i32]) -> String {
        match component.first() {
            Some(smallest) => format!("{}_{}", view.voltage_level_id, smallest),
            None => view.voltage_level_id.clone(),
        }
    }

    fn describe(&self, component: &[i32], bus: &mut CalculatedBus) {
        bus.nodes = component.to_vec();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{
        Attributes, BranchAttributes, InjectionAttributes, InternalConnection, Resource,
        ResourceType, Side, SwitchAttributes, TerminalAttributes, VoltageLevelAttributes,
    };

    fn voltage_level(internal: Vec<InternalConnection>) -> Resource {
        Resource::new(
            "vl1",
            0,
            Attributes::VoltageLevel(VoltageLevelAttributes {
                name: None,
                substation_id: None,
                nominal_v: 400.0,
                topology_kind: TopologyKind::NodeBreaker,
                internal_connections: internal,
                properties: Default::default(),
            }),
        )
    }

    fn injection(id: &str, node: i32) -> Resource {
        Resource::new(
            id,
            0,
            Attributes::Load(InjectionAttributes::new(TerminalAttributes::at_node("vl1", node))),
        )
    }

    fn breaker(id: &str, n1: i32, n2: i32, open: bool) -> Resource {
        Resource::new(
            id,
            0,
            Attributes::Switch(SwitchAttributes::between_nodes("vl1", n1, n2, open)),
        )
    }

    /// bbs on node 0; load on 2 via breakers 0-1 and 1-2; line on 4 via 0-3
    /// and an internal connection 3-4; node 9 isolated with nothing on it
    fn station(open_b2: bool) -> Vec<Resource> {
        let mut bbs = injection("bbs", 0);
        if let Attributes::Load(a) = &bbs.attributes {
            bbs.attributes = Attributes::BusbarSection(a.clone());
        }
        vec![
            bbs,
            injection("load", 2),
            Resource::new(
                "line",
                0,
                Attributes::Line(BranchAttributes::new(
                    TerminalAttributes::at_node("vl1", 4),
                    TerminalAttributes::at_node("vl2", 0),
                )),
            ),
            breaker("b1", 0, 1, false),
            breaker("b2", 1, 2, open_b2),
            breaker("b3", 0, 3, false),
            breaker("b9", 8, 9, false),
        ]
    }

    fn view(open_b2: bool) -> VoltageLevelView {
        let vl = voltage_level(vec![InternalConnection { node1: 3, node2: 4 }]);
        let resources = station(open_b2);
        VoltageLevelView::from_resources(&vl, &resources).unwrap()
    }

    #[test]
    fn test_closed_breakers_merge_into_one_bus() {
        let partition = NodeBreakerTopology.calculate_buses(&view(false)).unwrap();
        assert_eq!(partition.bus_ids(), vec!["vl1_0"]);
        let bus = &partition.buses()[0];
        assert_eq!(bus.nodes, vec![0, 1, 2, 3, 4]);
        assert_eq!(
            bus.equipment_ids().into_iter().collect::<Vec<_>>(),
            vec!["bbs", "line", "load"]
        );
    }

    #[test]
    fn test_open_breaker_splits_bus() {
        let partition = NodeBreakerTopology.calculate_buses(&view(true)).unwrap();
        assert_eq!(partition.bus_ids(), vec!["vl1_0", "vl1_2"]);
        assert_eq!(partition.bus_of("load", None).unwrap().id, "vl1_2");
        assert_eq!(
            partition.bus_of("line", Some(Side::One)).unwrap().id,
            "vl1_0"
        );
    }

    #[test]
    fn test_component_without_equipment_is_not_a_bus() {
        let partition = NodeBreakerTopology.calculate_buses(&view(false)).unwrap();
        assert!(partition.buses().iter().all(|b| !b.nodes.contains(&9)));
    }

    #[test]
    fn test_single_terminal_query_matches_full_partition() {
        let view = view(true);
        let partition = NodeBreakerTopology.calculate_buses(&view).unwrap();
        let bus = NodeBreakerTopology
            .calculate_bus_of(&view, "load", None)
            .unwrap()
            .unwrap();
        assert_eq!(Some(&bus), partition.bus_of("load", None));
        assert!(NodeBreakerTopology
            .calculate_bus_of(&view, "unknown", None)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_switch_without_node_is_an_invariant_violation() {
        let mut view = view(false);
        view.switches[0].attributes.node2 = None;
        let err = NodeBreakerTopology.calculate_buses(&view).unwrap_err();
        assert!(matches!(err, TopologyError::UnknownVertex { ref owner, .. } if owner == "b1"));
    }

    #[test]
    fn test_bus_breaker_view_is_rejected() {
        let mut view = view(false);
        view.topology_kind = TopologyKind::BusBreaker;
        assert!(matches!(
            NodeBreakerTopology.calculate_buses(&view),
            Err(TopologyError::TopologyKindMismatch { .. })
        ));
        assert_eq!(view.terminals[0].resource_type, ResourceType::BusbarSection);
    }
}
