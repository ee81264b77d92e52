//! Resource Attributes
//!
//! Typed attribute payloads, one tagged variant per resource type. Only the
//! fields the cache, buffer and topology layers read are typed; everything
//! else rides in the free-form `properties` map.

use super::types::{ResourceType, Side};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Free-form string properties carried by every resource
pub type Properties = BTreeMap<String, String>;

/// Voltage level topology representation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TopologyKind {
    NodeBreaker,
    BusBreaker,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SwitchKind {
    Breaker,
    Disconnector,
    LoadBreakSwitch,
}

/// Where one terminal of an equipment is attached
///
/// Node/breaker voltage levels use `node`. Bus/breaker voltage levels use
/// `bus` for the bus the terminal is connected to (absent when disconnected)
/// and `connectable_bus` for the bus it may be connected to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalAttributes {
    pub voltage_level_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bus: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connectable_bus: Option<String>,
}

impl TerminalAttributes {
    pub fn at_node(voltage_level_id: &str, node: i32) -> Self {
        Self {
            voltage_level_id: voltage_level_id.to_string(),
            node: Some(node),
            ..Self::default()
        }
    }

    pub fn at_bus(voltage_level_id: &str, bus: &str) -> Self {
        Self {
            voltage_level_id: voltage_level_id.to_string(),
            node: None,
            bus: Some(bus.to_string()),
            connectable_bus: Some(bus.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkAttributes {
    pub uuid: Uuid,
    pub variant_id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub case_date: DateTime<Utc>,
    #[serde(default)]
    pub properties: Properties,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubstationAttributes {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub properties: Properties,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InternalConnection {
    pub node1: i32,
    pub node2: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoltageLevelAttributes {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub substation_id: Option<String>,
    pub nominal_v: f64,
    pub topology_kind: TopologyKind,
    /// Permanent node-to-node links of a node/breaker voltage level
    #[serde(default)]
    pub internal_connections: Vec<InternalConnection>,
    #[serde(default)]
    pub properties: Properties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchAttributes {
    #[serde(default)]
    pub name: Option<String>,
    pub voltage_level_id: String,
    pub kind: SwitchKind,
    pub open: bool,
    #[serde(default)]
    pub retained: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node1: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node2: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bus1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bus2: Option<String>,
    #[serde(default)]
    pub properties: Properties,
}

impl SwitchAttributes {
    /// Breaker between two nodes of a node/breaker voltage level
    pub fn between_nodes(voltage_level_id: &str, node1: i32, node2: i32, open: bool) -> Self {
        Self {
            name: None,
            voltage_level_id: voltage_level_id.to_string(),
            kind: SwitchKind::Breaker,
            open,
            retained: false,
            node1: Some(node1),
            node2: Some(node2),
            bus1: None,
            bus2: None,
            properties: Properties::new(),
        }
    }

    /// Breaker between two configured buses of a bus/breaker voltage level
    pub fn between_buses(voltage_level_id: &str, bus1: &str, bus2: &str, open: bool) -> Self {
        Self {
            name: None,
            voltage_level_id: voltage_level_id.to_string(),
            kind: SwitchKind::Breaker,
            open,
            retained: false,
            node1: None,
            node2: None,
            bus1: Some(bus1.to_string()),
            bus2: Some(bus2.to_string()),
            properties: Properties::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfiguredBusAttributes {
    #[serde(default)]
    pub name: Option<String>,
    pub voltage_level_id: String,
    #[serde(default)]
    pub properties: Properties,
}

/// Payload shared by every single-terminal equipment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InjectionAttributes {
    #[serde(default)]
    pub name: Option<String>,
    pub terminal: TerminalAttributes,
    #[serde(default)]
    pub p: Option<f64>,
    #[serde(default)]
    pub q: Option<f64>,
    #[serde(default)]
    pub properties: Properties,
}

impl InjectionAttributes {
    pub fn new(terminal: TerminalAttributes) -> Self {
        Self {
            terminal,
            ..Self::default()
        }
    }
}

/// Payload shared by lines and two-windings transformers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchAttributes {
    #[serde(default)]
    pub name: Option<String>,
    pub terminal1: TerminalAttributes,
    pub terminal2: TerminalAttributes,
    #[serde(default)]
    pub selected_operational_limits_group_id1: Option<String>,
    #[serde(default)]
    pub selected_operational_limits_group_id2: Option<String>,
    #[serde(default)]
    pub properties: Properties,
}

impl BranchAttributes {
    pub fn new(terminal1: TerminalAttributes, terminal2: TerminalAttributes) -> Self {
        Self {
            terminal1,
            terminal2,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegAttributes {
    pub terminal: TerminalAttributes,
    #[serde(default)]
    pub rated_u: f64,
    #[serde(default)]
    pub selected_operational_limits_group_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreeWindingsTransformerAttributes {
    #[serde(default)]
    pub name: Option<String>,
    pub leg1: LegAttributes,
    pub leg2: LegAttributes,
    pub leg3: LegAttributes,
    #[serde(default)]
    pub properties: Properties,
}

/// Attributes of a resource, tagged with its resource type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Attributes {
    Network(NetworkAttributes),
    Substation(SubstationAttributes),
    VoltageLevel(VoltageLevelAttributes),
    ConfiguredBus(ConfiguredBusAttributes),
    BusbarSection(InjectionAttributes),
    Switch(SwitchAttributes),
    Load(InjectionAttributes),
    Generator(InjectionAttributes),
    Battery(InjectionAttributes),
    ShuntCompensator(InjectionAttributes),
    StaticVarCompensator(InjectionAttributes),
    DanglingLine(InjectionAttributes),
    Line(BranchAttributes),
    TwoWindingsTransformer(BranchAttributes),
    ThreeWindingsTransformer(ThreeWindingsTransformerAttributes),
}

/// Connectivity-relevant projection of a resource's attributes
///
/// Two signatures compare equal exactly when the mutation between them
/// leaves every bus partition unchanged.
#[derive(Debug, Clone, PartialEq)]
pub enum TopologySignature {
    Terminals(Vec<TerminalAttributes>),
    Switch {
        voltage_level_id: String,
        open: bool,
        nodes: (Option<i32>, Option<i32>),
        buses: (Option<String>, Option<String>),
    },
    ConfiguredBus {
        voltage_level_id: String,
    },
    VoltageLevel {
        topology_kind: TopologyKind,
        internal_connections: Vec<InternalConnection>,
    },
}

impl Attributes {
    pub fn resource_type(&self) -> ResourceType {
        match self {
            Self::Network(_) => ResourceType::Network,
            Self::Substation(_) => ResourceType::Substation,
            Self::VoltageLevel(_) => ResourceType::VoltageLevel,
            Self::ConfiguredBus(_) => ResourceType::ConfiguredBus,
            Self::BusbarSection(_) => ResourceType::BusbarSection,
            Self::Switch(_) => ResourceType::Switch,
            Self::Load(_) => ResourceType::Load,
            Self::Generator(_) => ResourceType::Generator,
            Self::Battery(_) => ResourceType::Battery,
            Self::ShuntCompensator(_) => ResourceType::ShuntCompensator,
            Self::StaticVarCompensator(_) => ResourceType::StaticVarCompensator,
            Self::DanglingLine(_) => ResourceType::DanglingLine,
            Self::Line(_) => ResourceType::Line,
            Self::TwoWindingsTransformer(_) => ResourceType::TwoWindingsTransformer,
            Self::ThreeWindingsTransformer(_) => ResourceType::ThreeWindingsTransformer,
        }
    }

    pub fn as_injection(&self) -> Option<&InjectionAttributes> {
        match self {
            Self::BusbarSection(a)
            | Self::Load(a)
            | Self::Generator(a)
            | Self::Battery(a)
            | Self::ShuntCompensator(a)
            | Self::StaticVarCompensator(a)
            | Self::DanglingLine(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_injection_mut(&mut self) -> Option<&mut InjectionAttributes> {
        match self {
            Self::BusbarSection(a)
            | Self::Load(a)
            | Self::Generator(a)
            | Self::Battery(a)
            | Self::ShuntCompensator(a)
            | Self::StaticVarCompensator(a)
            | Self::DanglingLine(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_branch(&self) -> Option<&BranchAttributes> {
        match self {
            Self::Line(a) | Self::TwoWindingsTransformer(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_switch(&self) -> Option<&SwitchAttributes> {
        match self {
            Self::Switch(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_switch_mut(&mut self) -> Option<&mut SwitchAttributes> {
        match self {
            Self::Switch(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_voltage_level(&self) -> Option<&VoltageLevelAttributes> {
        match self {
            Self::VoltageLevel(a) => Some(a),
            _ => None,
        }
    }

    /// Every terminal of a connectable resource, with its side when the
    /// equipment has more than one
    pub fn terminals(&self) -> Vec<(Option<Side>, &TerminalAttributes)> {
        if let Some(injection) = self.as_injection() {
            return vec![(None, &injection.terminal)];
        }
        match self {
            Self::Line(a) | Self::TwoWindingsTransformer(a) => vec![
                (Some(Side::One), &a.terminal1),
                (Some(Side::Two), &a.terminal2),
            ],
            Self::ThreeWindingsTransformer(a) => vec![
                (Some(Side::One), &a.leg1.terminal),
                (Some(Side::Two), &a.leg2.terminal),
                (Some(Side::Three), &a.leg3.terminal),
            ],
            _ => Vec::new(),
        }
    }

    /// Ids of the containers this resource belongs to
    ///
    /// Voltage levels belong to their substation, connectable equipment to the
    /// voltage levels of its terminals, switches and configured buses to their
    /// voltage level.
    pub fn container_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = match self {
            Self::VoltageLevel(a) => a.substation_id.iter().map(String::as_str).collect(),
            Self::Switch(a) => vec![a.voltage_level_id.as_str()],
            Self::ConfiguredBus(a) => vec![a.voltage_level_id.as_str()],
            _ => self
                .terminals()
                .into_iter()
                .map(|(_, t)| t.voltage_level_id.as_str())
                .collect(),
        };
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    pub fn topology_signature(&self) -> Option<TopologySignature> {
        match self {
            Self::Network(_) | Self::Substation(_) => None,
            Self::VoltageLevel(a) => Some(TopologySignature::VoltageLevel {
                topology_kind: a.topology_kind,
                internal_connections: a.internal_connections.clone(),
            }),
            Self::ConfiguredBus(a) => Some(TopologySignature::ConfiguredBus {
                voltage_level_id: a.voltage_level_id.clone(),
            }),
            Self::Switch(a) => Some(TopologySignature::Switch {
                voltage_level_id: a.voltage_level_id.clone(),
                open: a.open,
                nodes: (a.node1, a.node2),
                buses: (a.bus1.clone(), a.bus2.clone()),
            }),
            _ => Some(TopologySignature::Terminals(
                self.terminals().into_iter().map(|(_, t)| t.clone()).collect(),
            )),
        }
    }

    /// Selected operational limits group of one side, if any
    pub fn selected_limits_group(&self, side: Side) -> Option<&str> {
        match (self, side) {
            (Self::Line(a) | Self::TwoWindingsTransformer(a), Side::One) => {
                a.selected_operational_limits_group_id1.as_deref()
            }
            (Self::Line(a) | Self::TwoWindingsTransformer(a), Side::Two) => {
                a.selected_operational_limits_group_id2.as_deref()
            }
            (Self::ThreeWindingsTransformer(a), Side::One) => {
                a.leg1.selected_operational_limits_group_id.as_deref()
            }
            (Self::ThreeWindingsTransformer(a), Side::Two) => {
                a.leg2.selected_operational_limits_group_id.as_deref()
            }
            (Self::ThreeWindingsTransformer(a), Side::Three) => {
                a.leg3.selected_operational_limits_group_id.as_deref()
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(vl1: &str, vl2: &str) -> Attributes {
        Attributes::Line(BranchAttributes::new(
            TerminalAttributes::at_node(vl1, 1),
            TerminalAttributes::at_node(vl2, 4),
        ))
    }

    #[test]
    fn test_variant_agrees_with_resource_type() {
        let load = Attributes::Load(InjectionAttributes::new(TerminalAttributes::at_node("vl", 0)));
        assert_eq!(load.resource_type(), ResourceType::Load);
        assert_eq!(line("a", "b").resource_type(), ResourceType::Line);
    }

    #[test]
    fn test_branch_belongs_to_both_voltage_levels() {
        assert_eq!(line("vl2", "vl1").container_ids(), vec!["vl1", "vl2"]);
        assert_eq!(line("vl1", "vl1").container_ids(), vec!["vl1"]);
    }

    #[test]
    fn test_switch_signature_tracks_open_flag() {
        let mut attrs = Attributes::Switch(SwitchAttributes::between_nodes("vl", 0, 1, false));
        let before = attrs.topology_signature();
        if let Some(s) = attrs.as_switch_mut() {
            s.name = Some("renamed".to_string());
        }
        assert_eq!(before, attrs.topology_signature());
        if let Some(s) = attrs.as_switch_mut() {
            s.open = true;
        }
        assert_ne!(before, attrs.topology_signature());
    }

    #[test]
    fn test_injection_signature_ignores_setpoints() {
        let mut attrs = Attributes::Generator(InjectionAttributes::new(TerminalAttributes::at_bus(
            "vl", "b1",
        )));
        let before = attrs.topology_signature();
        if let Some(g) = attrs.as_injection_mut() {
            g.p = Some(42.0);
        }
        assert_eq!(before, attrs.topology_signature());
        if let Some(g) = attrs.as_injection_mut() {
            g.terminal.bus = None;
        }
        assert_ne!(before, attrs.topology_signature());
    }

    #[test]
    fn test_serialized_shape_is_tagged() {
        let attrs = Attributes::ConfiguredBus(ConfiguredBusAttributes {
            name: None,
            voltage_level_id: "vl".to_string(),
            properties: Properties::new(),
        });
        let json = serde_json::to_value(&attrs).unwrap();
        assert_eq!(json["type"], "CONFIGURED_BUS");
        assert_eq!(json["value"]["voltageLevelId"], "vl");
        let back: Attributes = serde_json::from_value(json).unwrap();
        assert_eq!(back, attrs);
    }
}
