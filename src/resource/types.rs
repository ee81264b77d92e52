//! Resource Types
//!
//! The closed set of resource type tags known to the network store, plus the
//! small identifier types shared by every layer (variant keys, branch sides).

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Variant number of the base case of every network
pub const INITIAL_VARIANT_NUM: i32 = 0;

/// Variant id given to the base case when a network is created
pub const INITIAL_VARIANT_ID: &str = "InitialState";

/// Resource type tag
///
/// Declaration order is the flush order: containers come before the
/// equipment they contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceType {
    Network,
    Substation,
    VoltageLevel,
    ConfiguredBus,
    BusbarSection,
    Switch,
    Load,
    Generator,
    Battery,
    ShuntCompensator,
    StaticVarCompensator,
    DanglingLine,
    Line,
    TwoWindingsTransformer,
    ThreeWindingsTransformer,
}

/// How a resource type takes part in voltage level connectivity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectableKind {
    /// Network, substation, voltage level
    Container,
    /// Configured bus of a bus/breaker voltage level
    Bus,
    /// Switch between two nodes or two buses
    Switch,
    /// One terminal in one voltage level
    Injection,
    /// Two terminals, possibly in two voltage levels
    Branch,
    /// Three terminals, one per leg
    ThreeWindings,
}

impl ResourceType {
    /// Every resource type, in declaration (flush) order
    pub const ALL: [ResourceType; 15] = [
        ResourceType::Network,
        ResourceType::Substation,
        ResourceType::VoltageLevel,
        ResourceType::ConfiguredBus,
        ResourceType::BusbarSection,
        ResourceType::Switch,
        ResourceType::Load,
        ResourceType::Generator,
        ResourceType::Battery,
        ResourceType::ShuntCompensator,
        ResourceType::StaticVarCompensator,
        ResourceType::DanglingLine,
        ResourceType::Line,
        ResourceType::TwoWindingsTransformer,
        ResourceType::ThreeWindingsTransformer,
    ];

    /// Every type stored inside a network (everything but the root)
    pub fn contained() -> impl Iterator<Item = ResourceType> {
        Self::ALL.into_iter().filter(|t| *t != ResourceType::Network)
    }

    /// REST collection segment for this type
    pub fn collection_path(self) -> &'static str {
        match self {
            Self::Network => "networks",
            Self::Substation => "substations",
            Self::VoltageLevel => "voltage-levels",
            Self::ConfiguredBus => "configured-buses",
            Self::BusbarSection => "busbar-sections",
            Self::Switch => "switches",
            Self::Load => "loads",
            Self::Generator => "generators",
            Self::Battery => "batteries",
            Self::ShuntCompensator => "shunt-compensators",
            Self::StaticVarCompensator => "static-var-compensators",
            Self::DanglingLine => "dangling-lines",
            Self::Line => "lines",
            Self::TwoWindingsTransformer => "2-windings-transformers",
            Self::ThreeWindingsTransformer => "3-windings-transformers",
        }
    }

    pub fn connectable_kind(self) -> ConnectableKind {
        match self {
            Self::Network | Self::Substation | Self::VoltageLevel => ConnectableKind::Container,
            Self::ConfiguredBus => ConnectableKind::Bus,
            Self::Switch => ConnectableKind::Switch,
            Self::BusbarSection
            | Self::Load
            | Self::Generator
            | Self::Battery
            | Self::ShuntCompensator
            | Self::StaticVarCompensator
            | Self::DanglingLine => ConnectableKind::Injection,
            Self::Line | Self::TwoWindingsTransformer => ConnectableKind::Branch,
            Self::ThreeWindingsTransformer => ConnectableKind::ThreeWindings,
        }
    }

    /// Whether resources of this type own terminals
    pub fn is_connectable(self) -> bool {
        matches!(
            self.connectable_kind(),
            ConnectableKind::Injection | ConnectableKind::Branch | ConnectableKind::ThreeWindings
        )
    }

    /// Whether resources of this type carry operational limits groups
    pub fn has_operational_limits(self) -> bool {
        matches!(
            self,
            Self::Line | Self::TwoWindingsTransformer | Self::ThreeWindingsTransformer | Self::DanglingLine
        )
    }

    /// Types whose resources are vertices or edges of a voltage level graph
    pub fn topology_types() -> impl Iterator<Item = ResourceType> {
        Self::ALL
            .into_iter()
            .filter(|t| t.connectable_kind() != ConnectableKind::Container)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Network => "NETWORK",
            Self::Substation => "SUBSTATION",
            Self::VoltageLevel => "VOLTAGE_LEVEL",
            Self::ConfiguredBus => "CONFIGURED_BUS",
            Self::BusbarSection => "BUSBAR_SECTION",
            Self::Switch => "SWITCH",
            Self::Load => "LOAD",
            Self::Generator => "GENERATOR",
            Self::Battery => "BATTERY",
            Self::ShuntCompensator => "SHUNT_COMPENSATOR",
            Self::StaticVarCompensator => "STATIC_VAR_COMPENSATOR",
            Self::DanglingLine => "DANGLING_LINE",
            Self::Line => "LINE",
            Self::TwoWindingsTransformer => "TWO_WINDINGS_TRANSFORMER",
            Self::ThreeWindingsTransformer => "THREE_WINDINGS_TRANSFORMER",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal side of a branch or three-windings transformer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Side {
    One,
    Two,
    Three,
}

impl Side {
    pub fn index(self) -> usize {
        match self {
            Side::One => 1,
            Side::Two => 2,
            Side::Three => 3,
        }
    }
}

/// One variant of one network: the unit every cache and buffer is scoped to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariantKey {
    pub network_id: Uuid,
    pub variant_num: i32,
}

impl VariantKey {
    pub fn new(network_id: Uuid, variant_num: i32) -> Self {
        Self {
            network_id,
            variant_num,
        }
    }

    /// Base case of a network
    pub fn initial(network_id: Uuid) -> Self {
        Self::new(network_id, INITIAL_VARIANT_NUM)
    }
}

impl fmt::Display for VariantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.network_id, self.variant_num)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_lists_every_type_once() {
        let mut seen = std::collections::HashSet::new();
        for t in ResourceType::ALL {
            assert!(seen.insert(t), "{} listed twice", t);
        }
        assert_eq!(seen.len(), ResourceType::ALL.len());
    }

    #[test]
    fn test_declaration_order_puts_containers_first() {
        let sorted: Vec<_> = {
            let mut v = ResourceType::ALL.to_vec();
            v.sort();
            v
        };
        assert_eq!(sorted, ResourceType::ALL.to_vec());
        assert!(ResourceType::VoltageLevel < ResourceType::Switch);
        assert!(ResourceType::Switch < ResourceType::Line);
    }

    #[test]
    fn test_serde_uses_screaming_snake_case() {
        let json = serde_json::to_string(&ResourceType::TwoWindingsTransformer).unwrap();
        assert_eq!(json, "\"TWO_WINDINGS_TRANSFORMER\"");
        assert_eq!(
            ResourceType::TwoWindingsTransformer.to_string(),
            "TWO_WINDINGS_TRANSFORMER"
        );
    }

    #[test]
    fn test_contained_excludes_network() {
        assert!(ResourceType::contained().all(|t| t != ResourceType::Network));
        assert_eq!(ResourceType::contained().count(), ResourceType::ALL.len() - 1);
    }

    #[test]
    fn test_connectable_classification() {
        assert!(ResourceType::Load.is_connectable());
        assert!(ResourceType::Line.is_connectable());
        assert!(!ResourceType::Switch.is_connectable());
        assert!(!ResourceType::VoltageLevel.is_connectable());
        assert_eq!(
            ResourceType::ThreeWindingsTransformer.connectable_kind(),
            ConnectableKind::ThreeWindings
        );
    }
}
