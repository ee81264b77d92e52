//! Shared bus derivation skeleton
//!
//! Both topology representations build the same kind of graph: vertices are
//! node or configured bus keys, edges are switches (plus permanent internal
//! connections). Buses are the connected components reachable through
//! closed switches only. [`AbstractTopology`] carries the traversal; the
//! node/breaker and bus/breaker variants only say how keys are found and how
//! a component is named.

use super::model::{BusPartition, CalculatedBus, SwitchEdge, Vertex, VoltageLevelView};
use super::TopologyError;
use crate::resource::{Side, TopologyKind};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;

/// Edge of the switch graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge<K> {
    pub other: K,
    /// Switch id, absent for a permanent internal connection
    pub switch_id: Option<String>,
    pub open: bool,
}

/// Undirected graph of one voltage level
#[derive(Debug, Clone)]
pub struct SwitchGraph<K> {
    terminals: BTreeMap<K, Vec<Vertex>>,
    edges: BTreeMap<K, Vec<Edge<K>>>,
}

impl<K> Default for SwitchGraph<K> {
    fn default() -> Self {
        Self {
            terminals: BTreeMap::new(),
            edges: BTreeMap::new(),
        }
    }
}

impl<K: Clone + Ord> SwitchGraph<K> {
    pub fn add_vertex(&mut self, key: K) {
        self.terminals.entry(key.clone()).or_default();
        self.edges.entry(key).or_default();
    }

    pub fn add_terminal(&mut self, key: K, vertex: Vertex) {
        self.add_vertex(key.clone());
        self.terminals.entry(key).or_default().push(vertex);
    }

    pub fn add_edge(&mut self, a: K, b: K, switch_id: Option<String>, open: bool) {
        self.add_vertex(a.clone());
        self.add_vertex(b.clone());
        self.edges.entry(a.clone()).or_default().push(Edge {
            other: b.clone(),
            switch_id: switch_id.clone(),
            open,
        });
        self.edges.entry(b).or_default().push(Edge {
            other: a,
            switch_id,
            open,
        });
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.terminals.keys()
    }

    pub fn terminals_at(&self, key: &K) -> &[Vertex] {
        self.terminals.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn edges_at(&self, key: &K) -> &[Edge<K>] {
        self.edges.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, key: &K) -> bool {
        self.terminals.contains_key(key)
    }

    /// Keys reachable from `start` through closed edges, sorted
    ///
    /// Keys already in `visited` are not entered; every key reached is added.
    pub fn component_from(&self, start: &K, visited: &mut BTreeSet<K>) -> Vec<K> {
        let mut component = Vec::new();
        if !visited.insert(start.clone()) {
            return component;
        }
        let mut queue = VecDeque::from([start.clone()]);
        while let Some(key) = queue.pop_front() {
            for edge in self.edges_at(&key) {
                if !edge.open && visited.insert(edge.other.clone()) {
                    queue.push_back(edge.other.clone());
                }
            }
            component.push(key);
        }
        component.sort();
        component
    }

    /// Every connected component, ordered by smallest key
    pub fn components(&self) -> Vec<Vec<K>> {
        let mut visited = BTreeSet::new();
        self.keys()
            .map(|k| self.component_from(k, &mut visited))
            .filter(|c| !c.is_empty())
            .collect()
    }
}

/// Bus derivation, parameterized by the vertex key type
pub trait AbstractTopology {
    type Key: Clone + Ord + fmt::Debug + fmt::Display;

    fn kind(&self) -> TopologyKind;

    /// Graph key a terminal is attached to, `None` when it is disconnected
    fn terminal_key(
        &self,
        view: &VoltageLevelView,
        vertex: &Vertex,
    ) -> Result<Option<Self::Key>, TopologyError>;

    /// Keys joined by a switch
    fn switch_ends(
        &self,
        view: &VoltageLevelView,
        switch: &SwitchEdge,
    ) -> Result<(Self::Key, Self::Key), TopologyError>;

    /// Vertices and permanent edges that exist before any switch or terminal
    fn seed(&self, view: &VoltageLevelView, graph: &mut SwitchGraph<Self::Key>);

    /// Whether a component forms a bus
    fn is_bus(&self, graph: &SwitchGraph<Self::Key>, component: &[Self::Key]) -> bool;

    /// Identifier of a bus, derived from its sorted component only
    fn bus_id(&self, view: &VoltageLevelView, component: &[Self::Key]) -> String;

    /// Record the merged keys on the bus
    fn describe(&self, component: &[Self::Key], bus: &mut CalculatedBus);

    fn check_kind(&self, view: &VoltageLevelView) -> Result<(), TopologyError> {
        if view.topology_kind != self.kind() {
            return Err(TopologyError::TopologyKindMismatch {
                voltage_level_id: view.voltage_level_id.clone(),
                expected: self.kind(),
                actual: view.topology_kind,
            });
        }
        Ok(())
    }

    /// Graph of a voltage level; switches are edges whatever their state
    fn build_graph(&self, view: &VoltageLevelView) -> Result<SwitchGraph<Self::Key>, TopologyError> {
        self.check_kind(view)?;
        let mut graph = SwitchGraph::default();
        self.seed(view, &mut graph);
        for switch in &view.switches {
            let (a, b) = self.switch_ends(view, switch)?;
            graph.add_edge(a, b, Some(switch.id.clone()), switch.attributes.open);
        }
        for vertex in &view.terminals {
            if let Some(key) = self.terminal_key(view, vertex)? {
                graph.add_terminal(key, vertex.clone());
            }
        }
        Ok(graph)
    }

    fn make_bus(
        &self,
        view: &VoltageLevelView,
        graph: &SwitchGraph<Self::Key>,
        component: &[Self::Key],
    ) -> CalculatedBus {
        let mut vertices: Vec<Vertex> = component
            .iter()
            .flat_map(|k| graph.terminals_at(k).iter().cloned())
            .collect();
        vertices.sort();
        let mut bus = CalculatedBus {
            id: self.bus_id(view, component),
            voltage_level_id: view.voltage_level_id.clone(),
            vertices,
            nodes: Vec::new(),
            configured_buses: Vec::new(),
        };
        self.describe(component, &mut bus);
        bus
    }

    /// Every bus of the voltage level
    fn calculate_buses(&self, view: &VoltageLevelView) -> Result<BusPartition, TopologyError> {
        let graph = self.build_graph(view)?;
        let buses: Vec<_> = graph
            .components()
            .into_iter()
            .filter(|c| self.is_bus(&graph, c))
            .map(|c| self.make_bus(view, &graph, &c))
            .collect();
        tracing::debug!(
            "{} buses in voltage level '{}'",
            buses.len(),
            view.voltage_level_id
        );
        Ok(BusPartition::new(&view.voltage_level_id, self.kind(), buses))
    }

    /// Bus of one terminal, traversing only from that terminal's vertex
    fn calculate_bus_of(
        &self,
        view: &VoltageLevelView,
        id: &str,
        side: Option<Side>,
    ) -> Result<Option<CalculatedBus>, TopologyError> {
        self.check_kind(view)?;
        let Some(vertex) = view.find_terminal(id, side) else {
            return Ok(None);
        };
        let graph = self.build_graph(view)?;
        let Some(start) = self.terminal_key(view, vertex)? else {
            return Ok(None);
        };
        let component = graph.component_from(&start, &mut BTreeSet::new());
        if !self.is_bus(&graph, &component) {
            return Ok(None);
        }
        Ok(Some(self.make_bus(view, &graph, &component)))
    }
}
