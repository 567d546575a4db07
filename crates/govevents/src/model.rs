use crate::definition::{EventDefinition, EventType};
use govcore::{EngineError, Variables};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Kind of a node in the process graph
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    StartEvent,
    EndEvent,
    Task,
    Gateway,
    SubProcess,
    CallActivity,
    IntermediateThrowEvent,
    IntermediateCatchEvent,
}

/// Node specification in a process model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodeDef {
    pub id: String,
    pub kind: NodeKind,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub event: Option<EventDefinition>,
    /// Thrown messages/signals are also published to the external buffers.
    #[serde(default)]
    pub externally_visible: bool,
    /// Routine the node belongs to when it differs from the caller's
    #[serde(default)]
    pub routine_id: Option<String>,
    #[serde(default)]
    pub metadata: Variables,
}

impl NodeDef {
    pub fn new(id: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            kind,
            name: None,
            event: None,
            externally_visible: false,
            routine_id: None,
            metadata: Variables::new(),
        }
    }

    pub fn task(id: impl Into<String>) -> Self {
        Self::new(id, NodeKind::Task)
    }

    pub fn throw(id: impl Into<String>, event: EventDefinition) -> Self {
        Self::new(id, NodeKind::IntermediateThrowEvent).with_event(event)
    }

    pub fn catch(id: impl Into<String>, event: EventDefinition) -> Self {
        Self::new(id, NodeKind::IntermediateCatchEvent).with_event(event)
    }

    pub fn with_event(mut self, event: EventDefinition) -> Self {
        self.event = Some(event);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn in_routine(mut self, routine_id: impl Into<String>) -> Self {
        self.routine_id = Some(routine_id.into());
        self
    }

    pub fn externally_visible(mut self) -> Self {
        self.externally_visible = true;
        self
    }

    pub fn event_type(&self) -> Option<EventType> {
        self.event.as_ref().map(EventDefinition::event_type)
    }
}

/// Sequence flow between two nodes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SequenceFlow {
    pub id: String,
    pub source: String,
    pub target: String,
}

/// On-disk form of a [`ProcessModel`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessModelSpec {
    id: String,
    #[serde(default)]
    nodes: Vec<NodeDef>,
    #[serde(default)]
    flows: Vec<SequenceFlow>,
}

/// Queryable process graph.
///
/// Nodes and flows are kept in insertion order; the petgraph graph indexes
/// them for incoming/outgoing lookups.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "ProcessModelSpec", into = "ProcessModelSpec")]
pub struct ProcessModel {
    id: String,
    nodes: Vec<NodeDef>,
    flows: Vec<SequenceFlow>,
    graph: DiGraph<usize, usize>,
    index: HashMap<String, NodeIndex>,
}

impl ProcessModel {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            nodes: Vec::new(),
            flows: Vec::new(),
            graph: DiGraph::new(),
            index: HashMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn add_node(&mut self, node: NodeDef) -> Result<NodeIndex, EngineError> {
        if self.index.contains_key(&node.id) {
            return Err(EngineError::DuplicateNode(node.id));
        }
        let idx = self.graph.add_node(self.nodes.len());
        self.index.insert(node.id.clone(), idx);
        self.nodes.push(node);
        Ok(idx)
    }

    /// Add a sequence flow with a generated id.
    pub fn connect(&mut self, source: &str, target: &str) -> Result<(), EngineError> {
        let id = format!("flow_{}_{}", source, target);
        self.add_flow(SequenceFlow {
            id,
            source: source.to_string(),
            target: target.to_string(),
        })
    }

    pub fn add_flow(&mut self, flow: SequenceFlow) -> Result<(), EngineError> {
        let from = *self.index.get(&flow.source).ok_or_else(|| EngineError::InvalidFlow {
            flow: flow.id.clone(),
            node: flow.source.clone(),
        })?;
        let to = *self.index.get(&flow.target).ok_or_else(|| EngineError::InvalidFlow {
            flow: flow.id.clone(),
            node: flow.target.clone(),
        })?;
        self.graph.add_edge(from, to, self.flows.len());
        self.flows.push(flow);
        Ok(())
    }

    pub fn get_node(&self, id: &str) -> Option<&NodeDef> {
        self.index.get(id).map(|idx| &self.nodes[self.graph[*idx]])
    }

    pub fn nodes(&self) -> &[NodeDef] {
        &self.nodes
    }

    pub fn outgoing_flows(&self, id: &str) -> Result<Vec<&SequenceFlow>, EngineError> {
        self.flows_directed(id, Direction::Outgoing)
    }

    pub fn incoming_flows(&self, id: &str) -> Result<Vec<&SequenceFlow>, EngineError> {
        self.flows_directed(id, Direction::Incoming)
    }

    fn flows_directed(&self, id: &str, dir: Direction) -> Result<Vec<&SequenceFlow>, EngineError> {
        let idx = self
            .index
            .get(id)
            .ok_or_else(|| EngineError::NodeNotFound(id.to_string()))?;
        let mut flow_ids: Vec<usize> = self
            .graph
            .edges_directed(*idx, dir)
            .map(|edge| *edge.weight())
            .collect();
        flow_ids.sort_unstable();
        Ok(flow_ids.into_iter().map(|i| &self.flows[i]).collect())
    }

    /// The unique catch node carrying the link `name`.
    pub fn find_link_catch(&self, name: &str) -> Result<&NodeDef, EngineError> {
        let mut matches = self.nodes.iter().filter(|n| {
            n.kind == NodeKind::IntermediateCatchEvent
                && matches!(&n.event, Some(EventDefinition::Link { name: link }) if link == name)
        });
        let first = matches
            .next()
            .ok_or_else(|| EngineError::LinkTargetNotFound(name.to_string()))?;
        if matches.next().is_some() {
            return Err(EngineError::AmbiguousLinkTarget(name.to_string()));
        }
        Ok(first)
    }
}

impl TryFrom<ProcessModelSpec> for ProcessModel {
    type Error = EngineError;

    fn try_from(spec: ProcessModelSpec) -> Result<Self, Self::Error> {
        let mut model = ProcessModel::new(spec.id);
        for node in spec.nodes {
            model.add_node(node)?;
        }
        for flow in spec.flows {
            model.add_flow(flow)?;
        }
        Ok(model)
    }
}

impl From<ProcessModel> for ProcessModelSpec {
    fn from(model: ProcessModel) -> Self {
        Self {
            id: model.id,
            nodes: model.nodes,
            flows: model.flows,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flows_are_returned_in_declaration_order() {
        let mut model = ProcessModel::new("p");
        for id in ["a", "b", "c"] {
            model.add_node(NodeDef::task(id)).unwrap();
        }
        model.connect("a", "b").unwrap();
        model.connect("a", "c").unwrap();

        let targets: Vec<_> = model
            .outgoing_flows("a")
            .unwrap()
            .iter()
            .map(|f| f.target.as_str())
            .collect();
        assert_eq!(targets, vec!["b", "c"]);
        assert_eq!(model.incoming_flows("c").unwrap()[0].source, "a");
    }

    #[test]
    fn rejects_dangling_flows_and_duplicates() {
        let mut model = ProcessModel::new("p");
        model.add_node(NodeDef::task("a")).unwrap();
        assert!(matches!(
            model.connect("a", "zzz"),
            Err(EngineError::InvalidFlow { .. })
        ));
        assert_eq!(
            model.add_node(NodeDef::task("a")),
            Err(EngineError::DuplicateNode("a".into()))
        );
    }

    #[test]
    fn deserializes_through_validation() {
        let json = r#"{
            "id": "p",
            "nodes": [
                {"id": "start", "kind": "start_event"},
                {"id": "wait", "kind": "intermediate_catch_event",
                 "event": {"type": "signal", "signalRef": "go"}}
            ],
            "flows": [{"id": "f1", "source": "start", "target": "wait"}]
        }"#;
        let model: ProcessModel = serde_json::from_str(json).unwrap();
        assert_eq!(model.get_node("wait").unwrap().event_type(), Some(EventType::Signal));

        let broken = r#"{"id": "p", "nodes": [], "flows": [{"id": "f", "source": "x", "target": "y"}]}"#;
        assert!(serde_json::from_str::<ProcessModel>(broken).is_err());
    }

    #[test]
    fn link_resolution_requires_exactly_one_catch() {
        let mut model = ProcessModel::new("p");
        model
            .add_node(NodeDef::catch("c1", EventDefinition::link("L")))
            .unwrap();
        assert_eq!(model.find_link_catch("L").unwrap().id, "c1");
        assert!(matches!(
            model.find_link_catch("missing"),
            Err(EngineError::LinkTargetNotFound(_))
        ));
        model
            .add_node(NodeDef::catch("c2", EventDefinition::link("L")))
            .unwrap();
        assert!(matches!(
            model.find_link_catch("L"),
            Err(EngineError::AmbiguousLinkTarget(_))
        ));
    }
}
