use crate::model::{NodeDef, NodeKind};
use govcore::{Value, Variables};
use serde::{Deserialize, Serialize};

/// What a location points at
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LocationKind {
    StartEvent,
    EndEvent,
    Task,
    Gateway,
    SubProcess,
    CallActivity,
    IntermediateEvent,
    /// A catch event that is suspended until its trigger arrives
    IntermediateWaiting,
}

impl From<NodeKind> for LocationKind {
    fn from(kind: NodeKind) -> Self {
        match kind {
            NodeKind::StartEvent => LocationKind::StartEvent,
            NodeKind::EndEvent => LocationKind::EndEvent,
            NodeKind::Task => LocationKind::Task,
            NodeKind::Gateway => LocationKind::Gateway,
            NodeKind::SubProcess => LocationKind::SubProcess,
            NodeKind::CallActivity => LocationKind::CallActivity,
            NodeKind::IntermediateThrowEvent | NodeKind::IntermediateCatchEvent => {
                LocationKind::IntermediateEvent
            }
        }
    }
}

/// Current position of a run in its workflow graph
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub node_id: String,
    #[serde(default)]
    pub routine_id: Option<String>,
    pub kind: LocationKind,
    #[serde(default)]
    pub metadata: Variables,
}

impl Location {
    pub fn new(node_id: impl Into<String>, kind: LocationKind) -> Self {
        Self {
            node_id: node_id.into(),
            routine_id: None,
            kind,
            metadata: Variables::new(),
        }
    }

    /// Location of `node`, staying in the current routine unless the node
    /// names its own.
    pub fn at_node(&self, node: &NodeDef) -> Self {
        Self {
            node_id: node.id.clone(),
            routine_id: node.routine_id.clone().or_else(|| self.routine_id.clone()),
            kind: node.kind.into(),
            metadata: Variables::new(),
        }
    }

    pub fn with_routine(mut self, routine_id: impl Into<String>) -> Self {
        self.routine_id = Some(routine_id.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn is_waiting(&self) -> bool {
        self.kind == LocationKind::IntermediateWaiting
    }
}
