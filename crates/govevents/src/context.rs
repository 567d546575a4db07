use crate::definition::EventType;
use chrono::{DateTime, Utc};
use govcore::{Value, Variables};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Per-run state shared by the orchestrator and the event engine.
///
/// The engine never mutates a caller's context: every call returns an
/// updated copy.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ExecutionContext {
    pub variables: Variables,
    pub blackboard: Variables,
    pub events: EventQueues,
    pub parallel_branches: BTreeMap<String, ParallelBranchState>,
    pub subprocesses: BTreeMap<String, SubprocessState>,
    pub gateways: BTreeMap<String, GatewayState>,
    pub compensation: CompensationState,
    pub external: ExternalBuffers,
    pub loops: BTreeMap<String, LoopCounter>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_variable(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.variables.insert(key.into(), value.into());
    }

    pub fn with_variable(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set_variable(key, value);
        self
    }

    /// Queue an inbound message for catch events to consume.
    pub fn inject_message(&mut self, name: impl Into<String>, payload: Value) -> String {
        let event = InboundEvent::new(name, payload);
        let id = event.id.clone();
        self.external.message_events.push(event);
        id
    }

    /// Queue an inbound signal for catch events to consume.
    pub fn inject_signal(&mut self, name: impl Into<String>, payload: Value) -> String {
        let event = InboundEvent::new(name, payload);
        let id = event.id.clone();
        self.external.signal_events.push(event);
        id
    }

    pub fn register_compensation_handler(
        &mut self,
        activity_ref: impl Into<String>,
        handler_node: impl Into<String>,
    ) {
        self.compensation.handlers.push(CompensationHandler {
            activity_ref: activity_ref.into(),
            handler_node: handler_node.into(),
        });
    }

    pub(crate) fn pending_for(&self, node_id: &str) -> Option<&PendingEvent> {
        self.events.pending.iter().find(|p| p.node_id == node_id)
    }

    pub(crate) fn clear_pending_for(&mut self, node_id: &str) {
        self.events.pending.retain(|p| p.node_id != node_id);
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct EventQueues {
    /// Subscriptions the orchestrator keeps open (e.g. boundary events).
    /// The engine reads and preserves these but never adds to them.
    pub active: Vec<PendingEvent>,
    /// Catch events currently suspended
    pub pending: Vec<PendingEvent>,
    /// Append-only log of thrown events
    pub fired: Vec<FiredEvent>,
    pub timers: Vec<TimerRegistration>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PendingEvent {
    pub id: String,
    pub node_id: String,
    pub event_type: EventType,
    #[serde(default)]
    pub reference: Option<String>,
    pub registered_at: DateTime<Utc>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FiredEvent {
    pub id: String,
    pub node_id: String,
    pub event_type: EventType,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub payload: Option<Value>,
    pub fired_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TimerRegistration {
    pub node_id: String,
    pub registered_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Messages and signals delivered from outside the run
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ExternalBuffers {
    pub message_events: Vec<InboundEvent>,
    pub signal_events: Vec<InboundEvent>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InboundEvent {
    #[serde(default = "new_event_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub received_at: Option<DateTime<Utc>>,
}

impl InboundEvent {
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            id: new_event_id(),
            name: name.into(),
            payload,
            received_at: Some(Utc::now()),
        }
    }
}

pub(crate) fn new_event_id() -> String {
    Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct CompensationState {
    pub handlers: Vec<CompensationHandler>,
    /// Handlers a compensation throw asked the orchestrator to run
    pub requested: Vec<CompensationRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CompensationHandler {
    pub activity_ref: String,
    pub handler_node: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CompensationRequest {
    pub activity_ref: String,
    pub handler_node: String,
    pub requested_by: String,
    pub requested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ParallelBranchState {
    pub expected: u32,
    pub completed: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SubprocessState {
    pub node_id: String,
    pub child_run_id: Option<String>,
    pub completed: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct GatewayState {
    pub arrived: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct LoopCounter {
    pub iterations: u32,
    pub completed_instances: u32,
}
