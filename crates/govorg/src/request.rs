use govcore::Variables;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The step a principal wants to execute
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StepInfo {
    pub id: String,
    /// Step kind; the gate requires `execute:<type>`
    #[serde(rename = "type")]
    pub step_type: String,
    /// Resource the step acts on. Defaults to the step type.
    #[serde(default)]
    pub resource: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl StepInfo {
    pub fn new(id: impl Into<String>, step_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            step_type: step_type.into(),
            resource: None,
            description: None,
        }
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn resource(&self) -> &str {
        self.resource.as_deref().unwrap_or(&self.step_type)
    }
}

/// Fulfillment state of an obligation norm within a run
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ObligationState {
    #[default]
    Pending,
    Fulfilled,
    Violated,
}

/// Run-scoped inputs to a permission decision
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RunContext {
    pub run_id: String,
    /// May carry `userRole` / `userMission` overrides
    pub variables: Variables,
    pub blackboard: Variables,
    /// Agent executing the enclosing (parent) scope
    pub parent_agent: Option<String>,
    /// Agent asking to execute this step
    pub acting_agent: Option<String>,
    /// Obligation norm id -> fulfillment state
    pub obligations: BTreeMap<String, ObligationState>,
}

impl RunContext {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            ..Default::default()
        }
    }

    pub fn with_variable(
        mut self,
        key: impl Into<String>,
        value: impl Into<govcore::Value>,
    ) -> Self {
        self.variables.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AgentRef {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Orchestrator-facing request to admit a step
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRequest {
    #[serde(default)]
    pub agent: Option<AgentRef>,
    pub step: StepInfo,
    #[serde(default)]
    pub context: RunContext,
    #[serde(default)]
    pub team_id: Option<String>,
}

/// Outcome of the three-stage permission check
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PermissionCheck {
    pub permitted: bool,
    pub reason: Option<String>,
    pub required_role: Option<String>,
    pub required_permissions: Vec<String>,
    pub role: String,
    pub mission: Option<String>,
    pub goal: Option<String>,
    pub matched_norms: Vec<String>,
    pub outstanding_obligations: Vec<String>,
}

impl PermissionCheck {
    pub(crate) fn deny(mut self, reason: impl Into<String>) -> Self {
        self.permitted = false;
        self.reason = Some(reason.into());
        self
    }
}

/// Decision returned to the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionDecision {
    pub allowed: bool,
    pub reason: String,
    pub details: DecisionDetails,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DecisionDetails {
    pub run_id: String,
    pub step_id: String,
    pub agent_id: Option<String>,
    pub team_id: Option<String>,
    pub check: PermissionCheck,
}
