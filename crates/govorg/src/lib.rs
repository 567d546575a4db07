//! Organizational permission gate
//!
//! Decides whether a user or agent may execute a workflow step, given a
//! role/mission/norm organization spec. Decisions are fail-closed: any
//! configuration error during evaluation becomes a denial.

mod cache;
mod gate;
mod matcher;
mod request;
mod spec;

pub use cache::{PermissionCache, PermissionSet};
pub use gate::{derive_goal, resolve_mission, resolve_role, PermissionGate};
pub use matcher::permission_matches;
pub use request::{
    AgentRef, DecisionDetails, ExecutionDecision, ExecutionRequest, ObligationState,
    PermissionCheck, RunContext, StepInfo,
};
pub use spec::{Mission, Norm, NormType, OrgSpec, Role};
