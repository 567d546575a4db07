use crate::cache::{PermissionCache, PermissionSet};
use crate::matcher::{permission_matches, scope_matches};
use crate::request::{
    DecisionDetails, ExecutionDecision, ExecutionRequest, ObligationState, PermissionCheck,
    RunContext, StepInfo,
};
use crate::spec::{Norm, NormType, OrgSpec};
use chrono::Utc;
use govcore::{AuditEmitter, AuditEvent, Condition, ValidationError, Value};
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

const ROLE_VARIABLE: &str = "userRole";
const MISSION_VARIABLE: &str = "userMission";
const AGENT_ROLE: &str = "agent";
const DEFAULT_ROLE: &str = "user";
const EXECUTE_ACTION: &str = "execute";

/// Goal keywords, checked in order against the step description.
const GOAL_KEYWORDS: &[(&str, &[&str])] = &[
    ("discover", &["discover", "find", "search", "explore"]),
    ("analyze", &["analyze", "analyse", "analysis", "evaluate"]),
    ("report", &["report", "summarize", "summary"]),
    ("optimize", &["optimize", "optimise", "improve", "tune"]),
    ("execute", &["execute", "run", "perform"]),
    ("monitor", &["monitor", "watch", "track"]),
];

struct OrgState {
    generation: u64,
    spec: Arc<OrgSpec>,
}

/// Decides whether a principal may execute a workflow step.
///
/// Each gate owns its org spec and role cache, so several gates (one per
/// tenant, say) can coexist. Replacing the spec invalidates the cache before
/// the write lock is released.
pub struct PermissionGate {
    state: RwLock<OrgState>,
    cache: PermissionCache,
    audit: Option<AuditEmitter>,
}

impl PermissionGate {
    pub fn new(spec: OrgSpec) -> Self {
        Self {
            state: RwLock::new(OrgState {
                generation: 0,
                spec: Arc::new(spec),
            }),
            cache: PermissionCache::new(),
            audit: None,
        }
    }

    pub fn with_audit(mut self, audit: AuditEmitter) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn org_spec(&self) -> Arc<OrgSpec> {
        self.state.read().spec.clone()
    }

    /// Replace the org spec wholesale.
    pub fn update_org_spec(&self, spec: OrgSpec) {
        let mut state = self.state.write();
        state.generation += 1;
        state.spec = Arc::new(spec);
        self.cache.invalidate(state.generation);
        tracing::info!(generation = state.generation, "Organization spec replaced");
    }

    pub fn cached_roles(&self) -> usize {
        self.cache.len()
    }

    /// Transitive closure of a role's own and inherited permissions.
    ///
    /// Unknown roles resolve to the empty set. An inheritance cycle is a
    /// configuration error.
    pub fn get_role_permissions(&self, role: &str) -> Result<PermissionSet, ValidationError> {
        let (generation, spec) = self.snapshot();
        self.role_permissions_in(generation, &spec, role)
    }

    /// Orchestrator entry point. Never fails: any error becomes a denial.
    pub fn validate_execution(&self, request: &ExecutionRequest) -> ExecutionDecision {
        let mut context = request.context.clone();
        if context.acting_agent.is_none() {
            context.acting_agent = request.agent.as_ref().map(|a| a.id.clone());
        }

        let check = self.perform_permission_check(&context.run_id, &request.step, &context);
        let reason = match (&check.reason, check.permitted) {
            (Some(reason), _) => reason.clone(),
            (None, true) => "Permitted".to_string(),
            (None, false) => "Denied".to_string(),
        };

        ExecutionDecision {
            allowed: check.permitted,
            reason,
            details: DecisionDetails {
                run_id: context.run_id.clone(),
                step_id: request.step.id.clone(),
                agent_id: context.acting_agent.clone(),
                team_id: request.team_id.clone(),
                check,
            },
        }
    }

    /// Run the role, norm and mission stages for one step. A denial is
    /// logged once with its reason.
    pub fn perform_permission_check(
        &self,
        run_id: &str,
        step: &StepInfo,
        context: &RunContext,
    ) -> PermissionCheck {
        let check = match self.evaluate(step, context) {
            Ok(check) => check,
            Err(err) => PermissionCheck {
                role: resolve_role(context),
                mission: resolve_mission(context),
                ..Default::default()
            }
            .deny(format!("Permission validation failed: {}", err)),
        };

        if !check.permitted {
            self.record_denial(run_id, &step.id, &check);
        }
        check
    }

    fn evaluate(
        &self,
        step: &StepInfo,
        context: &RunContext,
    ) -> Result<PermissionCheck, ValidationError> {
        let (generation, spec) = self.snapshot();
        let role = resolve_role(context);
        let mission = resolve_mission(context);
        let goal = step.description.as_deref().and_then(derive_goal).map(str::to_string);
        let required = format!("{}:{}", EXECUTE_ACTION, step.step_type);

        let mut check = PermissionCheck {
            permitted: true,
            role: role.clone(),
            mission: mission.clone(),
            goal: goal.clone(),
            required_permissions: vec![required.clone()],
            ..Default::default()
        };

        // Stage 1: role permission
        let permissions = self.role_permissions_in(generation, &spec, &role)?;
        if !permissions.iter().any(|p| permission_matches(p, &required)) {
            check.required_role = spec
                .roles
                .iter()
                .find(|r| {
                    self.role_permissions_in(generation, &spec, &r.id)
                        .map(|perms| perms.iter().any(|p| permission_matches(p, &required)))
                        .unwrap_or(false)
                })
                .map(|r| r.id.clone());
            return Ok(check.deny(format!("Role '{}' lacks permission '{}'", role, required)));
        }

        // Stage 2: norms
        let applicable =
            applicable_norms(&spec, &role, mission.as_deref(), step.resource(), context)?;
        check.matched_norms = applicable.iter().map(|n| n.id.clone()).collect();

        if let Some(prohibition) = applicable
            .iter()
            .find(|n| n.norm_type == NormType::Prohibition)
        {
            return Ok(check.deny(format!("Prohibited by norm '{}'", prohibition.id)));
        }
        let explicitly_permitted = applicable.iter().any(|n| n.norm_type == NormType::Permission);
        if !explicitly_permitted {
            for obligation in applicable.iter().filter(|n| n.norm_type == NormType::Obligation) {
                match context.obligations.get(&obligation.id).copied().unwrap_or_default() {
                    ObligationState::Violated => {
                        return Ok(check.deny(format!("Obligation '{}' violated", obligation.id)));
                    }
                    ObligationState::Pending => {
                        check.outstanding_obligations.push(obligation.id.clone())
                    }
                    ObligationState::Fulfilled => {}
                }
            }
        }

        // Stage 3: mission
        if let Some(mission_id) = mission.as_deref() {
            let mission = spec
                .mission(mission_id)
                .ok_or_else(|| ValidationError::UnknownMission(mission_id.to_string()))?;
            if let Some(goal) = goal.as_deref() {
                if !mission.goals.iter().any(|g| g == goal) {
                    return Ok(check.deny(format!(
                        "Goal '{}' is not part of mission '{}'",
                        goal, mission.id
                    )));
                }
            }
            for (key, expected) in &mission.constraints {
                if context.variables.get(key) != Some(expected) {
                    return Ok(check.deny(format!(
                        "Mission constraint '{}' not satisfied (expected {})",
                        key, expected
                    )));
                }
            }
        }

        Ok(check)
    }

    fn snapshot(&self) -> (u64, Arc<OrgSpec>) {
        let state = self.state.read();
        (state.generation, state.spec.clone())
    }

    fn role_permissions_in(
        &self,
        generation: u64,
        spec: &OrgSpec,
        role: &str,
    ) -> Result<PermissionSet, ValidationError> {
        if let Some(cached) = self.cache.get(generation, role) {
            return Ok(cached);
        }
        let mut resolved = BTreeSet::new();
        collect_permissions(spec, role, &mut Vec::new(), &mut HashSet::new(), &mut resolved)?;
        let resolved = Arc::new(resolved);
        self.cache.insert(generation, role, resolved.clone());
        Ok(resolved)
    }

    fn record_denial(&self, run_id: &str, step_id: &str, check: &PermissionCheck) {
        let reason = check.reason.clone().unwrap_or_default();
        tracing::warn!(
            category = "permission",
            run_id,
            step_id,
            reason = %reason,
            required_role = ?check.required_role,
            required_permissions = ?check.required_permissions,
            "Step execution denied"
        );
        if let Some(audit) = &self.audit {
            audit.emit(AuditEvent::PermissionDenied {
                run_id: run_id.to_string(),
                step_id: step_id.to_string(),
                reason,
                required_role: check.required_role.clone(),
                required_permissions: check.required_permissions.clone(),
                timestamp: Utc::now(),
            });
        }
    }
}

impl Default for PermissionGate {
    fn default() -> Self {
        Self::new(OrgSpec::default())
    }
}

fn collect_permissions(
    spec: &OrgSpec,
    role_id: &str,
    path: &mut Vec<String>,
    done: &mut HashSet<String>,
    out: &mut BTreeSet<String>,
) -> Result<(), ValidationError> {
    if path.iter().any(|r| r == role_id) {
        let mut cycle = path.clone();
        cycle.push(role_id.to_string());
        return Err(ValidationError::RoleCycle(cycle));
    }
    if done.contains(role_id) {
        return Ok(());
    }
    let Some(role) = spec.role(role_id) else {
        return Ok(());
    };

    path.push(role_id.to_string());
    out.extend(role.permissions.iter().cloned());
    for parent in &role.inherits {
        collect_permissions(spec, parent, path, done, out)?;
    }
    path.pop();
    done.insert(role_id.to_string());
    Ok(())
}

fn applicable_norms<'a>(
    spec: &'a OrgSpec,
    role: &str,
    mission: Option<&str>,
    resource: &str,
    context: &RunContext,
) -> Result<Vec<&'a Norm>, ValidationError> {
    let mut applicable = Vec::new();
    for norm in &spec.norms {
        let scoped = scope_matches(&norm.role, role)
            && norm.mission.as_deref().map_or(true, |m| Some(m) == mission)
            && scope_matches(&norm.resource, resource)
            && scope_matches(&norm.action, EXECUTE_ACTION);
        if !scoped {
            continue;
        }
        if let Some(condition) = &norm.condition {
            let condition = Condition::parse(condition)?;
            if !condition.evaluate_scoped(&[&context.variables, &context.blackboard])? {
                continue;
            }
        }
        applicable.push(norm);
    }
    Ok(applicable)
}

/// Role from `userRole`, else `agent` when the acting agent also runs the
/// parent scope, else `user`.
pub fn resolve_role(context: &RunContext) -> String {
    if let Some(Value::String(role)) = context.variables.get(ROLE_VARIABLE) {
        return role.clone();
    }
    match (&context.acting_agent, &context.parent_agent) {
        (Some(acting), Some(parent)) if acting == parent => AGENT_ROLE.to_string(),
        _ => DEFAULT_ROLE.to_string(),
    }
}

pub fn resolve_mission(context: &RunContext) -> Option<String> {
    match context.variables.get(MISSION_VARIABLE) {
        Some(Value::String(mission)) if !mission.is_empty() => Some(mission.clone()),
        _ => None,
    }
}

/// Goal implied by keywords in a step description.
pub fn derive_goal(description: &str) -> Option<&'static str> {
    let lowered = description.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    GOAL_KEYWORDS
        .iter()
        .find(|(_, keywords)| words.iter().any(|w| keywords.contains(w)))
        .map(|(goal, _)| *goal)
}
