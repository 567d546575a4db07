// crates/govorg/tests/gate_test.rs

use govcore::{AuditBus, AuditEvent, ValidationError, Value};
use govorg::{
    AgentRef, ExecutionRequest, Mission, Norm, NormType, ObligationState, OrgSpec,
    PermissionGate, Role, RunContext, StepInfo,
};
use proptest::prelude::*;

fn as_role(role: &str) -> RunContext {
    RunContext::new("run-1").with_variable("userRole", role)
}

fn worker_spec() -> OrgSpec {
    OrgSpec::empty().with_role(Role::new("worker", ["execute:*"]))
}

#[test]
fn default_user_runs_actions_but_not_tools() {
    let gate = PermissionGate::default();
    let ctx = RunContext::new("run-1");

    let check = gate.perform_permission_check("run-1", &StepInfo::new("s1", "action"), &ctx);
    assert!(check.permitted);
    assert_eq!(check.role, "user");

    let check = gate.perform_permission_check("run-1", &StepInfo::new("s2", "tool"), &ctx);
    assert!(!check.permitted);
    assert_eq!(check.required_role.as_deref(), Some("agent"));
    assert_eq!(check.required_permissions, vec!["execute:tool".to_string()]);
}

#[test]
fn viewer_is_pointed_at_the_first_role_holding_the_permission() {
    let gate = PermissionGate::default();
    let check =
        gate.perform_permission_check("run-1", &StepInfo::new("s1", "action"), &as_role("viewer"));
    assert!(!check.permitted);
    assert_eq!(check.required_role.as_deref(), Some("user"));
}

#[test]
fn admin_wildcard_grants_everything() {
    let gate = PermissionGate::default();
    for kind in ["tool", "llm", "anything"] {
        let check =
            gate.perform_permission_check("run-1", &StepInfo::new("s", kind), &as_role("admin"));
        assert!(check.permitted, "admin denied {}", kind);
    }
}

#[test]
fn prohibition_beats_permission() {
    let spec = worker_spec()
        .with_norm(
            Norm::new("db-allowed", NormType::Permission)
                .for_role("worker")
                .on_resource("db"),
        )
        .with_norm(Norm::new("db-frozen", NormType::Prohibition).on_resource("db"));
    let gate = PermissionGate::new(spec);
    let step = StepInfo::new("s1", "query").with_resource("db");

    let check = gate.perform_permission_check("run-1", &step, &as_role("worker"));
    assert!(!check.permitted);
    assert!(check.reason.unwrap().contains("db-frozen"));
    assert_eq!(check.matched_norms, vec!["db-allowed", "db-frozen"]);

    let other = StepInfo::new("s2", "query").with_resource("cache");
    assert!(gate.perform_permission_check("run-1", &other, &as_role("worker")).permitted);
}

#[test]
fn norm_scoping_respects_mission_and_action() {
    let spec = worker_spec()
        .with_mission(Mission {
            id: "audit".into(),
            required_roles: vec![],
            goals: vec![],
            constraints: Default::default(),
        })
        .with_norm(Norm::new("no-writes-in-audit", NormType::Prohibition).in_mission("audit"))
        .with_norm(Norm::new("no-deletes", NormType::Prohibition).for_action("delete"));
    let gate = PermissionGate::new(spec);
    let step = StepInfo::new("s1", "write");

    assert!(gate.perform_permission_check("run-1", &step, &as_role("worker")).permitted);

    let ctx = as_role("worker").with_variable("userMission", "audit");
    let check = gate.perform_permission_check("run-1", &step, &ctx);
    assert!(!check.permitted);
    assert_eq!(check.mission.as_deref(), Some("audit"));
}

#[test]
fn inheritance_is_transitive() {
    let spec = OrgSpec::empty()
        .with_role(Role::new("a", ["execute:a"]).inherits(["b"]))
        .with_role(Role::new("b", ["execute:b"]).inherits(["c"]))
        .with_role(Role::new("c", ["execute:c"]));
    let gate = PermissionGate::new(spec);

    let perms = gate.get_role_permissions("a").unwrap();
    for p in ["execute:a", "execute:b", "execute:c"] {
        assert!(perms.contains(p), "missing {}", p);
    }
    assert_eq!(gate.get_role_permissions("c").unwrap().len(), 1);
    assert!(gate.get_role_permissions("ghost").unwrap().is_empty());
}

#[test]
fn diamond_inheritance_is_not_a_cycle() {
    let spec = OrgSpec::empty()
        .with_role(Role::new("top", ["execute:top"]).inherits(["left", "right"]))
        .with_role(Role::new("left", Vec::<String>::new()).inherits(["base"]))
        .with_role(Role::new("right", Vec::<String>::new()).inherits(["base"]))
        .with_role(Role::new("base", ["execute:base"]));
    let gate = PermissionGate::new(spec);

    let perms = gate.get_role_permissions("top").unwrap();
    assert!(perms.contains("execute:base"));
    assert!(perms.contains("execute:top"));
}

#[test]
fn inheritance_cycle_fails_closed() {
    let spec = OrgSpec::empty()
        .with_role(Role::new("a", ["execute:a"]).inherits(["b"]))
        .with_role(Role::new("b", ["execute:b"]).inherits(["a"]));
    let gate = PermissionGate::new(spec);

    let err = gate.get_role_permissions("a").unwrap_err();
    assert_eq!(
        err,
        ValidationError::RoleCycle(vec!["a".into(), "b".into(), "a".into()])
    );

    let check = gate.perform_permission_check("run-1", &StepInfo::new("s1", "a"), &as_role("a"));
    assert!(!check.permitted);
    assert!(check.reason.unwrap().contains("a -> b -> a"));
}

#[test]
fn mission_goal_must_belong_to_mission() {
    let gate = PermissionGate::default();
    let ctx = as_role("agent").with_variable("userMission", "data-analysis");

    let discover = StepInfo::new("s1", "tool").with_description("Discover candidate suppliers");
    let check = gate.perform_permission_check("run-1", &discover, &ctx);
    assert!(check.permitted);
    assert_eq!(check.goal.as_deref(), Some("discover"));

    let monitor = StepInfo::new("s2", "tool").with_description("Monitor the queue");
    let check = gate.perform_permission_check("run-1", &monitor, &ctx);
    assert!(!check.permitted);
    assert_eq!(check.goal.as_deref(), Some("monitor"));

    let undescribed = StepInfo::new("s3", "tool");
    assert!(gate.perform_permission_check("run-1", &undescribed, &ctx).permitted);
}

#[test]
fn unknown_mission_is_a_denial() {
    let gate = PermissionGate::default();
    let ctx = as_role("agent").with_variable("userMission", "moonshot");
    let check = gate.perform_permission_check("run-1", &StepInfo::new("s1", "tool"), &ctx);
    assert!(!check.permitted);
    assert!(check.reason.unwrap().contains("Unknown mission: moonshot"));
}

#[test]
fn mission_constraints_require_exact_values() {
    let mut constraints = govcore::Variables::new();
    constraints.insert("region".into(), Value::from("eu"));
    let spec = worker_spec().with_mission(Mission {
        id: "gdpr".into(),
        required_roles: vec!["worker".into()],
        goals: vec!["report".into()],
        constraints,
    });
    let gate = PermissionGate::new(spec);
    let step = StepInfo::new("s1", "export");
    let base = as_role("worker").with_variable("userMission", "gdpr");

    let missing = gate.perform_permission_check("run-1", &step, &base);
    assert!(!missing.permitted);

    let wrong = base.clone().with_variable("region", "us");
    assert!(!gate.perform_permission_check("run-1", &step, &wrong).permitted);

    let right = base.with_variable("region", "eu");
    assert!(gate.perform_permission_check("run-1", &step, &right).permitted);
}

#[test]
fn obligations_track_fulfillment() {
    let spec = worker_spec()
        .with_norm(Norm::new("file-report", NormType::Obligation).for_role("worker"));
    let gate = PermissionGate::new(spec);
    let step = StepInfo::new("s1", "export");

    let pending = as_role("worker");
    let check = gate.perform_permission_check("run-1", &step, &pending);
    assert!(check.permitted);
    assert_eq!(check.outstanding_obligations, vec!["file-report"]);

    let mut fulfilled = as_role("worker");
    fulfilled
        .obligations
        .insert("file-report".into(), ObligationState::Fulfilled);
    let check = gate.perform_permission_check("run-1", &step, &fulfilled);
    assert!(check.permitted);
    assert!(check.outstanding_obligations.is_empty());

    let mut violated = as_role("worker");
    violated
        .obligations
        .insert("file-report".into(), ObligationState::Violated);
    let check = gate.perform_permission_check("run-1", &step, &violated);
    assert!(!check.permitted);
    assert!(check.reason.unwrap().contains("file-report"));
}

#[test]
fn norm_conditions_see_variables_before_blackboard() {
    let spec = worker_spec()
        .with_norm(Norm::new("big-spend", NormType::Prohibition).when("${amount > 1000}"));
    let gate = PermissionGate::new(spec);
    let step = StepInfo::new("s1", "purchase");

    let big = as_role("worker").with_variable("amount", 5000i64);
    assert!(!gate.perform_permission_check("run-1", &step, &big).permitted);

    let mut from_board = as_role("worker");
    from_board.blackboard.insert("amount".into(), Value::from(5000i64));
    assert!(!gate.perform_permission_check("run-1", &step, &from_board).permitted);

    let mut shadowed = as_role("worker").with_variable("amount", 10i64);
    shadowed.blackboard.insert("amount".into(), Value::from(5000i64));
    assert!(gate.perform_permission_check("run-1", &step, &shadowed).permitted);

    assert!(gate
        .perform_permission_check("run-1", &step, &as_role("worker"))
        .permitted);
}

#[test]
fn malformed_norm_condition_fails_closed() {
    let spec = worker_spec().with_norm(Norm::new("broken", NormType::Permission).when("amount >"));
    let gate = PermissionGate::new(spec);
    let check =
        gate.perform_permission_check("run-1", &StepInfo::new("s1", "x"), &as_role("worker"));
    assert!(!check.permitted);
    assert!(check.reason.unwrap().starts_with("Permission validation failed"));
}

#[test]
fn replacing_the_spec_invalidates_cached_roles() {
    let gate = PermissionGate::default();
    assert!(!gate.get_role_permissions("user").unwrap().contains("execute:tool"));
    assert!(gate.cached_roles() > 0);

    let spec = OrgSpec::empty().with_role(Role::new("user", ["execute:tool"]));
    gate.update_org_spec(spec);
    assert_eq!(gate.cached_roles(), 0);

    let perms = gate.get_role_permissions("user").unwrap();
    assert!(perms.contains("execute:tool"));
    assert!(!perms.contains("execute:action"));
    assert_eq!(gate.org_spec().roles.len(), 1);
}

#[test]
fn gates_do_not_share_caches() {
    let first = PermissionGate::default();
    let second = PermissionGate::new(OrgSpec::empty().with_role(Role::new("user", ["*"])));
    assert!(!first.get_role_permissions("user").unwrap().contains("*"));
    assert!(second.get_role_permissions("user").unwrap().contains("*"));
}

#[test]
fn validate_execution_uses_the_requesting_agent() {
    let gate = PermissionGate::default();
    let mut context = RunContext::new("run-9");
    context.parent_agent = Some("agent-7".into());
    let request = ExecutionRequest {
        agent: Some(AgentRef {
            id: "agent-7".into(),
            name: Some("Researcher".into()),
        }),
        step: StepInfo::new("fetch", "tool"),
        context,
        team_id: Some("team-a".into()),
    };

    let decision = gate.validate_execution(&request);
    assert!(decision.allowed);
    assert_eq!(decision.reason, "Permitted");
    assert_eq!(decision.details.run_id, "run-9");
    assert_eq!(decision.details.step_id, "fetch");
    assert_eq!(decision.details.agent_id.as_deref(), Some("agent-7"));
    assert_eq!(decision.details.team_id.as_deref(), Some("team-a"));
    assert_eq!(decision.details.check.role, "agent");
    assert_eq!(decision.details.check.matched_norms, vec!["agents-use-tools"]);

    let mut stranger = request.clone();
    stranger.agent = Some(AgentRef {
        id: "agent-8".into(),
        name: None,
    });
    let decision = gate.validate_execution(&stranger);
    assert!(!decision.allowed);
    assert!(decision.reason.contains("execute:tool"));
}

#[test]
fn requests_deserialize_from_camel_case() {
    let request: ExecutionRequest = serde_json::from_str(
        r#"{
            "agent": {"id": "a1"},
            "step": {"id": "s1", "type": "llm", "description": "Summarize findings"},
            "context": {
                "runId": "r1",
                "variables": {"userRole": "agent"},
                "obligations": {"file-report": "violated"}
            },
            "teamId": "t1"
        }"#,
    )
    .unwrap();
    assert_eq!(request.step.step_type, "llm");
    assert_eq!(
        request.context.obligations.get("file-report"),
        Some(&ObligationState::Violated)
    );

    let decision = PermissionGate::default().validate_execution(&request);
    assert!(decision.allowed);
    assert_eq!(decision.details.check.goal.as_deref(), Some("report"));
}

#[test]
fn denials_are_published_on_the_audit_bus() {
    let bus = AuditBus::new(16);
    let mut rx = bus.subscribe();
    let gate = PermissionGate::default().with_audit(bus.emitter());

    gate.perform_permission_check("run-1", &StepInfo::new("s1", "action"), &as_role("user"));
    gate.perform_permission_check("run-1", &StepInfo::new("s2", "tool"), &as_role("user"));

    match rx.try_recv().unwrap() {
        AuditEvent::PermissionDenied {
            run_id,
            step_id,
            required_role,
            ..
        } => {
            assert_eq!(run_id, "run-1");
            assert_eq!(step_id, "s2");
            assert_eq!(required_role.as_deref(), Some("agent"));
        }
        other => panic!("unexpected event {:?}", other),
    }
    assert!(rx.try_recv().is_err());
}

proptest! {
    #[test]
    fn chain_closure_holds_every_ancestor(depth in 1usize..12) {
        let mut spec = OrgSpec::empty();
        for i in 0..depth {
            let mut role = Role::new(format!("r{}", i), [format!("execute:p{}", i)]);
            if i + 1 < depth {
                role = role.inherits([format!("r{}", i + 1)]);
            }
            spec = spec.with_role(role);
        }
        let gate = PermissionGate::new(spec);
        let perms = gate.get_role_permissions("r0").unwrap();
        prop_assert_eq!(perms.len(), depth);
        for i in 0..depth {
            let want = format!("execute:p{}", i);
            prop_assert!(perms.contains(&want), "missing {}", want);
        }
    }
}
