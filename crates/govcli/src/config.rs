use govorg::{OrgSpec, PermissionGate};
use govresource::{ResourceAllocation, RunLimits};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Host configuration for the governance components. Every section is
/// optional in the JSON file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct GovernanceConfig {
    pub org: OrgSpec,
    pub allocation: ResourceAllocation,
    pub limits: RunLimits,
    pub audit_buffer_size: usize,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            org: OrgSpec::default(),
            allocation: ResourceAllocation::default(),
            limits: RunLimits::default(),
            audit_buffer_size: 1024,
        }
    }
}

impl GovernanceConfig {
    pub fn load(path: &Path) -> govcore::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve every role once so inheritance cycles fail at load time
    /// rather than as denials later.
    pub fn validate(&self) -> govcore::Result<()> {
        let gate = PermissionGate::new(self.org.clone());
        for role in &self.org.roles {
            gate.get_role_permissions(&role.id)?;
        }
        Ok(())
    }

    pub fn load_or_default(path: Option<&Path>) -> govcore::Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use govcore::{CreditCeiling, Credits, GovernanceError, RunId, ValidationError};
    use govorg::Role;
    use govresource::{ResourceCategory, ResourceTracker, ResourceUsage};

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let config: GovernanceConfig =
            serde_json::from_str(r#"{"limits": {"maxCredits": "500", "onMaxCredits": "Pause"}}"#)
                .unwrap();
        assert_eq!(config.org, OrgSpec::default());
        assert_eq!(config.audit_buffer_size, 1024);
        assert_eq!(config.limits.max_credits, Some(CreditCeiling::limited(500u64)));
        assert!(config.allocation.max_credits.is_unlimited());
    }

    #[test]
    fn unknown_file_is_an_io_error() {
        let err = GovernanceConfig::load(Path::new("/nonexistent/gov.json")).unwrap_err();
        assert!(matches!(err, GovernanceError::Io(_)));
    }

    #[test]
    fn configured_allocation_bounds_a_tracker() {
        let config: GovernanceConfig =
            serde_json::from_str(r#"{"allocation": {"maxCredits": "100", "maxConcurrentSteps": 2}}"#)
                .unwrap();
        let tracker = ResourceTracker::new(RunId::new_v4(), config.allocation);

        tracker
            .add_usage(&ResourceUsage::new().with_credits(70u64).with_steps(1))
            .unwrap();
        let rejection = tracker
            .add_usage(&ResourceUsage::new().with_credits(40u64))
            .unwrap_err();
        assert_eq!(rejection.category, ResourceCategory::Credits);

        let remaining = tracker.get_remaining_allocation();
        assert_eq!(remaining.credits, Some(Credits::from(30u64)));
        assert_eq!(remaining.steps, Some(1));
    }

    #[test]
    fn role_cycles_are_rejected_up_front() {
        let config = GovernanceConfig {
            org: OrgSpec::empty()
                .with_role(Role::new("a", ["execute:a"]).inherits(["b"]))
                .with_role(Role::new("b", ["execute:b"]).inherits(["a"])),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            GovernanceError::Validation(ValidationError::RoleCycle(_))
        ));
        assert!(GovernanceConfig::default().validate().is_ok());
    }
}
