use chrono::{DateTime, Utc};
use govcore::{CreditCeiling, RunId};
use serde::{Deserialize, Serialize};

/// Resource ceilings granted to a run or subtree. `None` means no ceiling.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceAllocation {
    pub max_credits: CreditCeiling,
    pub max_duration_ms: Option<u64>,
    #[serde(rename = "maxMemoryMB")]
    pub max_memory_mb: Option<u64>,
    pub max_concurrent_steps: Option<u64>,
}

impl ResourceAllocation {
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn with_max_credits(mut self, ceiling: impl Into<CreditCeiling>) -> Self {
        self.max_credits = ceiling.into();
        self
    }

    pub fn with_max_duration_ms(mut self, ms: u64) -> Self {
        self.max_duration_ms = Some(ms);
        self
    }

    pub fn with_max_memory_mb(mut self, mb: u64) -> Self {
        self.max_memory_mb = Some(mb);
        self
    }

    pub fn with_max_concurrent_steps(mut self, steps: u64) -> Self {
        self.max_concurrent_steps = Some(steps);
        self
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AllocationStrategy {
    /// Children never exceed the ceiling in aggregate
    #[default]
    Strict,
    /// Ceiling is advisory
    Elastic,
}

/// Which parent allocation a child's ceilings were carved from
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ParentAllocationRef {
    pub parent_run_id: RunId,
    pub carved_from: ResourceAllocation,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HierarchicalAllocation {
    #[serde(flatten)]
    pub allocation: ResourceAllocation,
    pub allocated_at: DateTime<Utc>,
    pub strategy: AllocationStrategy,
    #[serde(default)]
    pub parent: Option<ParentAllocationRef>,
}

impl HierarchicalAllocation {
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use govcore::Credits;

    #[test]
    fn credits_ceiling_accepts_the_unlimited_sentinel() {
        let alloc: ResourceAllocation =
            serde_json::from_str(r#"{"maxCredits": "unlimited", "maxMemoryMB": 512}"#).unwrap();
        assert!(alloc.max_credits.is_unlimited());
        assert_eq!(alloc.max_memory_mb, Some(512));
        assert_eq!(alloc.max_duration_ms, None);

        let alloc: ResourceAllocation = serde_json::from_str(r#"{"maxCredits": "500"}"#).unwrap();
        assert_eq!(alloc.max_credits, CreditCeiling::limited(Credits::from(500)));
    }

    #[test]
    fn malformed_credit_ceiling_fails_loudly() {
        let err = serde_json::from_str::<ResourceAllocation>(r#"{"maxCredits": "lots"}"#)
            .unwrap_err()
            .to_string();
        assert!(err.contains("Malformed allocation value"), "{}", err);
    }
}
