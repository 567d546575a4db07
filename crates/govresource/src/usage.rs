use govcore::Credits;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Observed consumption of a run or subtree.
///
/// `memory_used_mb` is a peak, never a running total.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceUsage {
    pub credits_used: Credits,
    pub duration_ms: u64,
    #[serde(rename = "memoryUsedMB")]
    pub memory_used_mb: u64,
    pub steps_executed: u64,
    pub tool_calls: u64,
}

impl ResourceUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credits(mut self, credits: impl Into<Credits>) -> Self {
        self.credits_used = credits.into();
        self
    }

    pub fn with_duration_ms(mut self, ms: u64) -> Self {
        self.duration_ms = ms;
        self
    }

    pub fn with_memory_mb(mut self, mb: u64) -> Self {
        self.memory_used_mb = mb;
        self
    }

    pub fn with_steps(mut self, steps: u64) -> Self {
        self.steps_executed = steps;
        self
    }

    pub fn with_tool_calls(mut self, calls: u64) -> Self {
        self.tool_calls = calls;
        self
    }

    /// Usage after also consuming `delta`. Duration accumulates, memory
    /// keeps the higher peak.
    pub fn plus(&self, delta: &ResourceUsage) -> ResourceUsage {
        ResourceUsage {
            credits_used: &self.credits_used + &delta.credits_used,
            duration_ms: self.duration_ms.saturating_add(delta.duration_ms),
            memory_used_mb: self.memory_used_mb.max(delta.memory_used_mb),
            steps_executed: self.steps_executed.saturating_add(delta.steps_executed),
            tool_calls: self.tool_calls.saturating_add(delta.tool_calls),
        }
    }
}

/// Combined usage of a run and its children, with the breakdown kept for
/// auditing.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DetailedUsage {
    pub combined: ResourceUsage,
    pub own: ResourceUsage,
    pub children: Vec<ResourceUsage>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub enum ResourceCategory {
    Credits,
    Duration,
    Memory,
    Steps,
    ToolCalls,
}

impl ResourceCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceCategory::Credits => "credits",
            ResourceCategory::Duration => "duration",
            ResourceCategory::Memory => "memory",
            ResourceCategory::Steps => "steps",
            ResourceCategory::ToolCalls => "toolCalls",
        }
    }
}

impl fmt::Display for ResourceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How child durations combine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AggregationMode {
    /// Children ran side by side; wall time is the longest child
    #[default]
    Parallel,
    /// Children ran one after another; wall time adds up
    Sequential,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plus_keeps_peak_memory() {
        let a = ResourceUsage::new().with_credits(10u64).with_memory_mb(512).with_duration_ms(5);
        let b = ResourceUsage::new().with_credits(5u64).with_memory_mb(128).with_duration_ms(7);
        let sum = a.plus(&b);
        assert_eq!(sum.credits_used, Credits::from(15));
        assert_eq!(sum.memory_used_mb, 512);
        assert_eq!(sum.duration_ms, 12);
    }

    #[test]
    fn usage_uses_wire_names() {
        let usage: ResourceUsage = serde_json::from_str(
            r#"{"creditsUsed": "123456789012345678901234567890", "memoryUsedMB": 64, "toolCalls": 2}"#,
        )
        .unwrap();
        assert_eq!(usage.memory_used_mb, 64);
        assert_eq!(usage.tool_calls, 2);
        assert_eq!(usage.credits_used.to_string(), "123456789012345678901234567890");

        let json = serde_json::to_value(&usage).unwrap();
        assert_eq!(json["creditsUsed"], "123456789012345678901234567890");
    }
}
