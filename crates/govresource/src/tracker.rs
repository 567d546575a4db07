use crate::aggregate::{
    calculate_remaining, create_detailed_usage, would_exceed_allocation, RemainingAllocation,
};
use crate::allocation::ResourceAllocation;
use crate::usage::{DetailedUsage, ResourceCategory, ResourceUsage};
use chrono::{DateTime, Utc};
use govcore::{AuditEmitter, AuditEvent, Clock, ResourceError, RunId, SystemClock};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Structured rejection returned by [`ResourceTracker::add_usage`]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UsageRejection {
    /// First category that would be exceeded
    pub category: ResourceCategory,
    pub exceeded: Vec<ResourceCategory>,
    pub projected: ResourceUsage,
    pub reason: String,
}

impl fmt::Display for UsageRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason)
    }
}

/// Per-run usage ledger bound to one allocation.
///
/// The check and the commit in [`add_usage`](Self::add_usage) happen under
/// one lock, so concurrent callers each get a single accept or reject over
/// their whole delta.
pub struct ResourceTracker {
    run_id: RunId,
    allocation: ResourceAllocation,
    clock: Arc<dyn Clock>,
    started_at: DateTime<Utc>,
    usage: Mutex<ResourceUsage>,
    audit: Option<AuditEmitter>,
}

impl ResourceTracker {
    pub fn new(run_id: RunId, allocation: ResourceAllocation) -> Self {
        Self::with_clock(run_id, allocation, Arc::new(SystemClock))
    }

    pub fn with_clock(
        run_id: RunId,
        allocation: ResourceAllocation,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let started_at = clock.now();
        Self {
            run_id,
            allocation,
            clock,
            started_at,
            usage: Mutex::new(ResourceUsage::default()),
            audit: None,
        }
    }

    pub fn with_audit(mut self, audit: AuditEmitter) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn allocation(&self) -> &ResourceAllocation {
        &self.allocation
    }

    fn elapsed_ms(&self) -> u64 {
        let elapsed = self.clock.now() - self.started_at;
        u64::try_from(elapsed.num_milliseconds()).unwrap_or(0)
    }

    /// Committed usage with `duration_ms` measured live from the start.
    pub fn get_current_usage(&self) -> ResourceUsage {
        let mut usage = self.usage.lock().clone();
        usage.duration_ms = self.elapsed_ms();
        usage
    }

    /// Accept the whole delta or none of it.
    pub fn add_usage(&self, delta: &ResourceUsage) -> Result<ResourceUsage, UsageRejection> {
        let mut committed = self.usage.lock();
        let mut current = committed.clone();
        current.duration_ms = self.elapsed_ms();

        let check = would_exceed_allocation(&current, delta, &self.allocation);
        if let Some(category) = check.first() {
            let reason = ResourceError::Exceeded {
                category: category.to_string(),
                projected: projected_value(&check.projected, category),
                ceiling: ceiling_value(&self.allocation, category),
            }
            .to_string();
            drop(committed);
            tracing::warn!(
                category = %category,
                run_id = %self.run_id,
                reason = %reason,
                "Usage rejected"
            );
            if let Some(audit) = &self.audit {
                audit.emit(AuditEvent::UsageRejected {
                    run_id: self.run_id,
                    category: category.to_string(),
                    reason: reason.clone(),
                    timestamp: self.clock.now(),
                });
            }
            return Err(UsageRejection {
                category,
                exceeded: check.exceeded,
                projected: check.projected,
                reason,
            });
        }

        // duration is wall-clock; only the projection sees the delta's share
        let next = check.projected;
        *committed = ResourceUsage {
            duration_ms: 0,
            ..next.clone()
        };
        tracing::debug!(
            run_id = %self.run_id,
            credits = %next.credits_used,
            steps = next.steps_executed,
            "Usage committed"
        );
        Ok(next)
    }

    /// Non-mutating form of [`add_usage`](Self::add_usage).
    pub fn can_continue(&self, delta: Option<&ResourceUsage>) -> bool {
        match delta {
            None => true,
            Some(delta) => {
                let current = self.get_current_usage();
                !would_exceed_allocation(&current, delta, &self.allocation).would_exceed()
            }
        }
    }

    pub fn get_remaining_allocation(&self) -> RemainingAllocation {
        calculate_remaining(&self.allocation, &self.get_current_usage())
    }

    pub fn get_detailed_usage(&self, children: &[ResourceUsage]) -> DetailedUsage {
        create_detailed_usage(&self.get_current_usage(), children)
    }
}

fn projected_value(usage: &ResourceUsage, category: ResourceCategory) -> String {
    match category {
        ResourceCategory::Credits => usage.credits_used.to_string(),
        ResourceCategory::Duration => format!("{}ms", usage.duration_ms),
        ResourceCategory::Memory => format!("{}MB", usage.memory_used_mb),
        ResourceCategory::Steps => usage.steps_executed.to_string(),
        ResourceCategory::ToolCalls => usage.tool_calls.to_string(),
    }
}

fn ceiling_value(allocation: &ResourceAllocation, category: ResourceCategory) -> String {
    let bound = |max: Option<u64>, unit: &str| match max {
        Some(max) => format!("{}{}", max, unit),
        None => "unlimited".to_string(),
    };
    match category {
        ResourceCategory::Credits => allocation.max_credits.to_string(),
        ResourceCategory::Duration => bound(allocation.max_duration_ms, "ms"),
        ResourceCategory::Memory => bound(allocation.max_memory_mb, "MB"),
        ResourceCategory::Steps => bound(allocation.max_concurrent_steps, ""),
        ResourceCategory::ToolCalls => bound(None, ""),
    }
}
