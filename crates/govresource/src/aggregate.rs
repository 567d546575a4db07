//! Pure accounting functions over usage and allocations.

use crate::allocation::{
    AllocationStrategy, HierarchicalAllocation, ParentAllocationRef, ResourceAllocation,
};
use crate::usage::{AggregationMode, DetailedUsage, ResourceCategory, ResourceUsage};
use chrono::Utc;
use govcore::{CreditCeiling, Credits, RunId};
use serde::{Deserialize, Serialize};

/// Combine child usages. Memory is always the peak; duration is the peak
/// under `Parallel` and the sum under `Sequential`.
pub fn aggregate_usage(children: &[ResourceUsage], mode: AggregationMode) -> ResourceUsage {
    match children {
        [] => ResourceUsage::default(),
        [only] => only.clone(),
        _ => ResourceUsage {
            credits_used: children.iter().map(|u| &u.credits_used).sum(),
            duration_ms: match mode {
                AggregationMode::Parallel => {
                    children.iter().map(|u| u.duration_ms).max().unwrap_or(0)
                }
                AggregationMode::Sequential => children
                    .iter()
                    .fold(0u64, |acc, u| acc.saturating_add(u.duration_ms)),
            },
            memory_used_mb: children.iter().map(|u| u.memory_used_mb).max().unwrap_or(0),
            steps_executed: children
                .iter()
                .fold(0u64, |acc, u| acc.saturating_add(u.steps_executed)),
            tool_calls: children
                .iter()
                .fold(0u64, |acc, u| acc.saturating_add(u.tool_calls)),
        },
    }
}

/// Own usage plus parallel-aggregated children.
pub fn create_detailed_usage(own: &ResourceUsage, children: &[ResourceUsage]) -> DetailedUsage {
    let from_children = aggregate_usage(children, AggregationMode::Parallel);
    DetailedUsage {
        combined: own.plus(&from_children),
        own: own.clone(),
        children: children.to_vec(),
    }
}

/// Result of projecting additional usage onto an allocation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExceedCheck {
    /// Exceeded categories in evaluation order
    pub exceeded: Vec<ResourceCategory>,
    pub projected: ResourceUsage,
}

impl ExceedCheck {
    pub fn would_exceed(&self) -> bool {
        !self.exceeded.is_empty()
    }

    pub fn first(&self) -> Option<ResourceCategory> {
        self.exceeded.first().copied()
    }
}

fn over(ceiling: Option<u64>, value: u64) -> bool {
    ceiling.map_or(false, |max| value > max)
}

/// Categories of `usage` strictly above their ceiling in `allocation`.
///
/// Steps are held against `max_concurrent_steps`.
pub fn exceeded_categories(
    usage: &ResourceUsage,
    allocation: &ResourceAllocation,
) -> Vec<ResourceCategory> {
    let mut exceeded = Vec::new();
    if allocation.max_credits.is_exceeded_by(&usage.credits_used) {
        exceeded.push(ResourceCategory::Credits);
    }
    if over(allocation.max_duration_ms, usage.duration_ms) {
        exceeded.push(ResourceCategory::Duration);
    }
    if over(allocation.max_memory_mb, usage.memory_used_mb) {
        exceeded.push(ResourceCategory::Memory);
    }
    if over(allocation.max_concurrent_steps, usage.steps_executed) {
        exceeded.push(ResourceCategory::Steps);
    }
    exceeded
}

/// Project `current + additional` and report every category that would end
/// up strictly above its ceiling. Reaching a ceiling exactly is allowed.
pub fn would_exceed_allocation(
    current: &ResourceUsage,
    additional: &ResourceUsage,
    allocation: &ResourceAllocation,
) -> ExceedCheck {
    let projected = current.plus(additional);
    ExceedCheck {
        exceeded: exceeded_categories(&projected, allocation),
        projected,
    }
}

/// Headroom per category. `None` where the allocation has no ceiling.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RemainingAllocation {
    pub credits: Option<Credits>,
    pub duration_ms: Option<u64>,
    #[serde(rename = "memoryMB")]
    pub memory_mb: Option<u64>,
    pub steps: Option<u64>,
}

pub fn calculate_remaining(
    allocation: &ResourceAllocation,
    usage: &ResourceUsage,
) -> RemainingAllocation {
    RemainingAllocation {
        credits: allocation.max_credits.remaining(&usage.credits_used),
        duration_ms: allocation
            .max_duration_ms
            .map(|max| max.saturating_sub(usage.duration_ms)),
        memory_mb: allocation
            .max_memory_mb
            .map(|max| max.saturating_sub(usage.memory_used_mb)),
        steps: allocation
            .max_concurrent_steps
            .map(|max| max.saturating_sub(usage.steps_executed)),
    }
}

/// A missing ceiling is unbounded: it fits under nothing but another
/// missing ceiling.
fn fits_under(child: Option<u64>, parent: Option<u64>) -> bool {
    match (child, parent) {
        (_, None) => true,
        (None, Some(_)) => false,
        (Some(c), Some(p)) => c <= p,
    }
}

/// Categories where the child's ceiling is above the parent's. Empty means
/// the child fits.
pub fn validate_allocation_hierarchy(
    child: &ResourceAllocation,
    parent: &ResourceAllocation,
) -> Vec<ResourceCategory> {
    let mut violations = Vec::new();
    if child.max_credits > parent.max_credits {
        violations.push(ResourceCategory::Credits);
    }
    if !fits_under(child.max_duration_ms, parent.max_duration_ms) {
        violations.push(ResourceCategory::Duration);
    }
    if !fits_under(child.max_memory_mb, parent.max_memory_mb) {
        violations.push(ResourceCategory::Memory);
    }
    if !fits_under(child.max_concurrent_steps, parent.max_concurrent_steps) {
        violations.push(ResourceCategory::Steps);
    }
    violations
}

pub fn create_hierarchical_allocation(
    allocation: ResourceAllocation,
    parent_run_id: Option<RunId>,
    parent_allocation: Option<&ResourceAllocation>,
    strategy: AllocationStrategy,
) -> HierarchicalAllocation {
    let parent = match (parent_run_id, parent_allocation) {
        (Some(parent_run_id), Some(carved_from)) => Some(ParentAllocationRef {
            parent_run_id,
            carved_from: carved_from.clone(),
        }),
        _ => None,
    };
    HierarchicalAllocation {
        allocation,
        allocated_at: Utc::now(),
        strategy,
        parent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlimited_credits_never_exceed() {
        let alloc = ResourceAllocation::unlimited().with_max_memory_mb(10);
        let big = ResourceUsage::new()
            .with_credits(Credits::parse("c", "9".repeat(60).as_str()).unwrap());
        let check = would_exceed_allocation(&ResourceUsage::new(), &big, &alloc);
        assert!(!check.would_exceed());
    }

    #[test]
    fn remaining_is_never_negative() {
        let alloc = ResourceAllocation::unlimited()
            .with_max_credits(CreditCeiling::limited(100u64))
            .with_max_duration_ms(1_000)
            .with_max_concurrent_steps(3);
        let usage = ResourceUsage::new().with_credits(250u64).with_duration_ms(400).with_steps(5);
        let remaining = calculate_remaining(&alloc, &usage);
        assert_eq!(remaining.credits, Some(Credits::zero()));
        assert_eq!(remaining.duration_ms, Some(600));
        assert_eq!(remaining.steps, Some(0));
        assert_eq!(remaining.memory_mb, None);
    }

    #[test]
    fn unbounded_child_does_not_fit_bounded_parent() {
        let parent = ResourceAllocation::unlimited()
            .with_max_credits(CreditCeiling::limited(100u64))
            .with_max_duration_ms(1_000);
        let child = ResourceAllocation::unlimited().with_max_duration_ms(500);
        assert_eq!(validate_allocation_hierarchy(&child, &parent), vec![ResourceCategory::Credits]);
        assert!(
            validate_allocation_hierarchy(&parent, &ResourceAllocation::unlimited()).is_empty()
        );
    }

    #[test]
    fn root_allocation_has_no_parent_ref() {
        let alloc = ResourceAllocation::unlimited().with_max_memory_mb(256);
        let root = create_hierarchical_allocation(
            alloc.clone(),
            None,
            None,
            AllocationStrategy::default(),
        );
        assert!(root.is_root());
        assert_eq!(root.strategy, AllocationStrategy::Strict);

        let parent_id = RunId::new_v4();
        let parent_alloc = ResourceAllocation::unlimited().with_max_memory_mb(1024);
        let child = create_hierarchical_allocation(
            alloc,
            Some(parent_id),
            Some(&parent_alloc),
            AllocationStrategy::Elastic,
        );
        let parent = child.parent.expect("parent ref");
        assert_eq!(parent.parent_run_id, parent_id);
        assert_eq!(parent.carved_from, parent_alloc);
    }
}
