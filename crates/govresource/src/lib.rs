//! Resource governance
//!
//! Aggregates, tracks and enforces hierarchical resource ceilings (credits,
//! wall-clock time, memory, steps) across parent and child executions.
//! Credits are exact arbitrary-precision integers throughout.

pub mod aggregate;
mod allocation;
mod limits;
mod tracker;
mod usage;

pub use aggregate::{
    aggregate_usage, calculate_remaining, create_detailed_usage, create_hierarchical_allocation,
    validate_allocation_hierarchy, would_exceed_allocation, ExceedCheck, RemainingAllocation,
};
pub use allocation::{
    AllocationStrategy, HierarchicalAllocation, ParentAllocationRef, ResourceAllocation,
};
pub use limits::{LimitBehavior, LimitBreach, LimitsManager, RunLimits};
pub use tracker::{ResourceTracker, UsageRejection};
pub use usage::{AggregationMode, DetailedUsage, ResourceCategory, ResourceUsage};
