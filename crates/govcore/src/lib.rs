//! Core abstractions for execution governance
//!
//! This crate provides the shared vocabulary that the event engine, the
//! permission gate and resource governance all depend on. None of those
//! components depend on each other, only on this crate.

pub mod audit;
mod clock;
mod credits;
mod error;
pub mod expr;
mod run;
mod value;

pub use audit::{AuditBus, AuditEmitter, AuditEvent};
pub use clock::{Clock, ManualClock, SystemClock};
pub use credits::{CreditCeiling, Credits};
pub use error::{
    EngineError, ExpressionError, GovernanceError, ResourceError, ValidationError,
};
pub use expr::Condition;
pub use run::{Run, RunId, RunMetrics, RunStatus};
pub use value::{lookup_path, Value, Variables};

/// Result type for governance operations
pub type Result<T> = std::result::Result<T, GovernanceError>;
