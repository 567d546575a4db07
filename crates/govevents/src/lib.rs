//! Process event engine
//!
//! Resolves intermediate event nodes (message, signal, timer, link,
//! escalation, compensation, conditional) into control-flow transitions and
//! event-queue side effects. The orchestrator calls it whenever the current
//! workflow node is an intermediate event and feeds the returned locations
//! and context back into its graph walk.

mod context;
mod definition;
mod engine;
mod location;
mod model;

pub use context::{
    CompensationHandler, CompensationRequest, CompensationState, EventQueues, ExecutionContext,
    ExternalBuffers, FiredEvent, GatewayState, InboundEvent, LoopCounter, ParallelBranchState,
    PendingEvent, SubprocessState, TimerRegistration,
};
pub use definition::{parse_iso_duration, EventDefinition, EventType, TimerDefinition};
pub use engine::{EventEngine, EventOutcome, EventRecord, WaitingEvent};
pub use location::{Location, LocationKind};
pub use model::{NodeDef, NodeKind, ProcessModel, ProcessModelSpec, SequenceFlow};
