use crate::context::{
    new_event_id, CompensationRequest, ExecutionContext, FiredEvent, InboundEvent, PendingEvent,
    TimerRegistration,
};
use crate::definition::{EventDefinition, EventType, TimerDefinition};
use crate::location::{Location, LocationKind};
use crate::model::{NodeDef, NodeKind, ProcessModel};
use chrono::{DateTime, Utc};
use govcore::{AuditEmitter, AuditEvent, Clock, Condition, EngineError, SystemClock, Value};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// An event thrown or caught by a node
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub event_type: EventType,
    pub reference: Option<String>,
    pub payload: Option<Value>,
}

/// What a suspended catch event is waiting for
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WaitingEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub reference: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Result of resolving one intermediate event node
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventOutcome {
    pub event_thrown: Option<EventRecord>,
    pub event_caught: Option<EventRecord>,
    pub waiting_for_event: Option<WaitingEvent>,
    pub next_locations: Vec<Location>,
    pub updated_context: ExecutionContext,
}

impl EventOutcome {
    fn advance(updated_context: ExecutionContext, next_locations: Vec<Location>) -> Self {
        Self {
            event_thrown: None,
            event_caught: None,
            waiting_for_event: None,
            next_locations,
            updated_context,
        }
    }

    pub fn is_waiting(&self) -> bool {
        self.waiting_for_event.is_some()
    }
}

/// Resolves intermediate event nodes into control-flow transitions.
///
/// The engine holds no per-run state. Everything it needs comes in through
/// the model and the execution context, and every change comes back out in
/// [`EventOutcome::updated_context`]. Suspension is data: a catch event that
/// cannot fire yet returns a waiting location at the same node and the
/// orchestrator calls again later.
pub struct EventEngine {
    clock: Arc<dyn Clock>,
    audit: Option<AuditEmitter>,
}

impl EventEngine {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self { clock, audit: None }
    }

    pub fn with_audit(mut self, audit: AuditEmitter) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn process_intermediate_event(
        &self,
        model: &ProcessModel,
        node_id: &str,
        location: &Location,
        context: &ExecutionContext,
    ) -> Result<EventOutcome, EngineError> {
        let node = model
            .get_node(node_id)
            .ok_or_else(|| EngineError::NodeNotFound(node_id.to_string()))?;
        let ctx = context.clone();

        let Some(definition) = node.event.as_ref() else {
            tracing::debug!(node_id, "Node has no event definition, passing through");
            let next = outgoing_locations(model, node, location)?;
            return Ok(EventOutcome::advance(ctx, next));
        };

        match node.kind {
            NodeKind::IntermediateThrowEvent => {
                self.throw_event(model, node, definition, location, ctx)
            }
            NodeKind::IntermediateCatchEvent => {
                self.catch_event(model, node, definition, location, ctx)
            }
            kind => {
                tracing::debug!(node_id, ?kind, "Not an intermediate event, passing through");
                let next = outgoing_locations(model, node, location)?;
                Ok(EventOutcome::advance(ctx, next))
            }
        }
    }

    /// Pending catch events, optionally restricted to one event type.
    pub fn get_pending_intermediate_events<'a>(
        &self,
        context: &'a ExecutionContext,
        filter: Option<EventType>,
    ) -> Vec<&'a PendingEvent> {
        context
            .events
            .pending
            .iter()
            .filter(|p| filter.map_or(true, |t| p.event_type == t))
            .collect()
    }

    /// Copy of `context` without the pending event `event_id`.
    pub fn complete_intermediate_event(
        &self,
        context: &ExecutionContext,
        event_id: &str,
    ) -> ExecutionContext {
        let mut updated = context.clone();
        updated.events.pending.retain(|p| p.id != event_id);
        updated
    }

    fn throw_event(
        &self,
        model: &ProcessModel,
        node: &NodeDef,
        definition: &EventDefinition,
        location: &Location,
        mut ctx: ExecutionContext,
    ) -> Result<EventOutcome, EngineError> {
        let now = self.clock.now();
        let event_type = definition.event_type();
        let reference = definition.reference();
        let mut jump_to = None;

        match definition {
            EventDefinition::Message { message_ref } => {
                if node.externally_visible {
                    ctx.external
                        .message_events
                        .push(published(message_ref, now));
                }
            }
            EventDefinition::Signal { signal_ref } => {
                if node.externally_visible {
                    ctx.external.signal_events.push(published(signal_ref, now));
                }
            }
            EventDefinition::Link { name } => {
                let target = model.find_link_catch(name)?;
                jump_to = Some(vec![location.at_node(target)]);
            }
            EventDefinition::Escalation { .. } => {}
            EventDefinition::Compensation { activity_ref } => {
                let requests: Vec<CompensationRequest> = ctx
                    .compensation
                    .handlers
                    .iter()
                    .filter(|h| activity_ref.as_ref().map_or(true, |a| *a == h.activity_ref))
                    .map(|h| CompensationRequest {
                        activity_ref: h.activity_ref.clone(),
                        handler_node: h.handler_node.clone(),
                        requested_by: node.id.clone(),
                        requested_at: now,
                    })
                    .collect();
                if requests.is_empty() {
                    tracing::warn!(
                        node_id = %node.id,
                        activity_ref = ?activity_ref,
                        "Compensation thrown with no registered handler"
                    );
                }
                ctx.compensation.requested.extend(requests);
            }
            EventDefinition::Timer(_) | EventDefinition::Conditional { .. } => {
                tracing::warn!(
                    node_id = %node.id,
                    %event_type,
                    "Event type cannot be thrown, passing through"
                );
                let next = outgoing_locations(model, node, location)?;
                return Ok(EventOutcome::advance(ctx, next));
            }
        }

        ctx.events.fired.push(FiredEvent {
            id: new_event_id(),
            node_id: node.id.clone(),
            event_type,
            reference: reference.clone(),
            payload: None,
            fired_at: now,
        });

        tracing::info!(
            node_id = %node.id,
            %event_type,
            reference = ?reference,
            "Intermediate event thrown"
        );
        if let Some(audit) = &self.audit {
            audit.emit(AuditEvent::EventThrown {
                node_id: node.id.clone(),
                event_type: event_type.to_string(),
                reference: reference.clone(),
                timestamp: now,
            });
        }

        let next_locations = match jump_to {
            Some(next) => next,
            None => outgoing_locations(model, node, location)?,
        };

        Ok(EventOutcome {
            event_thrown: Some(EventRecord {
                event_type,
                reference,
                payload: None,
            }),
            event_caught: None,
            waiting_for_event: None,
            next_locations,
            updated_context: ctx,
        })
    }

    fn catch_event(
        &self,
        model: &ProcessModel,
        node: &NodeDef,
        definition: &EventDefinition,
        location: &Location,
        ctx: ExecutionContext,
    ) -> Result<EventOutcome, EngineError> {
        match definition {
            EventDefinition::Message { message_ref } => self.catch_from_buffer(
                model,
                node,
                location,
                ctx,
                EventType::Message,
                message_ref,
                |c| &mut c.external.message_events,
            ),
            EventDefinition::Signal { signal_ref } => self.catch_from_buffer(
                model,
                node,
                location,
                ctx,
                EventType::Signal,
                signal_ref,
                |c| &mut c.external.signal_events,
            ),
            EventDefinition::Timer(timer) => self.catch_timer(model, node, timer, location, ctx),
            EventDefinition::Conditional { condition } => {
                let condition = Condition::parse(condition)?;
                if condition.evaluate(&ctx.variables)? {
                    let caught = EventRecord {
                        event_type: EventType::Conditional,
                        reference: Some(condition.source().to_string()),
                        payload: None,
                    };
                    self.caught(model, node, location, ctx, caught)
                } else {
                    Ok(self.wait(
                        node,
                        location,
                        ctx,
                        EventType::Conditional,
                        Some(condition.source().to_string()),
                        None,
                    ))
                }
            }
            EventDefinition::Link { .. }
            | EventDefinition::Escalation { .. }
            | EventDefinition::Compensation { .. } => {
                let caught = EventRecord {
                    event_type: definition.event_type(),
                    reference: definition.reference(),
                    payload: None,
                };
                self.caught(model, node, location, ctx, caught)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn catch_from_buffer(
        &self,
        model: &ProcessModel,
        node: &NodeDef,
        location: &Location,
        mut ctx: ExecutionContext,
        event_type: EventType,
        reference: &str,
        buffer: fn(&mut ExecutionContext) -> &mut Vec<InboundEvent>,
    ) -> Result<EventOutcome, EngineError> {
        let inbound = {
            let buf = buffer(&mut ctx);
            buf.iter()
                .position(|e| e.name == reference)
                .map(|pos| buf.remove(pos))
        };

        match inbound {
            Some(inbound) => {
                let caught = EventRecord {
                    event_type,
                    reference: Some(reference.to_string()),
                    payload: Some(inbound.payload),
                };
                self.caught(model, node, location, ctx, caught)
            }
            None => Ok(self.wait(
                node,
                location,
                ctx,
                event_type,
                Some(reference.to_string()),
                None,
            )),
        }
    }

    fn catch_timer(
        &self,
        model: &ProcessModel,
        node: &NodeDef,
        timer: &TimerDefinition,
        location: &Location,
        mut ctx: ExecutionContext,
    ) -> Result<EventOutcome, EngineError> {
        let now = self.clock.now();
        let registered = ctx
            .events
            .timers
            .iter()
            .find(|t| t.node_id == node.id)
            .map(|t| t.expires_at);

        let expires_at = match registered {
            Some(expires_at) => expires_at,
            None => {
                let expires_at = timer.expiry(&node.id, now)?;
                tracing::debug!(node_id = %node.id, %expires_at, "Timer registered");
                ctx.events.timers.push(TimerRegistration {
                    node_id: node.id.clone(),
                    registered_at: now,
                    expires_at,
                });
                expires_at
            }
        };

        if now >= expires_at {
            ctx.events.timers.retain(|t| t.node_id != node.id);
            let caught = EventRecord {
                event_type: EventType::Timer,
                reference: Some(expires_at.to_rfc3339()),
                payload: None,
            };
            self.caught(model, node, location, ctx, caught)
        } else {
            Ok(self.wait(
                node,
                location,
                ctx,
                EventType::Timer,
                Some(expires_at.to_rfc3339()),
                Some(expires_at),
            ))
        }
    }

    fn caught(
        &self,
        model: &ProcessModel,
        node: &NodeDef,
        location: &Location,
        mut ctx: ExecutionContext,
        caught: EventRecord,
    ) -> Result<EventOutcome, EngineError> {
        ctx.clear_pending_for(&node.id);
        tracing::info!(
            node_id = %node.id,
            event_type = %caught.event_type,
            reference = ?caught.reference,
            "Intermediate event caught"
        );
        let next_locations = outgoing_locations(model, node, location)?;
        Ok(EventOutcome {
            event_thrown: None,
            event_caught: Some(caught),
            waiting_for_event: None,
            next_locations,
            updated_context: ctx,
        })
    }

    fn wait(
        &self,
        node: &NodeDef,
        location: &Location,
        mut ctx: ExecutionContext,
        event_type: EventType,
        reference: Option<String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> EventOutcome {
        if ctx.pending_for(&node.id).is_none() {
            ctx.events.pending.push(PendingEvent {
                id: new_event_id(),
                node_id: node.id.clone(),
                event_type,
                reference: reference.clone(),
                registered_at: self.clock.now(),
                expires_at,
            });
        }
        tracing::debug!(node_id = %node.id, %event_type, "Waiting for event");

        let waiting = Location {
            node_id: node.id.clone(),
            routine_id: location.routine_id.clone(),
            kind: LocationKind::IntermediateWaiting,
            metadata: Default::default(),
        }
        .with_metadata("eventType", event_type.to_string());

        EventOutcome {
            event_thrown: None,
            event_caught: None,
            waiting_for_event: Some(WaitingEvent {
                event_type,
                reference,
                expires_at,
            }),
            next_locations: vec![waiting],
            updated_context: ctx,
        }
    }
}

impl Default for EventEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn published(name: &str, at: DateTime<Utc>) -> InboundEvent {
    InboundEvent {
        id: new_event_id(),
        name: name.to_string(),
        payload: Value::Null,
        received_at: Some(at),
    }
}

fn outgoing_locations(
    model: &ProcessModel,
    node: &NodeDef,
    location: &Location,
) -> Result<Vec<Location>, EngineError> {
    model
        .outgoing_flows(&node.id)?
        .into_iter()
        .map(|flow| {
            model
                .get_node(&flow.target)
                .map(|target| location.at_node(target))
                .ok_or_else(|| EngineError::NodeNotFound(flow.target.clone()))
        })
        .collect()
}
