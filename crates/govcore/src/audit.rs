use crate::RunId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Governance decisions published for hosts that want more than log lines
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AuditEvent {
    #[serde(rename_all = "camelCase")]
    PermissionDenied {
        run_id: String,
        step_id: String,
        reason: String,
        required_role: Option<String>,
        required_permissions: Vec<String>,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    UsageRejected {
        run_id: RunId,
        category: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    LimitBreached {
        run_id: RunId,
        category: String,
        reason: String,
        action: String,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    EventThrown {
        node_id: String,
        event_type: String,
        reference: Option<String>,
        timestamp: DateTime<Utc>,
    },
}

impl AuditEvent {
    pub fn category(&self) -> &str {
        match self {
            AuditEvent::PermissionDenied { .. } => "permission",
            AuditEvent::UsageRejected { category, .. } => category,
            AuditEvent::LimitBreached { category, .. } => category,
            AuditEvent::EventThrown { event_type, .. } => event_type,
        }
    }
}

/// Handle components use to publish audit events
#[derive(Clone, Debug)]
pub struct AuditEmitter {
    sender: broadcast::Sender<AuditEvent>,
}

impl AuditEmitter {
    pub fn new(sender: broadcast::Sender<AuditEvent>) -> Self {
        Self { sender }
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn emit(&self, event: AuditEvent) {
        let _ = self.sender.send(event);
    }
}

/// Broadcast bus for audit events
pub struct AuditBus {
    sender: broadcast::Sender<AuditEvent>,
}

impl AuditBus {
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuditEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: AuditEvent) {
        let _ = self.sender.send(event);
    }

    pub fn emitter(&self) -> AuditEmitter {
        AuditEmitter::new(self.sender.clone())
    }
}

impl Default for AuditBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_emitted_events() {
        let bus = AuditBus::new(8);
        let mut rx = bus.subscribe();
        let emitter = bus.emitter();

        emitter.emit(AuditEvent::UsageRejected {
            run_id: RunId::new_v4(),
            category: "credits".into(),
            reason: "over budget".into(),
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.category(), "credits");
    }

    #[tokio::test]
    async fn zero_capacity_bus_still_delivers() {
        let bus = AuditBus::new(0);
        let mut rx = bus.subscribe();

        bus.emit(AuditEvent::EventThrown {
            node_id: "n1".into(),
            event_type: "signal".into(),
            reference: None,
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        assert!(matches!(event, AuditEvent::EventThrown { .. }));
    }

    #[test]
    fn emitting_without_subscribers_is_silent() {
        let bus = AuditBus::new(2);
        bus.emit(AuditEvent::EventThrown {
            node_id: "n1".into(),
            event_type: "signal".into(),
            reference: Some("go".into()),
            timestamp: Utc::now(),
        });
    }
}
