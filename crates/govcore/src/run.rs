use crate::Credits;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub type RunId = Uuid;

/// One execution instance of a workflow, as seen by governance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Run {
    pub id: RunId,
    pub status: RunStatus,
    #[serde(default)]
    pub metrics: RunMetrics,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
}

impl Run {
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4())
    }

    pub fn with_id(id: RunId) -> Self {
        Self {
            id,
            status: RunStatus::Running,
            metrics: RunMetrics::default(),
            started_at: Some(Utc::now()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            RunStatus::Failed | RunStatus::Completed | RunStatus::Cancelled
        )
    }
}

impl Default for Run {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum RunStatus {
    Scheduled,
    Running,
    Paused,
    Failed,
    Completed,
    Cancelled,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Scheduled => "Scheduled",
            RunStatus::Running => "Running",
            RunStatus::Paused => "Paused",
            RunStatus::Failed => "Failed",
            RunStatus::Completed => "Completed",
            RunStatus::Cancelled => "Cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RunMetrics {
    #[serde(default)]
    pub credits_spent: Credits,
    #[serde(default)]
    pub steps_run: u64,
}
