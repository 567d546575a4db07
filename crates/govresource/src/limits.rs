use crate::usage::ResourceCategory;
use govcore::{AuditEmitter, AuditEvent, Clock, CreditCeiling, Run, RunStatus, SystemClock};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// What happens to a run that breaches a limit
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum LimitBehavior {
    #[default]
    Stop,
    Pause,
}

impl LimitBehavior {
    fn status(self) -> RunStatus {
        match self {
            LimitBehavior::Stop => RunStatus::Failed,
            LimitBehavior::Pause => RunStatus::Paused,
        }
    }
}

impl fmt::Display for LimitBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimitBehavior::Stop => f.write_str("Stop"),
            LimitBehavior::Pause => f.write_str("Pause"),
        }
    }
}

/// User-facing limits on a run. A missing ceiling is never checked.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct RunLimits {
    pub max_time_ms: Option<u64>,
    pub max_credits: Option<CreditCeiling>,
    pub max_steps: Option<u64>,
    pub on_max_time: Option<LimitBehavior>,
    pub on_max_credits: Option<LimitBehavior>,
    pub on_max_steps: Option<LimitBehavior>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LimitBreach {
    pub category: ResourceCategory,
    pub reason: String,
    pub behavior: LimitBehavior,
}

/// Evaluates [`RunLimits`] against a run and moves breaching runs to
/// `Failed` or `Paused`.
pub struct LimitsManager {
    clock: Arc<dyn Clock>,
    audit: Option<AuditEmitter>,
}

impl LimitsManager {
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

    /// Check time, then credits, then steps. Only the first breach is
    /// acted on.
    pub fn check_limits(
        &self,
        run: &mut Run,
        limits: &RunLimits,
        start_time_ms: i64,
    ) -> Option<LimitBreach> {
        let breach = self.first_breach(run, limits, start_time_ms)?;

        tracing::warn!(
            category = %breach.category,
            run_id = %run.id,
            reason = %breach.reason,
            action = %breach.behavior,
            "Run limit breached"
        );
        if let Some(audit) = &self.audit {
            audit.emit(AuditEvent::LimitBreached {
                run_id: run.id,
                category: breach.category.to_string(),
                reason: breach.reason.clone(),
                action: breach.behavior.to_string(),
                timestamp: self.clock.now(),
            });
        }

        run.status = breach.behavior.status();
        Some(breach)
    }

    fn first_breach(
        &self,
        run: &Run,
        limits: &RunLimits,
        start_time_ms: i64,
    ) -> Option<LimitBreach> {
        if let Some(max) = limits.max_time_ms {
            // an overflowing difference counts as no time elapsed
            let elapsed = self
                .clock
                .now_ms()
                .checked_sub(start_time_ms)
                .and_then(|d| u64::try_from(d).ok())
                .unwrap_or(0);
            if elapsed > max {
                return Some(LimitBreach {
                    category: ResourceCategory::Duration,
                    reason: format!("Maximum execution time exceeded ({}ms > {}ms)", elapsed, max),
                    behavior: limits.on_max_time.unwrap_or_default(),
                });
            }
        }

        if let Some(max) = &limits.max_credits {
            let spent = &run.metrics.credits_spent;
            if max.is_exceeded_by(spent) {
                return Some(LimitBreach {
                    category: ResourceCategory::Credits,
                    reason: format!("Maximum credits exceeded ({} > {})", spent, max),
                    behavior: limits.on_max_credits.unwrap_or_default(),
                });
            }
        }

        if let Some(max) = limits.max_steps {
            let steps = run.metrics.steps_run;
            if steps > max {
                return Some(LimitBreach {
                    category: ResourceCategory::Steps,
                    reason: format!("Maximum steps exceeded ({} > {})", steps, max),
                    behavior: limits.on_max_steps.unwrap_or_default(),
                });
            }
        }

        None
    }
}

impl Default for LimitsManager {
    fn default() -> Self {
        Self::new()
    }
}
