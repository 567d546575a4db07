use chrono::{DateTime, Duration, Utc};
use govcore::EngineError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of trigger an intermediate event throws or waits for
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Message,
    Signal,
    Timer,
    Link,
    Escalation,
    Compensation,
    Conditional,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventType::Message => "message",
            EventType::Signal => "signal",
            EventType::Timer => "timer",
            EventType::Link => "link",
            EventType::Escalation => "escalation",
            EventType::Compensation => "compensation",
            EventType::Conditional => "conditional",
        };
        f.write_str(s)
    }
}

/// Event definition attached to a node in the process model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EventDefinition {
    #[serde(rename_all = "camelCase")]
    Message { message_ref: String },
    #[serde(rename_all = "camelCase")]
    Signal { signal_ref: String },
    Timer(TimerDefinition),
    Link { name: String },
    #[serde(rename_all = "camelCase")]
    Escalation { escalation_code: String },
    #[serde(rename_all = "camelCase")]
    Compensation {
        #[serde(default)]
        activity_ref: Option<String>,
    },
    Conditional { condition: String },
}

impl EventDefinition {
    pub fn event_type(&self) -> EventType {
        match self {
            EventDefinition::Message { .. } => EventType::Message,
            EventDefinition::Signal { .. } => EventType::Signal,
            EventDefinition::Timer(_) => EventType::Timer,
            EventDefinition::Link { .. } => EventType::Link,
            EventDefinition::Escalation { .. } => EventType::Escalation,
            EventDefinition::Compensation { .. } => EventType::Compensation,
            EventDefinition::Conditional { .. } => EventType::Conditional,
        }
    }

    /// The type-specific payload reference (message ref, link name, ...).
    pub fn reference(&self) -> Option<String> {
        match self {
            EventDefinition::Message { message_ref } => Some(message_ref.clone()),
            EventDefinition::Signal { signal_ref } => Some(signal_ref.clone()),
            EventDefinition::Timer(timer) => Some(timer.describe()),
            EventDefinition::Link { name } => Some(name.clone()),
            EventDefinition::Escalation { escalation_code } => Some(escalation_code.clone()),
            EventDefinition::Compensation { activity_ref } => activity_ref.clone(),
            EventDefinition::Conditional { condition } => Some(condition.clone()),
        }
    }

    pub fn message(message_ref: impl Into<String>) -> Self {
        EventDefinition::Message {
            message_ref: message_ref.into(),
        }
    }

    pub fn signal(signal_ref: impl Into<String>) -> Self {
        EventDefinition::Signal {
            signal_ref: signal_ref.into(),
        }
    }

    pub fn link(name: impl Into<String>) -> Self {
        EventDefinition::Link { name: name.into() }
    }

    pub fn conditional(condition: impl Into<String>) -> Self {
        EventDefinition::Conditional {
            condition: condition.into(),
        }
    }
}

/// Timer trigger: a relative duration or a fixed instant.
///
/// Exactly one of the fields is expected. `duration` is ISO-8601
/// (`PT30S`, `P1DT2H`), `durationMs` is a plain millisecond count.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TimerDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
}

impl TimerDefinition {
    pub fn after_ms(ms: u64) -> Self {
        Self {
            duration_ms: Some(ms),
            ..Default::default()
        }
    }

    pub fn after(iso: impl Into<String>) -> Self {
        Self {
            duration: Some(iso.into()),
            ..Default::default()
        }
    }

    pub fn at(date: DateTime<Utc>) -> Self {
        Self {
            date: Some(date),
            ..Default::default()
        }
    }

    /// Absolute expiry for a timer first encountered at `now`.
    pub fn expiry(&self, node_id: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, EngineError> {
        if let Some(date) = self.date {
            return Ok(date);
        }
        if let Some(ms) = self.duration_ms {
            let ms = i64::try_from(ms).map_err(|_| EngineError::InvalidTimer {
                node: node_id.to_string(),
                detail: format!("duration {}ms out of range", ms),
            })?;
            return Ok(now + Duration::milliseconds(ms));
        }
        if let Some(iso) = &self.duration {
            let duration = parse_iso_duration(iso).ok_or_else(|| EngineError::InvalidTimer {
                node: node_id.to_string(),
                detail: format!("unparseable duration '{}'", iso),
            })?;
            return Ok(now + duration);
        }
        Err(EngineError::InvalidTimer {
            node: node_id.to_string(),
            detail: "timer has neither duration nor date".to_string(),
        })
    }

    fn describe(&self) -> String {
        match (&self.date, self.duration_ms, &self.duration) {
            (Some(date), _, _) => date.to_rfc3339(),
            (None, Some(ms), _) => format!("{}ms", ms),
            (None, None, Some(iso)) => iso.clone(),
            (None, None, None) => String::new(),
        }
    }
}

/// Parse an ISO-8601 duration of the form `PnWnDTnHnMnS`.
///
/// Years and months are rejected since they have no fixed length.
pub fn parse_iso_duration(raw: &str) -> Option<Duration> {
    let rest = raw.trim().strip_prefix('P')?;
    if rest.is_empty() {
        return None;
    }
    let (date_part, time_part) = match rest.split_once('T') {
        Some((d, t)) if !t.is_empty() => (d, Some(t)),
        Some(_) => return None,
        None => (rest, None),
    };

    let mut total_ms: f64 = 0.0;
    for (value, unit) in components(date_part)? {
        total_ms += value
            * match unit {
                'W' => 7.0 * 86_400_000.0,
                'D' => 86_400_000.0,
                _ => return None,
            };
    }
    if let Some(time_part) = time_part {
        for (value, unit) in components(time_part)? {
            total_ms += value
                * match unit {
                    'H' => 3_600_000.0,
                    'M' => 60_000.0,
                    'S' => 1_000.0,
                    _ => return None,
                };
        }
    }
    if !total_ms.is_finite() || total_ms > i64::MAX as f64 {
        return None;
    }
    Some(Duration::milliseconds(total_ms.round() as i64))
}

fn components(part: &str) -> Option<Vec<(f64, char)>> {
    let mut out = Vec::new();
    let mut number = String::new();
    for c in part.chars() {
        if c.is_ascii_digit() || c == '.' {
            number.push(c);
        } else {
            let value = number.parse::<f64>().ok()?;
            out.push((value, c));
            number.clear();
        }
    }
    if !number.is_empty() {
        return None;
    }
    Some(out)
}
