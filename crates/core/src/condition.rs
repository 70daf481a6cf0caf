//! Normalized danger conditions and the keys used to rate-limit them.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Subject id for signals that cannot be attributed to a person.
pub const UNKNOWN_SUBJECT: &str = "unknown";

/// A vital sign the evaluator checks against a lower bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Temperature,
    Oxygen,
    HeartRate,
}

impl Metric {
    pub const ALL: [Metric; 3] = [Metric::Temperature, Metric::Oxygen, Metric::HeartRate];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Temperature => "temperature",
            Metric::Oxygen => "oxygen",
            Metric::HeartRate => "heart_rate",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            Metric::Temperature => "°C",
            Metric::Oxygen => "%",
            Metric::HeartRate => "BPM",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What was observed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Signal {
    FallDetected { confidence: f64 },
    VitalOutOfRange {
        metric: Metric,
        value: f64,
        threshold: f64,
    },
    FallFlagSet,
}

/// A danger condition ready for escalation.
///
/// Immutable once created; fields are reachable only through accessors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertCondition {
    subject_id: String,
    signal: Signal,
    observed_at: DateTime<Utc>,
}

impl AlertCondition {
    pub fn fall_detected(confidence: f64, observed_at: DateTime<Utc>) -> Self {
        Self {
            subject_id: UNKNOWN_SUBJECT.to_string(),
            signal: Signal::FallDetected { confidence },
            observed_at,
        }
    }

    pub fn vital_out_of_range(
        subject_id: impl Into<String>,
        metric: Metric,
        value: f64,
        threshold: f64,
        observed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            subject_id: subject_id.into(),
            signal: Signal::VitalOutOfRange {
                metric,
                value,
                threshold,
            },
            observed_at,
        }
    }

    pub fn fall_flag_set(subject_id: impl Into<String>, observed_at: DateTime<Utc>) -> Self {
        Self {
            subject_id: subject_id.into(),
            signal: Signal::FallFlagSet,
            observed_at,
        }
    }

    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    pub fn signal(&self) -> &Signal {
        &self.signal
    }

    pub fn observed_at(&self) -> DateTime<Utc> {
        self.observed_at
    }

    /// Identity used to rate-limit repeat escalations.
    ///
    /// Vision events share one global key; store-backed conditions are keyed
    /// per subject and condition kind.
    pub fn cooldown_key(&self) -> CooldownKey {
        match &self.signal {
            Signal::FallDetected { .. } => CooldownKey::Vision,
            Signal::VitalOutOfRange { metric, .. } => CooldownKey::Subject {
                subject_id: self.subject_id.clone(),
                kind: ConditionKind::Vital(*metric),
            },
            Signal::FallFlagSet => CooldownKey::Subject {
                subject_id: self.subject_id.clone(),
                kind: ConditionKind::FallFlag,
            },
        }
    }
}

impl fmt::Display for AlertCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.signal {
            Signal::FallDetected { confidence } => {
                write!(f, "fall detected (confidence {confidence:.2})")
            }
            Signal::VitalOutOfRange {
                metric,
                value,
                threshold,
            } => write!(
                f,
                "{metric} {value}{unit} below {threshold}{unit} for subject {subject}",
                unit = metric.unit(),
                subject = self.subject_id,
            ),
            Signal::FallFlagSet => write!(f, "fall flag set for subject {}", self.subject_id),
        }
    }
}

/// Kind half of a per-subject cooldown key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionKind {
    FallFlag,
    Vital(Metric),
}

impl fmt::Display for ConditionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionKind::FallFlag => f.write_str("fall_flag"),
            ConditionKind::Vital(metric) => f.write_str(metric.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CooldownKey {
    Vision,
    Subject {
        subject_id: String,
        kind: ConditionKind,
    },
}

impl fmt::Display for CooldownKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CooldownKey::Vision => f.write_str("vision"),
            CooldownKey::Subject { subject_id, kind } => {
                write!(f, "subject:{subject_id}:{kind}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vision_events_share_one_key() {
        let a = AlertCondition::fall_detected(0.6, Utc::now());
        let b = AlertCondition::fall_detected(0.99, Utc::now());
        assert_eq!(a.cooldown_key(), CooldownKey::Vision);
        assert_eq!(a.cooldown_key(), b.cooldown_key());
        assert_eq!(a.subject_id(), UNKNOWN_SUBJECT);
    }

    #[test]
    fn subject_keys_separate_metric_and_flag() {
        let now = Utc::now();
        let oxygen = AlertCondition::vital_out_of_range("p1", Metric::Oxygen, 90.0, 92.0, now);
        let pulse = AlertCondition::vital_out_of_range("p1", Metric::HeartRate, 45.0, 50.0, now);
        let flag = AlertCondition::fall_flag_set("p1", now);
        let other = AlertCondition::fall_flag_set("p2", now);

        assert_ne!(oxygen.cooldown_key(), pulse.cooldown_key());
        assert_ne!(flag.cooldown_key(), other.cooldown_key());
        assert_eq!(oxygen.cooldown_key().to_string(), "subject:p1:oxygen");
        assert_eq!(flag.cooldown_key().to_string(), "subject:p1:fall_flag");
    }

    #[test]
    fn display_includes_reading_and_bound() {
        let c = AlertCondition::vital_out_of_range("p7", Metric::Temperature, 35.9, 36.0, Utc::now());
        assert_eq!(c.to_string(), "temperature 35.9°C below 36°C for subject p7");
    }
}
