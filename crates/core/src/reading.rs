//! Raw adapter output: fall detections and vital-sign snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::condition::Metric;

/// One processed camera frame that contained a fall detection box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FallEvent {
    /// Detector confidence in `[0, 1]`.
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
}

impl FallEvent {
    pub fn new(confidence: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            confidence,
            timestamp,
        }
    }
}

/// Latest vital-sign readings for a single subject.
///
/// Produced wholesale by each poll; a newer snapshot for the same subject
/// supersedes the previous one. Absent readings are unknown, never danger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VitalSnapshot {
    pub subject_id: String,
    /// Body temperature in °C.
    pub temperature: Option<f64>,
    /// Blood oxygen saturation in %.
    pub oxygen: Option<f64>,
    /// Heart rate in BPM.
    pub heart_rate: Option<f64>,
    /// Fall flag set externally on the subject's record.
    pub fallen: bool,
    pub taken_at: DateTime<Utc>,
}

impl VitalSnapshot {
    pub fn new(subject_id: impl Into<String>, taken_at: DateTime<Utc>) -> Self {
        Self {
            subject_id: subject_id.into(),
            temperature: None,
            oxygen: None,
            heart_rate: None,
            fallen: false,
            taken_at,
        }
    }

    pub fn with_temperature(mut self, celsius: f64) -> Self {
        self.temperature = Some(celsius);
        self
    }

    pub fn with_oxygen(mut self, percent: f64) -> Self {
        self.oxygen = Some(percent);
        self
    }

    pub fn with_heart_rate(mut self, bpm: f64) -> Self {
        self.heart_rate = Some(bpm);
        self
    }

    pub fn with_fallen(mut self, fallen: bool) -> Self {
        self.fallen = fallen;
        self
    }

    /// Reading for `metric`, if present and finite.
    pub fn reading(&self, metric: Metric) -> Option<f64> {
        let value = match metric {
            Metric::Temperature => self.temperature,
            Metric::Oxygen => self.oxygen,
            Metric::HeartRate => self.heart_rate,
        };
        value.filter(|v| v.is_finite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_finite_readings_are_unknown() {
        let snapshot = VitalSnapshot::new("p1", Utc::now())
            .with_temperature(f64::NAN)
            .with_oxygen(97.0);

        assert_eq!(snapshot.reading(Metric::Temperature), None);
        assert_eq!(snapshot.reading(Metric::Oxygen), Some(97.0));
        assert_eq!(snapshot.reading(Metric::HeartRate), None);
    }
}
