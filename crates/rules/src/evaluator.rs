//! Condition evaluator: raw adapter output → danger conditions.
//!
//! Pure threshold checks with no I/O and no shared state. The fall path has
//! no hysteresis; every qualifying frame raises a condition and repetition is
//! left to the coordinator's cooldown.

use vigil_core::{AlertCondition, FallEvent, Metric, Thresholds, VitalSnapshot};

/// Outcome of checking one subject's snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VitalEvaluation {
    /// Conditions to escalate.
    pub conditions: Vec<AlertCondition>,
    /// Metric breaches short-circuited by the fall flag. Reported for logging,
    /// never escalated.
    pub shadowed: Vec<AlertCondition>,
}

impl VitalEvaluation {
    /// No breach of any kind.
    pub fn is_normal(&self) -> bool {
        self.conditions.is_empty() && self.shadowed.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConditionEvaluator {
    thresholds: Thresholds,
}

impl ConditionEvaluator {
    pub fn new(thresholds: Thresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// A detection is dangerous iff its confidence strictly exceeds the bound.
    pub fn evaluate_fall(&self, event: &FallEvent) -> Option<AlertCondition> {
        (event.confidence > self.thresholds.fall_confidence)
            .then(|| AlertCondition::fall_detected(event.confidence, event.timestamp))
    }

    /// One condition per breached metric; a set fall flag wins over all of them.
    pub fn evaluate_vitals(&self, snapshot: &VitalSnapshot) -> VitalEvaluation {
        let breaches = self.metric_breaches(snapshot);

        if snapshot.fallen {
            VitalEvaluation {
                conditions: vec![AlertCondition::fall_flag_set(
                    snapshot.subject_id.clone(),
                    snapshot.taken_at,
                )],
                shadowed: breaches,
            }
        } else {
            VitalEvaluation {
                conditions: breaches,
                shadowed: Vec::new(),
            }
        }
    }

    fn metric_breaches(&self, snapshot: &VitalSnapshot) -> Vec<AlertCondition> {
        Metric::ALL
            .iter()
            .filter_map(|&metric| {
                let value = snapshot.reading(metric)?;
                let bound = self.lower_bound(metric);
                (value < bound).then(|| {
                    AlertCondition::vital_out_of_range(
                        snapshot.subject_id.clone(),
                        metric,
                        value,
                        bound,
                        snapshot.taken_at,
                    )
                })
            })
            .collect()
    }

    fn lower_bound(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Temperature => self.thresholds.min_temperature,
            Metric::Oxygen => self.thresholds.min_oxygen,
            Metric::HeartRate => self.thresholds.min_heart_rate,
        }
    }
}
