//! Risk Engine
//!
//! Pure scoring of one packet against its flow history. Three independent
//! buckets collect evidence:
//!
//! - **primary**: what the packet is (service port, query type, cipher offer)
//! - **secondary**: anomalies in how it is shaped
//! - **correlation**: what the flow has been doing over time
//!
//! Heuristics only ever raise a bucket. The [`pipeline`] then folds the
//! buckets into a calibrated score, label and confidence.

pub mod heuristics;
pub mod pipeline;

pub use heuristics::assess;
pub use pipeline::{evaluate, RiskVerdict};

use serde::Serialize;

/// Calibrated score at or above which a packet is High
pub const HIGH_RISK_THRESHOLD: f64 = 0.82;

/// Calibrated score at or above which a packet is Medium
pub const MEDIUM_RISK_THRESHOLD: f64 = 0.45;

/// Floor forced by confirmed high-risk evidence
pub const ABSOLUTE_HIGH_SCORE: f64 = 0.98;

const INITIAL_PRIMARY: f64 = 0.08;
const INITIAL_SECONDARY: f64 = 0.05;

/// Risk label
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum RiskLabel {
    Low,
    Medium,
    High,
}

impl RiskLabel {
    /// Label for a calibrated score
    pub fn from_score(score: f64, high_risk_confirmed: bool) -> Self {
        if score >= HIGH_RISK_THRESHOLD || high_risk_confirmed {
            Self::High
        } else if score >= MEDIUM_RISK_THRESHOLD {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        }
    }
}

impl std::fmt::Display for RiskLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Evidence bucket
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Bucket {
    Primary,
    Secondary,
    Correlation,
}

/// Per-bucket scores and the reason behind each
#[derive(Clone, Debug, PartialEq)]
pub struct RiskAssessment {
    pub primary_score: f64,
    pub secondary_score: f64,
    pub correlation_score: f64,
    pub primary_reason: Option<&'static str>,
    pub secondary_reason: Option<&'static str>,
    pub correlation_reason: Option<&'static str>,
    /// Evidence strong enough to force High on its own
    pub high_risk_confirmed: bool,
    /// The final guard had to repair the label
    pub possible_false_negative: bool,
}

impl Default for RiskAssessment {
    fn default() -> Self {
        Self {
            primary_score: INITIAL_PRIMARY,
            secondary_score: INITIAL_SECONDARY,
            correlation_score: 0.0,
            primary_reason: None,
            secondary_reason: None,
            correlation_reason: None,
            high_risk_confirmed: false,
            possible_false_negative: false,
        }
    }
}

impl RiskAssessment {
    /// Raise `bucket` to at least `floor`. `reason` becomes the explanation
    /// unless the bucket already holds stronger evidence.
    pub fn raise(&mut self, bucket: Bucket, floor: f64, reason: &'static str) {
        let (score, slot) = self.slot_mut(bucket);
        if floor >= *score {
            *score = floor;
            *slot = Some(reason);
        }
    }

    /// Raise `bucket` to at least `floor`; `reason` only fills an empty slot
    pub fn raise_if_unexplained(&mut self, bucket: Bucket, floor: f64, reason: &'static str) {
        let (score, slot) = self.slot_mut(bucket);
        *score = score.max(floor);
        slot.get_or_insert(reason);
    }

    pub fn confirm(&mut self) {
        self.high_risk_confirmed = true;
    }

    pub fn score(&self, bucket: Bucket) -> f64 {
        match bucket {
            Bucket::Primary => self.primary_score,
            Bucket::Secondary => self.secondary_score,
            Bucket::Correlation => self.correlation_score,
        }
    }

    /// Highest bucket score
    pub fn max_score(&self) -> f64 {
        self.primary_score
            .max(self.secondary_score)
            .max(self.correlation_score)
    }

    fn slot_mut(&mut self, bucket: Bucket) -> (&mut f64, &mut Option<&'static str>) {
        match bucket {
            Bucket::Primary => (&mut self.primary_score, &mut self.primary_reason),
            Bucket::Secondary => (&mut self.secondary_score, &mut self.secondary_reason),
            Bucket::Correlation => (&mut self.correlation_score, &mut self.correlation_reason),
        }
    }
}
