//! Threshold decision rule

use crate::error::ScoringError;
use crate::types::assessment::{RiskAssessment, RiskBand, RiskBandThresholds, RiskLabel};

/// Calibrated probability cut-off chosen when the model was selected
pub const DEFAULT_THRESHOLD: f64 = 0.42;

/// Map a default probability to a risk label.
///
/// Inclusive on the high side: `probability == threshold` is `AltoRisco`.
pub fn classify(probability: f64, threshold: f64) -> RiskLabel {
    if probability >= threshold {
        RiskLabel::AltoRisco
    } else {
        RiskLabel::BaixoRisco
    }
}

/// Validated decision threshold in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecisionThreshold(f64);

impl DecisionThreshold {
    pub fn new(value: f64) -> Result<Self, ScoringError> {
        if !(0.0..=1.0).contains(&value) {
            return Err(ScoringError::InvalidThreshold(value));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

impl Default for DecisionThreshold {
    fn default() -> Self {
        Self(DEFAULT_THRESHOLD)
    }
}

/// Threshold plus band bounds; turns a probability into a full assessment.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DecisionRule {
    threshold: DecisionThreshold,
    bands: RiskBandThresholds,
}

impl DecisionRule {
    pub fn new(threshold: DecisionThreshold, bands: RiskBandThresholds) -> Self {
        Self { threshold, bands }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold.value()
    }

    pub fn bands(&self) -> &RiskBandThresholds {
        &self.bands
    }

    pub fn assess(&self, probability: f64) -> RiskAssessment {
        let threshold = self.threshold.value();
        let confidence = (probability - threshold).abs();

        RiskAssessment {
            probability,
            label: classify(probability, threshold),
            threshold,
            confidence,
            confidence_level: (confidence * 2.0).min(1.0),
            risk_band: RiskBand::from_probability(probability, &self.bands),
        }
    }
}
