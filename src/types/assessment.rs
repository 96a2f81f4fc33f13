//! Risk assessment data structures

use serde::{Deserialize, Serialize};
use std::fmt;

/// Binary risk tier produced by the decision rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLabel {
    AltoRisco,
    BaixoRisco,
}

impl RiskLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLabel::AltoRisco => "ALTO_RISCO",
            RiskLabel::BaixoRisco => "BAIXO_RISCO",
        }
    }
}

impl fmt::Display for RiskLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Three-level probability band shown next to the binary label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskBand {
    Baixo,
    Medio,
    Alto,
}

impl RiskBand {
    /// Determine the band from a default probability; upper bounds are inclusive
    pub fn from_probability(probability: f64, bands: &RiskBandThresholds) -> Self {
        if probability <= bands.low_max {
            RiskBand::Baixo
        } else if probability <= bands.medium_max {
            RiskBand::Medio
        } else {
            RiskBand::Alto
        }
    }
}

/// Configurable risk band upper bounds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskBandThresholds {
    pub low_max: f64,
    pub medium_max: f64,
}

impl Default for RiskBandThresholds {
    fn default() -> Self {
        Self {
            low_max: 0.30,
            medium_max: 0.60,
        }
    }
}

/// Outcome of scoring one applicant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// Probability of default (0.0 - 1.0)
    pub probability: f64,

    /// Decision rule output
    pub label: RiskLabel,

    /// Threshold the label was derived with
    pub threshold: f64,

    /// Distance between probability and threshold
    pub confidence: f64,

    /// Confidence normalised to 0.0 - 1.0
    pub confidence_level: f64,

    /// Probability band
    pub risk_band: RiskBand,
}
