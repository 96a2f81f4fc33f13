//! Logistic regression model

use crate::error::ScoringError;
use crate::models::inference::sigmoid;
use serde::{Deserialize, Serialize};

/// Linear model with a logistic link, `sigmoid(intercept + w·x)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticModel {
    pub intercept: f64,
    pub coefficients: Vec<f64>,
}

impl LogisticModel {
    pub fn from_json_str(json: &str) -> Result<Self, ScoringError> {
        let model: Self = serde_json::from_str(json)
            .map_err(|e| ScoringError::model_unavailable(format!("invalid logistic model: {e}")))?;
        model.validate()?;
        Ok(model)
    }

    pub fn validate(&self) -> Result<(), ScoringError> {
        if self.coefficients.is_empty() {
            return Err(ScoringError::model_unavailable(
                "logistic model has no coefficients",
            ));
        }
        if !self.intercept.is_finite() || self.coefficients.iter().any(|c| !c.is_finite()) {
            return Err(ScoringError::model_unavailable(
                "logistic model has non-finite parameters",
            ));
        }
        Ok(())
    }

    pub fn n_features(&self) -> usize {
        self.coefficients.len()
    }

    pub fn predict(&self, features: &[f64]) -> f64 {
        let margin = self
            .coefficients
            .iter()
            .zip(features)
            .fold(self.intercept, |acc, (w, x)| acc + w * x);
        sigmoid(margin)
    }
}
