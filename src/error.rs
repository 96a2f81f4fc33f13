//! Error types for the scoring pipeline.

use thiserror::Error;

/// Errors raised while turning an applicant record into a risk assessment.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ScoringError {
    /// A required input field is missing, of the wrong type or outside its domain
    #[error("schema error: field `{field}` {reason}")]
    Schema { field: String, reason: String },

    /// A categorical value was not seen when the encoders were fitted
    #[error("unknown category `{value}` for column `{column}`")]
    UnknownCategory { column: String, value: String },

    /// The model artifact could not be resolved or loaded
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    /// The fitted encoders/scalers could not be loaded or are inconsistent
    #[error("transform state unavailable: {0}")]
    TransformStateUnavailable(String),

    /// Feature vector shape or column order disagrees with the model input
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// The model ran but produced no usable probability
    #[error("inference failed: {0}")]
    Inference(String),

    #[error("invalid threshold {0}: must be within [0, 1]")]
    InvalidThreshold(f64),
}

impl ScoringError {
    pub fn schema(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Schema {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn missing(field: impl Into<String>) -> Self {
        Self::schema(field, "is required but missing")
    }

    pub fn model_unavailable(msg: impl Into<String>) -> Self {
        Self::ModelUnavailable(msg.into())
    }

    pub fn transform_state(msg: impl Into<String>) -> Self {
        Self::TransformStateUnavailable(msg.into())
    }

    pub fn dimension_mismatch(msg: impl Into<String>) -> Self {
        Self::DimensionMismatch(msg.into())
    }

    pub fn inference(msg: impl Into<String>) -> Self {
        Self::Inference(msg.into())
    }

    /// Stable identifier used in batch reports and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Schema { .. } => "schema_error",
            Self::UnknownCategory { .. } => "unknown_category",
            Self::ModelUnavailable(_) => "model_unavailable",
            Self::TransformStateUnavailable(_) => "transform_state_unavailable",
            Self::DimensionMismatch(_) => "dimension_mismatch",
            Self::Inference(_) => "inference_error",
            Self::InvalidThreshold(_) => "invalid_threshold",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ScoringError::missing("loan_amnt");
        assert_eq!(
            err.to_string(),
            "schema error: field `loan_amnt` is required but missing"
        );

        let err = ScoringError::UnknownCategory {
            column: "loan_intent".to_string(),
            value: "UNKNOWN_TEST".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "unknown category `UNKNOWN_TEST` for column `loan_intent`"
        );
    }

    #[test]
    fn test_error_kind() {
        assert_eq!(ScoringError::missing("x").kind(), "schema_error");
        assert_eq!(
            ScoringError::model_unavailable("gone").kind(),
            "model_unavailable"
        );
        assert_eq!(ScoringError::InvalidThreshold(1.5).kind(), "invalid_threshold");
    }
}
