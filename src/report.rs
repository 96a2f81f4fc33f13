//! Per-record output rows of a batch scoring run

use crate::error::ScoringError;
use crate::types::assessment::RiskAssessment;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One output line: either an assessment or the error that prevented it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredRecord {
    /// Position in the input batch
    pub index: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applicant_id: Option<String>,

    #[serde(flatten)]
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Outcome {
    Scored {
        assessment_id: String,
        scored_at: DateTime<Utc>,
        model_version: u32,
        #[serde(flatten)]
        assessment: RiskAssessment,
    },
    Failed {
        error: ErrorReport,
    },
}

/// Serializable form of a `ScoringError`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub kind: String,
    pub message: String,
}

impl From<&ScoringError> for ErrorReport {
    fn from(error: &ScoringError) -> Self {
        Self {
            kind: error.kind().to_string(),
            message: error.to_string(),
        }
    }
}

impl ScoredRecord {
    pub fn scored(
        index: usize,
        applicant_id: Option<String>,
        model_version: u32,
        assessment: RiskAssessment,
    ) -> Self {
        Self {
            index,
            applicant_id,
            outcome: Outcome::Scored {
                assessment_id: uuid::Uuid::new_v4().to_string(),
                scored_at: Utc::now(),
                model_version,
                assessment,
            },
        }
    }

    pub fn failed(index: usize, applicant_id: Option<String>, error: &ScoringError) -> Self {
        Self {
            index,
            applicant_id,
            outcome: Outcome::Failed {
                error: error.into(),
            },
        }
    }

    pub fn is_scored(&self) -> bool {
        matches!(self.outcome, Outcome::Scored { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::DecisionRule;

    #[test]
    fn test_scored_row_shape() {
        let row = ScoredRecord::scored(
            0,
            Some("app_1".to_string()),
            4,
            DecisionRule::default().assess(0.5),
        );
        let json: serde_json::Value = serde_json::to_value(&row).unwrap();

        assert_eq!(json["index"], 0);
        assert_eq!(json["applicant_id"], "app_1");
        assert_eq!(json["label"], "ALTO_RISCO");
        assert_eq!(json["probability"], 0.5);
        assert_eq!(json["model_version"], 4);
        assert!(json["assessment_id"].is_string());
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_failed_row_shape() {
        let row = ScoredRecord::failed(2, None, &ScoringError::missing("loan_grade"));
        let json: serde_json::Value = serde_json::to_value(&row).unwrap();

        assert_eq!(json["index"], 2);
        assert_eq!(json["error"]["kind"], "schema_error");
        assert!(json.get("applicant_id").is_none());
        assert!(json.get("label").is_none());
        assert!(!row.is_scored());
    }

    #[test]
    fn test_rows_deserialize() {
        let row = ScoredRecord::failed(1, None, &ScoringError::missing("loan_grade"));
        let json = serde_json::to_string(&row).unwrap();
        let back: ScoredRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.index, 1);
        assert!(!back.is_scored());
    }
}
