//! Loan application data structures

use crate::error::ScoringError;
use serde::{Deserialize, Serialize};

/// One loan application as received from the caller.
///
/// Fields are kept exactly as submitted: a missing column stays `None` so the
/// feature engineering step can report it instead of a default creeping in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawApplicantRecord {
    /// Caller-supplied identifier, echoed back in reports
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applicant_id: Option<String>,

    /// Age in years (20-95)
    #[serde(default)]
    pub person_age: Option<i64>,

    /// Annual income
    #[serde(default)]
    pub person_income: Option<f64>,

    /// Housing situation (RENT, OWN, MORTGAGE, OTHER)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub person_home_ownership: Option<String>,

    /// Employment length in years
    #[serde(default)]
    pub person_emp_length: Option<f64>,

    /// Purpose of the loan (PERSONAL, EDUCATION, MEDICAL, VENTURE, ...)
    #[serde(default)]
    pub loan_intent: Option<String>,

    /// Loan grade, A (best) to G
    #[serde(default)]
    pub loan_grade: Option<String>,

    /// Requested amount
    #[serde(default)]
    pub loan_amnt: Option<f64>,

    /// Interest rate in percent
    #[serde(default)]
    pub loan_int_rate: Option<f64>,

    /// Loan amount as a fraction of income
    #[serde(default)]
    pub loan_percent_income: Option<f64>,

    /// Historical default on file ("Y" or "N")
    #[serde(default)]
    pub cb_person_default_on_file: Option<String>,

    /// Credit history length in years
    #[serde(default, alias = "cb_person_cred_hist_length")]
    pub cb_person_cred_history_length: Option<i64>,
}

impl RawApplicantRecord {
    /// Build a record from a decoded JSON value.
    ///
    /// Type errors (a string where a number is expected, a non-object row)
    /// surface as `ScoringError::Schema`.
    pub fn from_json_value(value: serde_json::Value) -> Result<Self, ScoringError> {
        let serde_json::Value::Object(fields) = &value else {
            return Err(ScoringError::schema("<record>", "must be a JSON object"));
        };
        Self::deserialize(&value).map_err(|e| {
            let field = offending_field(fields).unwrap_or("<record>");
            ScoringError::schema(field, e.to_string())
        })
    }

    /// Parse a record from a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ScoringError> {
        let value: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| ScoringError::schema("<record>", format!("invalid JSON: {e}")))?;
        Self::from_json_value(value)
    }
}

/// First key whose value alone fails to deserialize, as written in the input
fn offending_field(fields: &serde_json::Map<String, serde_json::Value>) -> Option<&str> {
    fields
        .iter()
        .find(|(key, value)| {
            let mut single = serde_json::Map::new();
            single.insert((*key).clone(), (*value).clone());
            RawApplicantRecord::deserialize(&serde_json::Value::Object(single)).is_err()
        })
        .map(|(key, _)| key.as_str())
}
