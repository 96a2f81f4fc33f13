//! Feature engineering for credit default scoring.
//!
//! Derives the engineered attributes the model was trained on from a single
//! application. Row-wise and stateless: nothing here depends on the rest of
//! the dataset, so the same function serves offline fitting and inference.

use crate::error::ScoringError;
use crate::types::applicant::RawApplicantRecord;

/// Numeric columns an `EngineeredRecord` exposes, raw ones first.
pub const NUMERIC_COLUMNS: [&str; 11] = [
    "person_age",
    "person_income",
    "person_emp_length",
    "loan_amnt",
    "loan_int_rate",
    "loan_percent_income",
    "cb_person_cred_history_length",
    "loan_to_income",
    "credit_history_to_age",
    "rate_burden",
    "prior_default",
];

/// Categorical columns an `EngineeredRecord` exposes.
pub const CATEGORICAL_COLUMNS: [&str; 6] = [
    "loan_intent",
    "loan_grade",
    "cb_person_default_on_file",
    "person_home_ownership",
    "age_band",
    "emp_length_band",
];

const LOAN_GRADES: [&str; 7] = ["A", "B", "C", "D", "E", "F", "G"];
const MIN_AGE: i64 = 20;
const MAX_AGE: i64 = 95;

/// A validated application plus its derived attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineeredRecord {
    pub person_age: i64,
    pub person_income: f64,
    pub person_emp_length: f64,
    pub loan_intent: String,
    pub loan_grade: String,
    pub loan_amnt: f64,
    pub loan_int_rate: f64,
    pub loan_percent_income: f64,
    pub cb_person_default_on_file: String,
    pub cb_person_cred_history_length: i64,
    pub person_home_ownership: Option<String>,

    // Engineered
    pub age_band: &'static str,
    pub emp_length_band: &'static str,
    pub loan_to_income: f64,
    pub credit_history_to_age: f64,
    pub rate_burden: f64,
    pub prior_default: f64,
}

impl EngineeredRecord {
    /// Look up a numeric column by name.
    pub fn numeric(&self, column: &str) -> Option<f64> {
        let value = match column {
            "person_age" => self.person_age as f64,
            "person_income" => self.person_income,
            "person_emp_length" => self.person_emp_length,
            "loan_amnt" => self.loan_amnt,
            "loan_int_rate" => self.loan_int_rate,
            "loan_percent_income" => self.loan_percent_income,
            "cb_person_cred_history_length" => self.cb_person_cred_history_length as f64,
            "loan_to_income" => self.loan_to_income,
            "credit_history_to_age" => self.credit_history_to_age,
            "rate_burden" => self.rate_burden,
            "prior_default" => self.prior_default,
            _ => return None,
        };
        Some(value)
    }

    /// Look up a categorical column by name.
    ///
    /// `None` means either an unknown column or an optional raw column the
    /// caller did not send.
    pub fn categorical(&self, column: &str) -> Option<&str> {
        match column {
            "loan_intent" => Some(&self.loan_intent),
            "loan_grade" => Some(&self.loan_grade),
            "cb_person_default_on_file" => Some(&self.cb_person_default_on_file),
            "person_home_ownership" => self.person_home_ownership.as_deref(),
            "age_band" => Some(self.age_band),
            "emp_length_band" => Some(self.emp_length_band),
            _ => None,
        }
    }
}

/// Stateless transform from raw applications to engineered records.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureEngineer;

impl FeatureEngineer {
    pub fn new() -> Self {
        Self
    }

    /// Validate a raw record and compute the engineered attributes.
    pub fn engineer(&self, raw: &RawApplicantRecord) -> Result<EngineeredRecord, ScoringError> {
        let person_age = required(raw.person_age, "person_age")?;
        if !(MIN_AGE..=MAX_AGE).contains(&person_age) {
            return Err(ScoringError::schema(
                "person_age",
                format!("must be within {MIN_AGE}-{MAX_AGE}, got {person_age}"),
            ));
        }

        let person_income = non_negative(raw.person_income, "person_income")?;
        let person_emp_length = non_negative(raw.person_emp_length, "person_emp_length")?;
        let loan_int_rate = non_negative(raw.loan_int_rate, "loan_int_rate")?;
        let loan_percent_income = non_negative(raw.loan_percent_income, "loan_percent_income")?;

        let loan_amnt = finite(raw.loan_amnt, "loan_amnt")?;
        if loan_amnt <= 0.0 {
            return Err(ScoringError::schema(
                "loan_amnt",
                format!("must be positive, got {loan_amnt}"),
            ));
        }

        let cb_person_cred_history_length = required(
            raw.cb_person_cred_history_length,
            "cb_person_cred_history_length",
        )?;
        if cb_person_cred_history_length < 0 {
            return Err(ScoringError::schema(
                "cb_person_cred_history_length",
                format!("must be non-negative, got {cb_person_cred_history_length}"),
            ));
        }

        let loan_intent = non_empty(raw.loan_intent.as_deref(), "loan_intent")?;

        let loan_grade = non_empty(raw.loan_grade.as_deref(), "loan_grade")?;
        if !LOAN_GRADES.contains(&loan_grade.as_str()) {
            return Err(ScoringError::schema(
                "loan_grade",
                format!("must be one of A-G, got {loan_grade:?}"),
            ));
        }

        let default_on_file = non_empty(
            raw.cb_person_default_on_file.as_deref(),
            "cb_person_default_on_file",
        )?;
        let prior_default = match default_on_file.as_str() {
            "Y" => 1.0,
            "N" => 0.0,
            other => {
                return Err(ScoringError::schema(
                    "cb_person_default_on_file",
                    format!("must be \"Y\" or \"N\", got {other:?}"),
                ))
            }
        };

        let person_home_ownership = match raw.person_home_ownership.as_deref() {
            Some(value) => Some(non_empty(Some(value), "person_home_ownership")?),
            None => None,
        };

        Ok(EngineeredRecord {
            age_band: age_band(person_age),
            emp_length_band: emp_length_band(person_emp_length),
            loan_to_income: loan_amnt / (person_income + 1.0),
            credit_history_to_age: cb_person_cred_history_length as f64 / person_age as f64,
            rate_burden: loan_int_rate * loan_percent_income,
            prior_default,
            person_age,
            person_income,
            person_emp_length,
            loan_intent,
            loan_grade,
            loan_amnt,
            loan_int_rate,
            loan_percent_income,
            cb_person_default_on_file: default_on_file,
            cb_person_cred_history_length,
            person_home_ownership,
        })
    }

    /// Names of the numeric columns produced (raw then engineered).
    pub fn numeric_columns(&self) -> &'static [&'static str] {
        &NUMERIC_COLUMNS
    }

    /// Names of the categorical columns produced.
    pub fn categorical_columns(&self) -> &'static [&'static str] {
        &CATEGORICAL_COLUMNS
    }
}

/// Age band ("faixa etaria") used during training
pub fn age_band(age: i64) -> &'static str {
    match age {
        i64::MIN..=29 => "20-29",
        30..=39 => "30-39",
        40..=49 => "40-49",
        50..=59 => "50-59",
        60..=69 => "60-69",
        _ => "70+",
    }
}

/// Employment length band, lower bounds inclusive
pub fn emp_length_band(years: f64) -> &'static str {
    if years < 1.0 {
        "<1"
    } else if years < 4.0 {
        "1-3"
    } else if years < 7.0 {
        "4-6"
    } else if years < 10.0 {
        "7-9"
    } else {
        "10+"
    }
}

fn required<T>(value: Option<T>, field: &str) -> Result<T, ScoringError> {
    value.ok_or_else(|| ScoringError::missing(field))
}

fn finite(value: Option<f64>, field: &str) -> Result<f64, ScoringError> {
    let value = required(value, field)?;
    if !value.is_finite() {
        return Err(ScoringError::schema(field, "must be a finite number"));
    }
    Ok(value)
}

fn non_negative(value: Option<f64>, field: &str) -> Result<f64, ScoringError> {
    let value = finite(value, field)?;
    if value < 0.0 {
        return Err(ScoringError::schema(
            field,
            format!("must be non-negative, got {value}"),
        ));
    }
    Ok(value)
}

fn non_empty(value: Option<&str>, field: &str) -> Result<String, ScoringError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.to_string()),
        Some(_) => Err(ScoringError::schema(field, "must not be empty")),
        None => Err(ScoringError::missing(field)),
    }
}
