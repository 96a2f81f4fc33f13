//! Preprocessing of engineered records into model input vectors.
//!
//! The fitted encoders and scalers are computed once offline, persisted as
//! JSON and loaded read-only at serving time. Output columns follow the
//! column-transformer naming used during training: `num__<column>` for scaled
//! numerics followed by `cat__<column>_<category>` one-hot indicators, after
//! which the persisted feature selection picks the model's input columns.

use crate::error::ScoringError;
use crate::feature_engineering::{EngineeredRecord, CATEGORICAL_COLUMNS, NUMERIC_COLUMNS};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// What to do with a categorical value missing from the fitted vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnseenCategoryPolicy {
    /// Fail the record with `UnknownCategory`
    #[default]
    Reject,
    /// Encode as the column's designated fallback category
    Fallback,
}

/// Result of looking a value up in a fitted vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryEncoding {
    Known(usize),
    Unseen(UnseenCategoryPolicy),
}

/// Standard scaler parameters for one numeric column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericScaler {
    pub column: String,
    pub mean: f64,
    pub scale: f64,
}

impl NumericScaler {
    pub fn apply(&self, value: f64) -> f64 {
        (value - self.mean) / self.scale
    }
}

/// One-hot vocabulary for one categorical column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryVocabulary {
    pub column: String,
    pub categories: Vec<String>,
    /// Bucket used for unseen values under `UnseenCategoryPolicy::Fallback`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<String>,
}

impl CategoryVocabulary {
    pub fn encode(&self, value: &str, policy: UnseenCategoryPolicy) -> CategoryEncoding {
        match self.categories.iter().position(|c| c == value) {
            Some(index) => CategoryEncoding::Known(index),
            None => CategoryEncoding::Unseen(policy),
        }
    }

    pub fn fallback_index(&self) -> Option<usize> {
        let fallback = self.fallback.as_deref()?;
        self.categories.iter().position(|c| c == fallback)
    }

    fn feature_names(&self) -> impl Iterator<Item = String> + '_ {
        self.categories
            .iter()
            .map(move |category| format!("cat__{}_{}", self.column, category))
    }
}

/// On-disk layout of the fitted transform state.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TransformStateFile {
    #[serde(default)]
    numeric: Vec<NumericScaler>,
    #[serde(default)]
    categorical: Vec<CategoryVocabulary>,
    selected_features: Vec<String>,
}

/// Learned encoder/scaler parameters plus the selected output columns.
///
/// Validated on construction and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TransformStateFile", into = "TransformStateFile")]
pub struct FittedTransformState {
    numeric: Vec<NumericScaler>,
    categorical: Vec<CategoryVocabulary>,
    selected_features: Arc<[String]>,
    /// Index of each selected feature within the full output
    selection: Vec<usize>,
    full_width: usize,
}

impl FittedTransformState {
    pub fn new(
        numeric: Vec<NumericScaler>,
        categorical: Vec<CategoryVocabulary>,
        selected_features: Vec<String>,
    ) -> Result<Self, ScoringError> {
        if numeric.is_empty() && categorical.is_empty() {
            return Err(ScoringError::transform_state(
                "state encodes no columns",
            ));
        }

        let mut seen_columns = HashSet::new();
        for scaler in &numeric {
            if !NUMERIC_COLUMNS.contains(&scaler.column.as_str()) {
                return Err(ScoringError::transform_state(format!(
                    "unknown numeric column `{}`",
                    scaler.column
                )));
            }
            if !seen_columns.insert(scaler.column.as_str()) {
                return Err(ScoringError::transform_state(format!(
                    "column `{}` appears twice",
                    scaler.column
                )));
            }
            if !scaler.mean.is_finite() || !scaler.scale.is_finite() || scaler.scale <= 0.0 {
                return Err(ScoringError::transform_state(format!(
                    "invalid scaler for `{}`: mean={} scale={}",
                    scaler.column, scaler.mean, scaler.scale
                )));
            }
        }

        for vocab in &categorical {
            if !CATEGORICAL_COLUMNS.contains(&vocab.column.as_str()) {
                return Err(ScoringError::transform_state(format!(
                    "unknown categorical column `{}`",
                    vocab.column
                )));
            }
            if !seen_columns.insert(vocab.column.as_str()) {
                return Err(ScoringError::transform_state(format!(
                    "column `{}` appears twice",
                    vocab.column
                )));
            }
            if vocab.categories.is_empty() {
                return Err(ScoringError::transform_state(format!(
                    "empty vocabulary for `{}`",
                    vocab.column
                )));
            }
            let unique: HashSet<&str> = vocab.categories.iter().map(String::as_str).collect();
            if unique.len() != vocab.categories.len() {
                return Err(ScoringError::transform_state(format!(
                    "duplicate categories for `{}`",
                    vocab.column
                )));
            }
            if vocab.fallback.is_some() && vocab.fallback_index().is_none() {
                return Err(ScoringError::transform_state(format!(
                    "fallback category for `{}` is not part of its vocabulary",
                    vocab.column
                )));
            }
        }

        let full_names = full_feature_names(&numeric, &categorical);
        let positions: HashMap<&str, usize> = full_names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.as_str(), i))
            .collect();

        if selected_features.is_empty() {
            return Err(ScoringError::transform_state("no selected features"));
        }
        let mut selection = Vec::with_capacity(selected_features.len());
        let mut seen_features = HashSet::new();
        for name in &selected_features {
            if !seen_features.insert(name.as_str()) {
                return Err(ScoringError::transform_state(format!(
                    "feature `{name}` selected twice"
                )));
            }
            let index = positions.get(name.as_str()).ok_or_else(|| {
                ScoringError::transform_state(format!(
                    "selected feature `{name}` is not produced by the encoders"
                ))
            })?;
            selection.push(*index);
        }

        Ok(Self {
            full_width: full_names.len(),
            numeric,
            categorical,
            selected_features: selected_features.into(),
            selection,
        })
    }

    /// Load the persisted state from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ScoringError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            ScoringError::transform_state(format!("cannot read {}: {e}", path.display()))
        })?;
        let state = Self::from_json_str(&json)?;

        info!(
            path = %path.display(),
            numeric = state.numeric.len(),
            categorical = state.categorical.len(),
            selected = state.selected_features.len(),
            "Transform state loaded"
        );

        Ok(state)
    }

    pub fn from_json_str(json: &str) -> Result<Self, ScoringError> {
        serde_json::from_str(json).map_err(|e| ScoringError::transform_state(e.to_string()))
    }

    pub fn to_json_pretty(&self) -> Result<String, ScoringError> {
        serde_json::to_string_pretty(self).map_err(|e| ScoringError::transform_state(e.to_string()))
    }

    /// Fit scalers and vocabularies on training records, selecting every
    /// produced column. Offline only; the serving path never calls this.
    pub fn fit(
        records: &[EngineeredRecord],
        numeric_columns: &[&str],
        categorical_columns: &[&str],
    ) -> Result<Self, ScoringError> {
        if records.is_empty() {
            return Err(ScoringError::transform_state(
                "cannot fit on an empty dataset",
            ));
        }
        let n = records.len() as f64;

        let mut numeric = Vec::with_capacity(numeric_columns.len());
        for &column in numeric_columns {
            let values = records
                .iter()
                .map(|r| {
                    r.numeric(column).ok_or_else(|| {
                        ScoringError::transform_state(format!("unknown numeric column `{column}`"))
                    })
                })
                .collect::<Result<Vec<f64>, _>>()?;

            let mean = values.iter().sum::<f64>() / n;
            let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            let std_dev = variance.sqrt();

            numeric.push(NumericScaler {
                column: column.to_string(),
                mean,
                scale: if std_dev > 0.0 { std_dev } else { 1.0 },
            });
        }

        let mut categorical = Vec::with_capacity(categorical_columns.len());
        for &column in categorical_columns {
            let mut categories = BTreeSet::new();
            for record in records {
                let value = record
                    .categorical(column)
                    .ok_or_else(|| ScoringError::missing(column))?;
                categories.insert(value.to_string());
            }
            categorical.push(CategoryVocabulary {
                column: column.to_string(),
                categories: categories.into_iter().collect(),
                fallback: None,
            });
        }

        let selected = full_feature_names(&numeric, &categorical);
        Self::new(numeric, categorical, selected)
    }

    /// Restrict the output to `features`, in the given order.
    pub fn with_selected_features(self, features: Vec<String>) -> Result<Self, ScoringError> {
        Self::new(self.numeric, self.categorical, features)
    }

    /// Designate the fallback bucket of a categorical column.
    pub fn with_fallback(mut self, column: &str, category: &str) -> Result<Self, ScoringError> {
        let vocab = self
            .categorical
            .iter_mut()
            .find(|v| v.column == column)
            .ok_or_else(|| {
                ScoringError::transform_state(format!("column `{column}` is not encoded"))
            })?;
        vocab.fallback = Some(category.to_string());
        let selected = self.selected_features.to_vec();
        Self::new(self.numeric, self.categorical, selected)
    }

    pub fn numeric_scalers(&self) -> &[NumericScaler] {
        &self.numeric
    }

    pub fn vocabularies(&self) -> &[CategoryVocabulary] {
        &self.categorical
    }

    /// Every column the encoders produce, before selection
    pub fn full_feature_names(&self) -> Vec<String> {
        full_feature_names(&self.numeric, &self.categorical)
    }

    /// Model input columns, in order
    pub fn selected_features(&self) -> &[String] {
        &self.selected_features
    }

    pub fn width(&self) -> usize {
        self.selection.len()
    }
}

impl TryFrom<TransformStateFile> for FittedTransformState {
    type Error = ScoringError;

    fn try_from(file: TransformStateFile) -> Result<Self, Self::Error> {
        Self::new(file.numeric, file.categorical, file.selected_features)
    }
}

impl From<FittedTransformState> for TransformStateFile {
    fn from(state: FittedTransformState) -> Self {
        Self {
            numeric: state.numeric,
            categorical: state.categorical,
            selected_features: state.selected_features.to_vec(),
        }
    }
}

fn full_feature_names(numeric: &[NumericScaler], categorical: &[CategoryVocabulary]) -> Vec<String> {
    numeric
        .iter()
        .map(|s| format!("num__{}", s.column))
        .chain(categorical.iter().flat_map(CategoryVocabulary::feature_names))
        .collect()
}

/// Fixed-width model input, tagged with the column schema it was built under.
#[derive(Debug, Clone, PartialEq)]
pub struct NumericFeatureVector {
    values: Vec<f64>,
    columns: Arc<[String]>,
}

impl NumericFeatureVector {
    pub fn new(values: Vec<f64>, columns: Arc<[String]>) -> Self {
        Self { values, columns }
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn to_f32(&self) -> Vec<f32> {
        self.values.iter().map(|&v| v as f32).collect()
    }
}

/// Applies a fitted transform state under a fixed unseen-category policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct Preprocessor {
    policy: UnseenCategoryPolicy,
}

impl Preprocessor {
    pub fn new(policy: UnseenCategoryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> UnseenCategoryPolicy {
        self.policy
    }

    /// Verify that `state` can be used under this policy.
    pub fn check(&self, state: &FittedTransformState) -> Result<(), ScoringError> {
        if self.policy == UnseenCategoryPolicy::Fallback {
            if let Some(vocab) = state
                .categorical
                .iter()
                .find(|v| v.fallback_index().is_none())
            {
                return Err(ScoringError::transform_state(format!(
                    "fallback policy configured but `{}` has no fallback category",
                    vocab.column
                )));
            }
        }
        Ok(())
    }

    /// Encode, scale and select features for one record.
    pub fn transform(
        &self,
        record: &EngineeredRecord,
        state: &FittedTransformState,
    ) -> Result<NumericFeatureVector, ScoringError> {
        let mut full = Vec::with_capacity(state.full_width);

        for scaler in &state.numeric {
            let value = record
                .numeric(&scaler.column)
                .ok_or_else(|| ScoringError::missing(scaler.column.as_str()))?;
            full.push(scaler.apply(value));
        }

        for vocab in &state.categorical {
            let value = record
                .categorical(&vocab.column)
                .ok_or_else(|| ScoringError::missing(vocab.column.as_str()))?;

            let hot = match vocab.encode(value, self.policy) {
                CategoryEncoding::Known(index) => index,
                CategoryEncoding::Unseen(policy) => match (policy, vocab.fallback_index()) {
                    (UnseenCategoryPolicy::Fallback, Some(index)) => index,
                    _ => {
                        return Err(ScoringError::UnknownCategory {
                            column: vocab.column.clone(),
                            value: value.to_string(),
                        })
                    }
                },
            };

            full.extend((0..vocab.categories.len()).map(|i| if i == hot { 1.0 } else { 0.0 }));
        }

        let values = state.selection.iter().map(|&i| full[i]).collect();
        Ok(NumericFeatureVector::new(
            values,
            Arc::clone(&state.selected_features),
        ))
    }
}
