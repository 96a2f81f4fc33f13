//! Model inference for default probability

use crate::error::ScoringError;
use crate::models::gbdt::TreeEnsemble;
use crate::models::linear::LogisticModel;
#[cfg(feature = "onnx")]
use crate::models::onnx::OnnxModel;
use crate::preprocessing::NumericFeatureVector;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub(crate) fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Serialization format of a registered model artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFlavor {
    Logistic,
    Gbdt,
    Onnx,
}

/// Executable model behind a `TrainedModel`
#[derive(Debug)]
pub enum ModelBackend {
    Logistic(LogisticModel),
    Gbdt(TreeEnsemble),
    #[cfg(feature = "onnx")]
    Onnx(OnnxModel),
}

impl ModelBackend {
    pub fn flavor(&self) -> ModelFlavor {
        match self {
            ModelBackend::Logistic(_) => ModelFlavor::Logistic,
            ModelBackend::Gbdt(_) => ModelFlavor::Gbdt,
            #[cfg(feature = "onnx")]
            ModelBackend::Onnx(_) => ModelFlavor::Onnx,
        }
    }

    fn run(&self, vector: &NumericFeatureVector) -> Result<f64, ScoringError> {
        match self {
            ModelBackend::Logistic(model) => Ok(model.predict(vector.values())),
            ModelBackend::Gbdt(model) => Ok(model.predict(vector.values())),
            #[cfg(feature = "onnx")]
            ModelBackend::Onnx(model) => model.predict(&vector.to_f32()),
        }
    }
}

/// A registered classifier plus the input schema it was trained on
#[derive(Debug)]
pub struct TrainedModel {
    name: String,
    version: u32,
    feature_names: Vec<String>,
    backend: ModelBackend,
}

impl TrainedModel {
    pub fn new(
        name: impl Into<String>,
        version: u32,
        feature_names: Vec<String>,
        backend: ModelBackend,
    ) -> Result<Self, ScoringError> {
        let name = name.into();
        if feature_names.is_empty() {
            return Err(ScoringError::model_unavailable(format!(
                "model {name} declares no input features"
            )));
        }

        let declared = match &backend {
            ModelBackend::Logistic(model) => Some(model.n_features()),
            ModelBackend::Gbdt(model) => {
                model.validate(feature_names.len())?;
                None
            }
            #[cfg(feature = "onnx")]
            ModelBackend::Onnx(model) => model.input_width(),
        };
        check_declared_width(&name, declared, feature_names.len())?;

        Ok(Self {
            name,
            version,
            feature_names,
            backend,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn flavor(&self) -> ModelFlavor {
        self.backend.flavor()
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Probability of default for one feature vector.
    ///
    /// The vector's width and column order are checked against the
    /// training schema first; the output must be a finite value in [0, 1].
    pub fn predict_proba(&self, vector: &NumericFeatureVector) -> Result<f64, ScoringError> {
        self.check_schema(vector)?;

        let probability = self.backend.run(vector)?;
        if !probability.is_finite() || !(0.0..=1.0).contains(&probability) {
            return Err(ScoringError::inference(format!(
                "model {} returned invalid probability {probability}",
                self.name
            )));
        }

        debug!(
            model = %self.name,
            version = self.version,
            probability = probability,
            "Inference complete"
        );

        Ok(probability)
    }

    fn check_schema(&self, vector: &NumericFeatureVector) -> Result<(), ScoringError> {
        if vector.len() != self.feature_names.len() || vector.columns().len() != vector.len() {
            return Err(ScoringError::dimension_mismatch(format!(
                "vector has {} values but model {} expects {}",
                vector.len(),
                self.name,
                self.feature_names.len()
            )));
        }

        if let Some((position, (actual, expected))) = vector
            .columns()
            .iter()
            .zip(&self.feature_names)
            .enumerate()
            .find(|(_, (a, e))| a != e)
        {
            return Err(ScoringError::dimension_mismatch(format!(
                "column {position} is `{actual}` but model {} expects `{expected}`",
                self.name
            )));
        }

        Ok(())
    }
}

/// Run `model` on `vector`; see [`TrainedModel::predict_proba`].
pub fn predict_proba(
    vector: &NumericFeatureVector,
    model: &TrainedModel,
) -> Result<f64, ScoringError> {
    model.predict_proba(vector)
}

/// A backend that knows its input width must agree with the feature schema.
/// Unknown widths (tree ensembles, dynamic ONNX dims) are checked per call.
fn check_declared_width(
    name: &str,
    declared: Option<usize>,
    features: usize,
) -> Result<(), ScoringError> {
    match declared {
        Some(n) if n != features => Err(ScoringError::model_unavailable(format!(
            "model {name} takes {n} inputs but declares {features} features"
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn names(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn model() -> TrainedModel {
        TrainedModel::new(
            "lgb_prob_default",
            4,
            names(&["num__a", "num__b"]),
            ModelBackend::Logistic(LogisticModel {
                intercept: 0.0,
                coefficients: vec![1.0, -1.0],
            }),
        )
        .unwrap()
    }

    fn vector(values: Vec<f64>, columns: &[&str]) -> NumericFeatureVector {
        NumericFeatureVector::new(values, Arc::from(names(columns)))
    }

    #[test]
    fn test_predict_proba() {
        let model = model();
        let p = predict_proba(&vector(vec![1.0, 1.0], &["num__a", "num__b"]), &model).unwrap();
        assert_eq!(p, 0.5);
        assert_eq!(model.flavor(), ModelFlavor::Logistic);
    }

    #[test]
    fn test_deterministic() {
        let model = model();
        let v = vector(vec![0.3, -1.7], &["num__a", "num__b"]);
        let first = model.predict_proba(&v).unwrap();
        for _ in 0..10 {
            assert_eq!(model.predict_proba(&v).unwrap().to_bits(), first.to_bits());
        }
    }

    #[test]
    fn test_dimension_mismatch() {
        let model = model();

        let err = model
            .predict_proba(&vector(vec![1.0], &["num__a"]))
            .unwrap_err();
        assert_eq!(err.kind(), "dimension_mismatch");

        let err = model
            .predict_proba(&vector(vec![1.0, 1.0], &["num__b", "num__a"]))
            .unwrap_err();
        assert_eq!(err.kind(), "dimension_mismatch");
    }

    #[test]
    fn test_parameter_count_must_match_schema() {
        let result = TrainedModel::new(
            "m",
            1,
            names(&["num__a"]),
            ModelBackend::Logistic(LogisticModel {
                intercept: 0.0,
                coefficients: vec![1.0, 2.0],
            }),
        );
        assert_eq!(result.unwrap_err().kind(), "model_unavailable");
    }

    #[test]
    fn test_declared_width_check() {
        assert!(check_declared_width("m", None, 17).is_ok());
        assert!(check_declared_width("m", Some(17), 17).is_ok());

        let err = check_declared_width("m", Some(12), 17).unwrap_err();
        assert_eq!(err.kind(), "model_unavailable");
        assert!(err.to_string().contains("12 inputs"));
    }
}
