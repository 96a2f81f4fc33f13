//! Shared fixtures: a throwaway model registry with a hand-checkable
//! logistic model.

#![allow(dead_code)]

use credit_risk_pipeline::config::AppConfig;
use credit_risk_pipeline::models::inference::ModelFlavor;
use credit_risk_pipeline::models::linear::LogisticModel;
use credit_risk_pipeline::models::loader::ModelMeta;
use credit_risk_pipeline::preprocessing::{CategoryVocabulary, NumericScaler};
use credit_risk_pipeline::{FileArtifactStore, FittedTransformState, RawApplicantRecord};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

pub const MODEL_NAME: &str = "lgb_prob_default";

pub fn selected_features() -> Vec<String> {
    [
        "num__person_income",
        "num__loan_int_rate",
        "num__prior_default",
        "cat__loan_intent_PERSONAL",
        "cat__loan_grade_D",
        "cat__age_band_30-39",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

pub const INTERCEPT: f64 = -2.0;
pub const COEFFICIENTS: [f64; 6] = [-0.8, 1.2, 1.5, 0.3, 1.1, -0.2];

fn vocabulary(column: &str, categories: &[&str]) -> CategoryVocabulary {
    CategoryVocabulary {
        column: column.to_string(),
        categories: categories.iter().map(|c| c.to_string()).collect(),
        fallback: None,
    }
}

pub fn transform_state() -> FittedTransformState {
    FittedTransformState::new(
        vec![
            NumericScaler {
                column: "person_income".to_string(),
                mean: 40000.0,
                scale: 20000.0,
            },
            NumericScaler {
                column: "loan_int_rate".to_string(),
                mean: 10.0,
                scale: 2.0,
            },
            NumericScaler {
                column: "prior_default".to_string(),
                mean: 0.0,
                scale: 1.0,
            },
        ],
        vec![
            vocabulary(
                "loan_intent",
                &[
                    "DEBTCONSOLIDATION",
                    "EDUCATION",
                    "HOMEIMPROVEMENT",
                    "MEDICAL",
                    "PERSONAL",
                    "VENTURE",
                ],
            ),
            vocabulary("loan_grade", &["A", "B", "C", "D", "E", "F", "G"]),
            vocabulary(
                "age_band",
                &["20-29", "30-39", "40-49", "50-59", "60-69", "70+"],
            ),
        ],
        selected_features(),
    )
    .unwrap()
}

/// Same state with a fallback bucket on every categorical column
pub fn transform_state_with_fallbacks() -> FittedTransformState {
    transform_state()
        .with_fallback("loan_intent", "PERSONAL")
        .unwrap()
        .with_fallback("loan_grade", "G")
        .unwrap()
        .with_fallback("age_band", "70+")
        .unwrap()
}

/// The reference application used for the golden regression test
pub fn golden_applicant() -> RawApplicantRecord {
    RawApplicantRecord {
        applicant_id: Some("golden".to_string()),
        person_age: Some(30),
        person_income: Some(50000.0),
        person_home_ownership: None,
        person_emp_length: Some(5.0),
        loan_intent: Some("PERSONAL".to_string()),
        loan_grade: Some("B".to_string()),
        loan_amnt: Some(10000.0),
        loan_int_rate: Some(11.5),
        loan_percent_income: Some(0.2),
        cb_person_default_on_file: Some("N".to_string()),
        cb_person_cred_history_length: Some(4),
    }
}

/// Registry rooted in a temporary directory
pub struct Registry {
    dir: TempDir,
}

impl Registry {
    /// One logistic model registered as version 1 under `Production`
    pub fn new() -> Self {
        Self::with_state(&transform_state())
    }

    pub fn with_state(state: &FittedTransformState) -> Self {
        let registry = Self {
            dir: tempfile::tempdir().unwrap(),
        };
        fs::write(registry.transform_state_path(), state.to_json_pretty().unwrap()).unwrap();
        registry.add_version(1, INTERCEPT);
        registry.set_alias("Production", 1);
        registry
    }

    pub fn root(&self) -> PathBuf {
        self.dir.path().join("registry")
    }

    pub fn transform_state_path(&self) -> PathBuf {
        self.dir.path().join("preprocessor.json")
    }

    fn model_dir(&self) -> PathBuf {
        self.root().join("models").join(MODEL_NAME)
    }

    pub fn add_version(&self, version: u32, intercept: f64) {
        let dir = self.model_dir().join(format!("version-{version}"));
        fs::create_dir_all(&dir).unwrap();

        let meta = ModelMeta {
            name: MODEL_NAME.to_string(),
            version,
            flavor: ModelFlavor::Logistic,
            artifact: "model.json".to_string(),
            feature_names: selected_features(),
            run_id: Some(format!("run-{version}")),
        };
        fs::write(dir.join("meta.yaml"), serde_yaml::to_string(&meta).unwrap()).unwrap();

        let model = LogisticModel {
            intercept,
            coefficients: COEFFICIENTS.to_vec(),
        };
        fs::write(dir.join("model.json"), serde_json::to_string(&model).unwrap()).unwrap();
    }

    pub fn set_alias(&self, stage: &str, version: u32) {
        let dir = self.model_dir().join("aliases");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(stage), format!("{version}\n")).unwrap();
    }

    pub fn remove_alias(&self, stage: &str) {
        fs::remove_file(self.model_dir().join("aliases").join(stage)).unwrap();
    }

    pub fn store(&self) -> FileArtifactStore {
        FileArtifactStore::new(self.root(), MODEL_NAME, self.transform_state_path())
    }

    pub fn config(&self) -> AppConfig {
        let mut config = AppConfig::default();
        config.artifacts.registry_dir = self.root().to_string_lossy().into_owned();
        config.artifacts.transform_state_path =
            self.transform_state_path().to_string_lossy().into_owned();
        config
    }
}
