//! File-based artifact store: model registry and fitted transform state.
//!
//! Registry layout:
//!
//! ```text
//! <registry_dir>/models/<model_name>/aliases/<stage>        version number, e.g. "4"
//! <registry_dir>/models/<model_name>/version-<N>/meta.yaml  model metadata
//! <registry_dir>/models/<model_name>/version-<N>/<artifact> serialized model
//! ```

use crate::config::ArtifactsConfig;
use crate::error::ScoringError;
use crate::models::gbdt::TreeEnsemble;
use crate::models::inference::{ModelBackend, ModelFlavor, TrainedModel};
use crate::models::linear::LogisticModel;
use crate::preprocessing::FittedTransformState;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Source of the artifacts a scoring pipeline is built from.
pub trait ArtifactStore {
    fn load_transform_state(&self) -> Result<FittedTransformState, ScoringError>;

    /// Load the model registered under a stage such as "Production".
    fn load_model(&self, stage: &str) -> Result<TrainedModel, ScoringError>;
}

/// Contents of a version's `meta.yaml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMeta {
    pub name: String,
    pub version: u32,
    pub flavor: ModelFlavor,
    /// File name of the serialized model within the version directory
    pub artifact: String,
    pub feature_names: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
}

/// Artifact store over a local registry directory
#[derive(Debug, Clone)]
pub struct FileArtifactStore {
    registry_dir: PathBuf,
    model_name: String,
    transform_state_path: PathBuf,
    /// Use the newest version when the stage alias is missing
    allow_latest_version_fallback: bool,
    #[cfg_attr(not(feature = "onnx"), allow(dead_code))]
    onnx_threads: usize,
}

impl FileArtifactStore {
    pub fn new(
        registry_dir: impl Into<PathBuf>,
        model_name: impl Into<String>,
        transform_state_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            registry_dir: registry_dir.into(),
            model_name: model_name.into(),
            transform_state_path: transform_state_path.into(),
            allow_latest_version_fallback: false,
            onnx_threads: 1,
        }
    }

    pub fn from_config(config: &ArtifactsConfig) -> Self {
        Self::new(
            &config.registry_dir,
            &config.model_name,
            &config.transform_state_path,
        )
        .with_latest_version_fallback(config.allow_latest_version_fallback)
        .with_onnx_threads(config.onnx_threads)
    }

    pub fn with_latest_version_fallback(mut self, enabled: bool) -> Self {
        self.allow_latest_version_fallback = enabled;
        self
    }

    pub fn with_onnx_threads(mut self, threads: usize) -> Self {
        self.onnx_threads = threads.max(1);
        self
    }

    fn model_dir(&self) -> PathBuf {
        self.registry_dir.join("models").join(&self.model_name)
    }

    fn version_dir(&self, version: u32) -> PathBuf {
        self.model_dir().join(format!("version-{version}"))
    }

    /// Resolve a stage alias to a version number
    pub fn resolve_version(&self, stage: &str) -> Result<u32, ScoringError> {
        let alias = self.model_dir().join("aliases").join(stage);

        match fs::read_to_string(&alias) {
            Ok(contents) => contents.trim().parse::<u32>().map_err(|_| {
                ScoringError::model_unavailable(format!(
                    "alias {} does not contain a version number: {:?}",
                    alias.display(),
                    contents.trim()
                ))
            }),
            Err(e) if self.allow_latest_version_fallback => {
                let latest = self.latest_version()?;
                warn!(
                    model = %self.model_name,
                    stage = %stage,
                    error = %e,
                    version = latest,
                    "Stage alias not found, falling back to latest version"
                );
                Ok(latest)
            }
            Err(e) => Err(ScoringError::model_unavailable(format!(
                "no {} model registered under stage {stage:?} ({}: {e})",
                self.model_name,
                alias.display()
            ))),
        }
    }

    fn latest_version(&self) -> Result<u32, ScoringError> {
        let dir = self.model_dir();
        let entries = fs::read_dir(&dir).map_err(|e| {
            ScoringError::model_unavailable(format!("cannot list {}: {e}", dir.display()))
        })?;

        entries
            .flatten()
            .filter_map(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .and_then(|name| name.strip_prefix("version-"))
                    .and_then(|n| n.parse::<u32>().ok())
            })
            .max()
            .ok_or_else(|| {
                ScoringError::model_unavailable(format!(
                    "no versions registered for {}",
                    self.model_name
                ))
            })
    }

    /// Read the metadata of a registered version
    pub fn read_meta(&self, version: u32) -> Result<ModelMeta, ScoringError> {
        let path = self.version_dir(version).join("meta.yaml");
        let contents = fs::read_to_string(&path).map_err(|e| {
            ScoringError::model_unavailable(format!("cannot read {}: {e}", path.display()))
        })?;
        let meta: ModelMeta = serde_yaml::from_str(&contents).map_err(|e| {
            ScoringError::model_unavailable(format!("invalid {}: {e}", path.display()))
        })?;

        if meta.version != version {
            return Err(ScoringError::model_unavailable(format!(
                "{} declares version {} but lives in version-{version}",
                path.display(),
                meta.version
            )));
        }
        Ok(meta)
    }

    fn load_backend(&self, meta: &ModelMeta, path: &Path) -> Result<ModelBackend, ScoringError> {
        let read = || {
            fs::read_to_string(path).map_err(|e| {
                ScoringError::model_unavailable(format!("cannot read {}: {e}", path.display()))
            })
        };

        match meta.flavor {
            ModelFlavor::Logistic => Ok(ModelBackend::Logistic(LogisticModel::from_json_str(
                &read()?,
            )?)),
            ModelFlavor::Gbdt => Ok(ModelBackend::Gbdt(TreeEnsemble::from_json_str(
                &read()?,
                meta.feature_names.len(),
            )?)),
            #[cfg(feature = "onnx")]
            ModelFlavor::Onnx => Ok(ModelBackend::Onnx(crate::models::onnx::OnnxModel::load(
                path,
                self.onnx_threads,
            )?)),
            #[cfg(not(feature = "onnx"))]
            ModelFlavor::Onnx => Err(ScoringError::model_unavailable(
                "ONNX models require the `onnx` feature",
            )),
        }
    }
}

impl ArtifactStore for FileArtifactStore {
    fn load_transform_state(&self) -> Result<FittedTransformState, ScoringError> {
        FittedTransformState::load(&self.transform_state_path)
    }

    fn load_model(&self, stage: &str) -> Result<TrainedModel, ScoringError> {
        let version = self.resolve_version(stage)?;
        let meta = self.read_meta(version)?;
        let path = self.version_dir(version).join(&meta.artifact);

        info!(
            model = %meta.name,
            version = version,
            stage = %stage,
            flavor = ?meta.flavor,
            path = %path.display(),
            "Loading model"
        );

        let backend = self.load_backend(&meta, &path)?;
        let model = TrainedModel::new(meta.name, version, meta.feature_names, backend)?;

        info!(
            model = %model.name(),
            version = model.version(),
            features = model.feature_names().len(),
            "Model loaded successfully"
        );

        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_version(root: &Path, version: u32) {
        let dir = root.join("models/lgb_prob_default").join(format!("version-{version}"));
        fs::create_dir_all(&dir).unwrap();
        let meta = ModelMeta {
            name: "lgb_prob_default".to_string(),
            version,
            flavor: ModelFlavor::Logistic,
            artifact: "model.json".to_string(),
            feature_names: vec!["num__person_income".to_string()],
            run_id: None,
        };
        fs::write(dir.join("meta.yaml"), serde_yaml::to_string(&meta).unwrap()).unwrap();
        fs::write(
            dir.join("model.json"),
            format!(r#"{{"intercept": {version}.0, "coefficients": [0.5]}}"#),
        )
        .unwrap();
    }

    fn set_alias(root: &Path, stage: &str, version: &str) {
        let dir = root.join("models/lgb_prob_default/aliases");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(stage), version).unwrap();
    }

    fn store(root: &Path) -> FileArtifactStore {
        FileArtifactStore::new(root, "lgb_prob_default", root.join("preprocessor.json"))
    }

    #[test]
    fn test_load_model_by_stage() {
        let tmp = tempfile::tempdir().unwrap();
        write_version(tmp.path(), 3);
        write_version(tmp.path(), 4);
        set_alias(tmp.path(), "Production", "3\n");

        let model = store(tmp.path()).load_model("Production").unwrap();
        assert_eq!(model.version(), 3);
        assert_eq!(model.flavor(), ModelFlavor::Logistic);
        assert_eq!(model.feature_names(), &["num__person_income".to_string()]);
    }

    #[test]
    fn test_missing_stage_is_hard_failure() {
        let tmp = tempfile::tempdir().unwrap();
        write_version(tmp.path(), 4);

        let err = store(tmp.path()).load_model("Production").unwrap_err();
        assert_eq!(err.kind(), "model_unavailable");
    }

    #[test]
    fn test_latest_version_fallback_when_enabled() {
        let tmp = tempfile::tempdir().unwrap();
        write_version(tmp.path(), 2);
        write_version(tmp.path(), 10);

        let store = store(tmp.path()).with_latest_version_fallback(true);
        assert_eq!(store.resolve_version("Production").unwrap(), 10);
    }

    #[test]
    fn test_corrupt_alias_and_meta() {
        let tmp = tempfile::tempdir().unwrap();
        write_version(tmp.path(), 4);
        set_alias(tmp.path(), "Production", "four");
        assert!(store(tmp.path()).load_model("Production").is_err());

        set_alias(tmp.path(), "Staging", "7");
        let err = store(tmp.path()).load_model("Staging").unwrap_err();
        assert_eq!(err.kind(), "model_unavailable");

        fs::write(
            tmp.path().join("models/lgb_prob_default/version-4/meta.yaml"),
            "name: [unclosed",
        )
        .unwrap();
        set_alias(tmp.path(), "Production", "4");
        assert!(store(tmp.path()).load_model("Production").is_err());
    }

    #[test]
    fn test_missing_transform_state() {
        let tmp = tempfile::tempdir().unwrap();
        let err = store(tmp.path()).load_transform_state().unwrap_err();
        assert_eq!(err.kind(), "transform_state_unavailable");
    }
}
