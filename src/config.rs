//! Configuration management for the scoring pipeline

use crate::decision::{DecisionThreshold, DEFAULT_THRESHOLD};
use crate::preprocessing::UnseenCategoryPolicy;
use crate::types::assessment::RiskBandThresholds;
use anyhow::{ensure, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// Default location of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub artifacts: ArtifactsConfig,
    #[serde(default)]
    pub decision: DecisionConfig,
    #[serde(default)]
    pub preprocessing: PreprocessingConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where the trained artifacts live
#[derive(Debug, Clone, Deserialize)]
pub struct ArtifactsConfig {
    /// Root of the model registry
    pub registry_dir: String,
    /// Registered model name
    #[serde(default = "default_model_name")]
    pub model_name: String,
    /// Registry stage to serve
    #[serde(default = "default_stage")]
    pub stage: String,
    /// Fitted encoders/scalers (JSON)
    pub transform_state_path: String,
    /// Serve the newest registered version when the stage alias is missing
    #[serde(default)]
    pub allow_latest_version_fallback: bool,
    /// Intra-op threads per ONNX session
    #[serde(default = "default_onnx_threads")]
    pub onnx_threads: usize,
}

fn default_model_name() -> String {
    "lgb_prob_default".to_string()
}

fn default_stage() -> String {
    "Production".to_string()
}

fn default_onnx_threads() -> usize {
    1
}

/// Decision rule configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DecisionConfig {
    /// Probability at or above which an applicant is high risk
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    /// Risk band upper bounds
    #[serde(default)]
    pub risk_bands: RiskBandThresholds,
}

fn default_threshold() -> f64 {
    DEFAULT_THRESHOLD
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            risk_bands: RiskBandThresholds::default(),
        }
    }
}

/// Preprocessing configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PreprocessingConfig {
    /// "reject" or "fallback"
    #[serde(default)]
    pub unseen_category: UnseenCategoryPolicy,
}

/// Batch execution configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Concurrent scoring workers for batch runs
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Seconds between progress summaries during a batch run
    #[serde(default = "default_report_interval")]
    pub report_interval_secs: u64,
}

fn default_workers() -> usize {
    4
}

fn default_report_interval() -> u64 {
    30
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            report_interval_secs: default_report_interval(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (json, pretty)
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default file
    pub fn load() -> Result<Self> {
        Self::load_from_path(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific path, overridable through
    /// `CREDIT_RISK__<SECTION>__<KEY>` environment variables
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(
                Environment::with_prefix("CREDIT_RISK")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Self = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<()> {
        DecisionThreshold::new(self.decision.threshold)
            .context("Invalid decision threshold")?;

        let bands = &self.decision.risk_bands;
        ensure!(
            0.0 <= bands.low_max && bands.low_max <= bands.medium_max && bands.medium_max <= 1.0,
            "Risk bands must satisfy 0 <= low_max <= medium_max <= 1 (got {} / {})",
            bands.low_max,
            bands.medium_max
        );
        ensure!(self.pipeline.workers > 0, "pipeline.workers must be at least 1");
        ensure!(
            matches!(self.logging.format.as_str(), "json" | "pretty"),
            "logging.format must be \"json\" or \"pretty\", got {:?}",
            self.logging.format
        );
        ensure!(!self.artifacts.stage.is_empty(), "artifacts.stage must not be empty");
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            artifacts: ArtifactsConfig {
                registry_dir: "artifacts/registry".to_string(),
                model_name: default_model_name(),
                stage: default_stage(),
                transform_state_path: "artifacts/preprocessor.json".to_string(),
                allow_latest_version_fallback: false,
                onnx_threads: 1,
            },
            decision: DecisionConfig::default(),
            preprocessing: PreprocessingConfig::default(),
            pipeline: PipelineConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.decision.threshold, 0.42);
        assert_eq!(config.artifacts.stage, "Production");
        assert_eq!(config.artifacts.model_name, "lgb_prob_default");
        assert_eq!(config.preprocessing.unseen_category, UnseenCategoryPolicy::Reject);
        assert!(!config.artifacts.allow_latest_version_fallback);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[artifacts]
registry_dir = "/srv/registry"
transform_state_path = "/srv/preprocessor.json"

[decision]
threshold = 0.5

[preprocessing]
unseen_category = "fallback"
"#
        )
        .unwrap();

        let config = AppConfig::load_from_path(file.path()).unwrap();
        assert_eq!(config.artifacts.registry_dir, "/srv/registry");
        assert_eq!(config.artifacts.stage, "Production");
        assert_eq!(config.decision.threshold, 0.5);
        assert_eq!(config.decision.risk_bands.medium_max, 0.60);
        assert_eq!(config.preprocessing.unseen_category, UnseenCategoryPolicy::Fallback);
        assert_eq!(config.pipeline.workers, 4);
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let mut config = AppConfig::default();
        config.decision.threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.decision.risk_bands.low_max = 0.8;
        assert!(config.validate().is_err());
    }
}
