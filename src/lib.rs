//! Credit Risk Scoring Pipeline Library
//!
//! Turns raw loan applications into a default probability and a binary
//! risk tier (ALTO_RISCO / BAIXO_RISCO) using artifacts produced by an
//! offline training job.

pub mod config;
pub mod decision;
pub mod error;
pub mod feature_engineering;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod preprocessing;
pub mod report;
pub mod source;
pub mod types;

pub use config::AppConfig;
pub use decision::{classify, DecisionRule, DecisionThreshold, DEFAULT_THRESHOLD};
pub use error::ScoringError;
pub use feature_engineering::{EngineeredRecord, FeatureEngineer};
pub use models::inference::{predict_proba, TrainedModel};
pub use models::loader::{ArtifactStore, FileArtifactStore};
pub use pipeline::{ArtifactSet, ScoringPipeline};
pub use preprocessing::{FittedTransformState, NumericFeatureVector, Preprocessor};
pub use types::{RawApplicantRecord, RiskAssessment, RiskBand, RiskLabel};
