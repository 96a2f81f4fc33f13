//! Scoring pipeline orchestration.
//!
//! Composes feature engineering, preprocessing, inference and the decision
//! rule over one explicitly owned artifact set. Artifacts are read-only once
//! loaded; a reload replaces the whole set at once and in-flight batches keep
//! the snapshot they started with.

use crate::config::AppConfig;
use crate::decision::{DecisionRule, DecisionThreshold};
use crate::error::ScoringError;
use crate::feature_engineering::FeatureEngineer;
use crate::models::inference::TrainedModel;
use crate::models::loader::{ArtifactStore, FileArtifactStore};
use crate::preprocessing::{FittedTransformState, Preprocessor};
use crate::types::applicant::RawApplicantRecord;
use crate::types::assessment::RiskAssessment;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

/// Fitted transform state and model that were trained together.
#[derive(Debug)]
pub struct ArtifactSet {
    transform: FittedTransformState,
    model: TrainedModel,
    loaded_at: DateTime<Utc>,
}

impl ArtifactSet {
    /// Pair a transform state with a model, checking that the state's
    /// output columns are exactly the model's inputs.
    pub fn new(transform: FittedTransformState, model: TrainedModel) -> Result<Self, ScoringError> {
        let produced = transform.selected_features();
        let expected = model.feature_names();

        if produced.len() != expected.len() {
            return Err(ScoringError::dimension_mismatch(format!(
                "transform state produces {} features but model {} v{} expects {}",
                produced.len(),
                model.name(),
                model.version(),
                expected.len()
            )));
        }
        if let Some(position) = produced.iter().zip(expected).position(|(p, e)| p != e) {
            return Err(ScoringError::dimension_mismatch(format!(
                "column {position}: transform state produces `{}` but model expects `{}`",
                produced[position], expected[position]
            )));
        }

        Ok(Self {
            transform,
            model,
            loaded_at: Utc::now(),
        })
    }

    /// Load both artifacts from a store
    pub fn load<S: ArtifactStore + ?Sized>(store: &S, stage: &str) -> Result<Self, ScoringError> {
        let transform = store.load_transform_state()?;
        let model = store.load_model(stage)?;
        Self::new(transform, model)
    }

    pub fn transform(&self) -> &FittedTransformState {
        &self.transform
    }

    pub fn model(&self) -> &TrainedModel {
        &self.model
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }
}

/// Shared slot holding the current artifact set
#[derive(Debug)]
pub struct ArtifactHandle {
    current: RwLock<Arc<ArtifactSet>>,
}

impl ArtifactHandle {
    pub fn new(artifacts: ArtifactSet) -> Self {
        Self {
            current: RwLock::new(Arc::new(artifacts)),
        }
    }

    /// Snapshot of the current set
    pub fn current(&self) -> Arc<ArtifactSet> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Replace the whole set, returning the previous one
    pub fn swap(&self, artifacts: ArtifactSet) -> Arc<ArtifactSet> {
        let next = Arc::new(artifacts);
        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::replace(&mut *guard, next)
    }
}

/// Raw application in, risk assessment out.
#[derive(Debug)]
pub struct ScoringPipeline {
    engineer: FeatureEngineer,
    preprocessor: Preprocessor,
    rule: DecisionRule,
    artifacts: Arc<ArtifactHandle>,
}

impl ScoringPipeline {
    pub fn new(
        artifacts: ArtifactSet,
        preprocessor: Preprocessor,
        rule: DecisionRule,
    ) -> Result<Self, ScoringError> {
        preprocessor.check(artifacts.transform())?;

        info!(
            model = %artifacts.model().name(),
            version = artifacts.model().version(),
            features = artifacts.transform().width(),
            threshold = rule.threshold(),
            unseen_category = ?preprocessor.policy(),
            "Scoring pipeline ready"
        );

        Ok(Self {
            engineer: FeatureEngineer::new(),
            preprocessor,
            rule,
            artifacts: Arc::new(ArtifactHandle::new(artifacts)),
        })
    }

    /// Load artifacts from the configured registry. Any failure is returned
    /// before a pipeline exists, so callers never serve half-initialised.
    pub fn from_config(config: &AppConfig) -> Result<Self, ScoringError> {
        let store = FileArtifactStore::from_config(&config.artifacts);
        let artifacts = ArtifactSet::load(&store, &config.artifacts.stage)?;
        let rule = DecisionRule::new(
            DecisionThreshold::new(config.decision.threshold)?,
            config.decision.risk_bands,
        );
        Self::new(
            artifacts,
            Preprocessor::new(config.preprocessing.unseen_category),
            rule,
        )
    }

    pub fn threshold(&self) -> f64 {
        self.rule.threshold()
    }

    pub fn decision_rule(&self) -> &DecisionRule {
        &self.rule
    }

    /// Same pipeline, different decision rule. The artifact slot is
    /// shared, so a `reload` on either pipeline is seen by both.
    pub fn with_decision_rule(&self, rule: DecisionRule) -> Self {
        Self {
            engineer: self.engineer,
            preprocessor: self.preprocessor,
            rule,
            artifacts: Arc::clone(&self.artifacts),
        }
    }

    pub fn artifacts(&self) -> Arc<ArtifactSet> {
        self.artifacts.current()
    }

    /// Atomically replace the artifact set after validating it
    pub fn reload(&self, artifacts: ArtifactSet) -> Result<(), ScoringError> {
        self.preprocessor.check(artifacts.transform())?;
        let (version, name) = (artifacts.model().version(), artifacts.model().name().to_string());
        let previous = self.artifacts.swap(artifacts);

        info!(
            model = %name,
            previous_version = previous.model().version(),
            version = version,
            "Artifacts reloaded"
        );
        Ok(())
    }

    /// Score a single application
    pub fn score(&self, raw: &RawApplicantRecord) -> Result<RiskAssessment, ScoringError> {
        let artifacts = self.artifacts.current();
        self.score_with(&artifacts, raw)
    }

    /// Score a batch in input order against one artifact snapshot.
    /// A failing record yields an `Err` in its slot and never affects others.
    pub fn score_many(
        &self,
        raws: &[RawApplicantRecord],
    ) -> Vec<Result<RiskAssessment, ScoringError>> {
        let artifacts = self.artifacts.current();
        raws.iter().map(|raw| self.score_with(&artifacts, raw)).collect()
    }

    /// Score a batch on up to `workers` blocking tasks, results in input order.
    /// At most `workers` records are in flight at any time.
    pub async fn score_many_parallel(
        self: &Arc<Self>,
        raws: Vec<RawApplicantRecord>,
        workers: usize,
    ) -> Vec<Result<RiskAssessment, ScoringError>> {
        let artifacts = self.artifacts.current();

        futures::stream::iter(raws)
            .map(|raw| {
                let pipeline = Arc::clone(self);
                let artifacts = Arc::clone(&artifacts);

                async move {
                    match tokio::task::spawn_blocking(move || pipeline.score_with(&artifacts, &raw))
                        .await
                    {
                        Ok(result) => result,
                        Err(e) => Err(ScoringError::inference(format!("scoring task failed: {e}"))),
                    }
                }
            })
            .buffered(workers.max(1))
            .collect()
            .await
    }

    /// Score against an explicit snapshot, as taken from `artifacts()`
    pub fn score_with(
        &self,
        artifacts: &ArtifactSet,
        raw: &RawApplicantRecord,
    ) -> Result<RiskAssessment, ScoringError> {
        let result = self
            .engineer
            .engineer(raw)
            .and_then(|engineered| self.preprocessor.transform(&engineered, &artifacts.transform))
            .and_then(|vector| artifacts.model.predict_proba(&vector))
            .map(|probability| self.rule.assess(probability));

        match &result {
            Ok(assessment) => debug!(
                applicant_id = ?raw.applicant_id,
                probability = assessment.probability,
                label = %assessment.label,
                "Applicant scored"
            ),
            Err(e) => warn!(
                applicant_id = ?raw.applicant_id,
                kind = e.kind(),
                error = %e,
                "Applicant could not be scored"
            ),
        }

        result
    }
}
