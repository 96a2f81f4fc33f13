mod common;

use common::{golden_applicant, Registry};
use credit_risk_pipeline::preprocessing::UnseenCategoryPolicy;
use credit_risk_pipeline::types::RiskBandThresholds;
use credit_risk_pipeline::{
    ArtifactSet, ArtifactStore, DecisionRule, DecisionThreshold, Preprocessor, RiskBand,
    RiskLabel, ScoringPipeline,
};
use std::sync::Arc;

fn pipeline(registry: &Registry) -> ScoringPipeline {
    ScoringPipeline::from_config(&registry.config()).unwrap()
}

#[test]
fn test_golden_applicant() {
    let registry = Registry::new();
    let assessment = pipeline(&registry).score(&golden_applicant()).unwrap();

    // income (50000-40000)/20000 = 0.5, rate (11.5-10)/2 = 0.75, no prior
    // default, PERSONAL, grade B, age band 30-39:
    // z = -2 - 0.8*0.5 + 1.2*0.75 + 0.3 - 0.2 = -1.4
    let expected = 1.0 / (1.0 + 1.4f64.exp());
    assert!((assessment.probability - expected).abs() < 1e-12);
    assert!((assessment.probability - 0.19781611144141825).abs() < 1e-12);
    assert_eq!(assessment.label, RiskLabel::BaixoRisco);
    assert_eq!(assessment.threshold, 0.42);
    assert_eq!(assessment.risk_band, RiskBand::Baixo);
    assert!((assessment.confidence - (0.42 - expected)).abs() < 1e-12);
}

#[test]
fn test_scoring_is_deterministic() {
    let registry = Registry::new();
    let first = pipeline(&registry).score(&golden_applicant()).unwrap();

    // Fresh load of the same artifact version
    let reloaded = pipeline(&registry);
    for _ in 0..10 {
        assert_eq!(reloaded.score(&golden_applicant()).unwrap(), first);
    }
}

#[test]
fn test_threshold_equal_to_probability_is_high_risk() {
    let registry = Registry::new();
    let base = pipeline(&registry);
    let p = base.score(&golden_applicant()).unwrap().probability;

    let at_boundary = base.with_decision_rule(DecisionRule::new(
        DecisionThreshold::new(p).unwrap(),
        RiskBandThresholds::default(),
    ));
    let assessment = at_boundary.score(&golden_applicant()).unwrap();
    assert_eq!(assessment.label, RiskLabel::AltoRisco);
    assert_eq!(assessment.confidence, 0.0);
}

#[test]
fn test_batch_preserves_order_and_isolates_failures() {
    let registry = Registry::new();
    let pipeline = pipeline(&registry);

    let mut high = golden_applicant();
    high.loan_grade = Some("D".to_string());
    let mut missing = golden_applicant();
    missing.loan_amnt = None;

    let results = pipeline.score_many(&[golden_applicant(), missing, high.clone()]);

    assert_eq!(results.len(), 3);
    assert_eq!(
        results[0].as_ref().unwrap(),
        &pipeline.score(&golden_applicant()).unwrap()
    );
    let err = results[1].as_ref().unwrap_err();
    assert_eq!(err.kind(), "schema_error");
    assert!(err.to_string().contains("loan_amnt"));
    assert_eq!(results[2].as_ref().unwrap(), &pipeline.score(&high).unwrap());
}

#[test]
fn test_unseen_category_rejected_by_default() {
    let registry = Registry::new();
    let mut record = golden_applicant();
    record.loan_intent = Some("UNKNOWN_TEST".to_string());

    let err = pipeline(&registry).score(&record).unwrap_err();
    assert_eq!(err.kind(), "unknown_category");
    assert!(err.to_string().contains("UNKNOWN_TEST"));
}

#[test]
fn test_unseen_category_uses_fallback_bucket() {
    let registry = Registry::with_state(&common::transform_state_with_fallbacks());
    let mut config = registry.config();
    config.preprocessing.unseen_category = UnseenCategoryPolicy::Fallback;
    let pipeline = ScoringPipeline::from_config(&config).unwrap();

    let mut record = golden_applicant();
    record.loan_intent = Some("UNKNOWN_TEST".to_string());

    // Encoded as PERSONAL, the loan_intent fallback
    assert_eq!(
        pipeline.score(&record).unwrap(),
        pipeline.score(&golden_applicant()).unwrap()
    );
}

#[test]
fn test_fallback_policy_requires_declared_buckets() {
    let registry = Registry::new();
    let mut config = registry.config();
    config.preprocessing.unseen_category = UnseenCategoryPolicy::Fallback;

    let err = ScoringPipeline::from_config(&config).unwrap_err();
    assert_eq!(err.kind(), "transform_state_unavailable");
}

#[test]
fn test_missing_stage_alias_is_fatal() {
    let registry = Registry::new();
    registry.remove_alias("Production");

    let err = ScoringPipeline::from_config(&registry.config()).unwrap_err();
    assert_eq!(err.kind(), "model_unavailable");
}

#[test]
fn test_missing_stage_alias_with_latest_version_fallback() {
    let registry = Registry::new();
    registry.add_version(2, 0.0);
    registry.remove_alias("Production");

    let mut config = registry.config();
    config.artifacts.allow_latest_version_fallback = true;
    let pipeline = ScoringPipeline::from_config(&config).unwrap();

    assert_eq!(pipeline.artifacts().model().version(), 2);
}

#[test]
fn test_missing_transform_state_is_fatal() {
    let registry = Registry::new();
    std::fs::remove_file(registry.transform_state_path()).unwrap();

    let err = ScoringPipeline::from_config(&registry.config()).unwrap_err();
    assert_eq!(err.kind(), "transform_state_unavailable");
}

#[test]
fn test_reload_keeps_in_flight_snapshot() {
    let registry = Registry::new();
    let pipeline = pipeline(&registry);
    let snapshot = pipeline.artifacts();
    let before = pipeline.score(&golden_applicant()).unwrap();

    registry.add_version(2, 1.0);
    registry.set_alias("Production", 2);
    let next = ArtifactSet::load(&registry.store(), "Production").unwrap();
    pipeline.reload(next).unwrap();

    assert_eq!(pipeline.artifacts().model().version(), 2);
    let after = pipeline.score(&golden_applicant()).unwrap();
    assert!(after.probability > before.probability);

    // A batch that started on the old snapshot still scores against it
    assert_eq!(snapshot.model().version(), 1);
    assert_eq!(
        pipeline.score_with(&snapshot, &golden_applicant()).unwrap(),
        before
    );
}

#[test]
fn test_store_loads_matching_pair() {
    let registry = Registry::new();
    let store = registry.store();

    let state = store.load_transform_state().unwrap();
    let model = store.load_model("Production").unwrap();
    assert_eq!(state.selected_features(), model.feature_names());

    let pipeline = ScoringPipeline::new(
        ArtifactSet::new(state, model).unwrap(),
        Preprocessor::default(),
        DecisionRule::default(),
    )
    .unwrap();
    assert_eq!(pipeline.threshold(), 0.42);
}

#[tokio::test]
async fn test_parallel_batch_matches_sequential() {
    let registry = Registry::new();
    let pipeline = Arc::new(pipeline(&registry));

    let records: Vec<_> = (0..40)
        .map(|i| {
            let mut record = golden_applicant();
            record.applicant_id = Some(format!("app_{i}"));
            record.person_income = Some(20000.0 + 2500.0 * i as f64);
            record.loan_grade = Some(["A", "B", "C", "D", "E", "F", "G"][i % 7].to_string());
            if i % 9 == 0 {
                record.cb_person_default_on_file = None;
            }
            record
        })
        .collect();

    let sequential = pipeline.score_many(&records);
    let parallel = pipeline.score_many_parallel(records, 4).await;

    assert_eq!(parallel, sequential);
    assert!(parallel[0].is_err());
    assert!(parallel[1].is_ok());
}
