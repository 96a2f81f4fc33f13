//! Credit Risk Pipeline - Main Entry Point
//!
//! Loads the registered model and fitted preprocessing state, then scores a
//! batch of loan applications into JSON lines. Records are scored in parallel
//! on a bounded worker pool; output keeps input order.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use credit_risk_pipeline::{
    config::{AppConfig, LoggingConfig, DEFAULT_CONFIG_PATH},
    metrics::{MetricsReporter, ScoringMetrics},
    pipeline::ScoringPipeline,
    report::ScoredRecord,
    source,
    DecisionRule, DecisionThreshold, RawApplicantRecord, ScoringError,
};
use futures::StreamExt;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "credit-risk-pipeline", version, about = "Score loan applications for default risk")]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, env = "CREDIT_RISK_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Score a batch of applications
    Score {
        /// JSON array (.json) or JSON lines file, `-` for stdin
        #[arg(long, short)]
        input: PathBuf,
        /// Output JSON lines file (stdout when omitted)
        #[arg(long, short)]
        output: Option<PathBuf>,
        /// Override the configured decision threshold
        #[arg(long)]
        threshold: Option<f64>,
    },
    /// Load the artifacts and score a reference application
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load_from_path(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    init_logging(&config.logging)?;

    info!(config = %cli.config.display(), "Starting Credit Risk Pipeline");

    match cli.command {
        Command::Score {
            input,
            output,
            threshold,
        } => score(config, input, output, threshold).await,
        Command::Check => check(&config),
    }
}

fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::from_default_env().add_directive(
        format!("credit_risk_pipeline={}", logging.level)
            .parse::<Directive>()
            .with_context(|| format!("Invalid log level {:?}", logging.level))?,
    );

    // Logs go to stderr; stdout carries scored records
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.pretty().init();
    }
    Ok(())
}

/// Artifact load failures are fatal: nothing is scored without a full set
fn load_pipeline(config: &AppConfig) -> Result<ScoringPipeline> {
    ScoringPipeline::from_config(config).map_err(|e| {
        error!(kind = e.kind(), error = %e, "Failed to load model artifacts");
        anyhow::Error::new(e).context("Failed to load model artifacts")
    })
}

async fn score(
    config: AppConfig,
    input: PathBuf,
    output: Option<PathBuf>,
    threshold: Option<f64>,
) -> Result<()> {
    let mut pipeline = load_pipeline(&config)?;
    if let Some(threshold) = threshold {
        let rule = DecisionRule::new(
            DecisionThreshold::new(threshold)?,
            *pipeline.decision_rule().bands(),
        );
        pipeline = pipeline.with_decision_rule(rule);
        info!(threshold, "Decision threshold overridden");
    }
    let pipeline = Arc::new(pipeline);

    let records = source::read_records(&input)?;
    let total = records.len();

    let mut writer: Box<dyn Write> = match &output {
        Some(path) => Box::new(BufWriter::new(
            std::fs::File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(std::io::stdout().lock())),
    };

    let metrics = Arc::new(ScoringMetrics::new());
    let reporter = tokio::spawn(
        MetricsReporter::new(Arc::clone(&metrics), config.pipeline.report_interval_secs).start(),
    );

    // One snapshot for the whole batch
    let artifacts = pipeline.artifacts();
    let model_version = artifacts.model().version();
    let workers = config.pipeline.workers;
    info!(
        records = total,
        workers,
        model = %artifacts.model().name(),
        version = model_version,
        "Scoring batch"
    );

    let mut rows = futures::stream::iter(records.into_iter().enumerate())
        .map(|(index, record)| {
            let pipeline = Arc::clone(&pipeline);
            let artifacts = Arc::clone(&artifacts);
            let metrics = Arc::clone(&metrics);

            async move {
                let raw: RawApplicantRecord = match record {
                    Ok(raw) => raw,
                    Err(e) => {
                        metrics.record_failure(&e);
                        return ScoredRecord::failed(index, None, &e);
                    }
                };
                let applicant_id = raw.applicant_id.clone();

                let scored = tokio::task::spawn_blocking(move || {
                    let start = Instant::now();
                    let result = pipeline.score_with(&artifacts, &raw);
                    (result, start.elapsed())
                })
                .await;

                match scored {
                    Ok((Ok(assessment), elapsed)) => {
                        metrics.record_assessment(elapsed, &assessment);
                        ScoredRecord::scored(index, applicant_id, model_version, assessment)
                    }
                    Ok((Err(e), _)) => {
                        metrics.record_failure(&e);
                        ScoredRecord::failed(index, applicant_id, &e)
                    }
                    Err(e) => {
                        let e = ScoringError::inference(format!("scoring task failed: {e}"));
                        metrics.record_failure(&e);
                        ScoredRecord::failed(index, applicant_id, &e)
                    }
                }
            }
        })
        .buffered(workers);

    while let Some(row) = rows.next().await {
        serde_json::to_writer(&mut writer, &row).context("Failed to serialize output row")?;
        writer.write_all(b"\n").context("Failed to write output")?;
    }
    writer.flush().context("Failed to flush output")?;
    reporter.abort();

    metrics.print_summary();
    if let Some(path) = output {
        info!(output = %path.display(), records = total, "Batch written");
    }
    Ok(())
}

fn check(config: &AppConfig) -> Result<()> {
    let pipeline = load_pipeline(config)?;
    let artifacts = pipeline.artifacts();
    let model = artifacts.model();

    let assessment = pipeline
        .score(&reference_applicant())
        .context("Reference application could not be scored")?;

    let summary = serde_json::json!({
        "model": model.name(),
        "version": model.version(),
        "flavor": model.flavor(),
        "features": model.feature_names().len(),
        "threshold": pipeline.threshold(),
        "loaded_at": artifacts.loaded_at(),
        "reference_assessment": assessment,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);

    info!(
        model = %model.name(),
        version = model.version(),
        probability = assessment.probability,
        label = %assessment.label,
        "Artifacts OK"
    );
    Ok(())
}

fn reference_applicant() -> RawApplicantRecord {
    RawApplicantRecord {
        applicant_id: Some("reference".to_string()),
        person_age: Some(30),
        person_income: Some(50000.0),
        person_home_ownership: Some("RENT".to_string()),
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
