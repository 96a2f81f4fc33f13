//! Synthetic Applicant Generator
//!
//! Writes random loan applications as JSON lines for exercising the scoring
//! pipeline end to end.

use anyhow::{Context, Result};
use clap::Parser;
use credit_risk_pipeline::RawApplicantRecord;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "generate-applicants", about = "Emit synthetic loan applications as JSON lines")]
struct Args {
    /// Number of applications
    #[arg(long, short, default_value_t = 100)]
    count: u64,
    /// Share of applications drawn from the risky profile
    #[arg(long, default_value_t = 0.2)]
    risky_rate: f64,
    /// Share of applications with a missing field or an unseen category
    #[arg(long, default_value_t = 0.0)]
    invalid_rate: f64,
    /// RNG seed for reproducible batches
    #[arg(long)]
    seed: Option<u64>,
    /// Output file (stdout when omitted)
    #[arg(long, short)]
    output: Option<PathBuf>,
}

/// Applicant generator for testing
struct ApplicantGenerator {
    rng: StdRng,
    counter: u64,
}

impl ApplicantGenerator {
    fn new(seed: Option<u64>) -> Self {
        Self {
            rng: match seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            },
            counter: 0,
        }
    }

    /// Stable income, good grade, clean history
    fn generate_regular(&mut self) -> RawApplicantRecord {
        self.counter += 1;
        let person_income = self.rng.gen_range(35_000.0..150_000.0_f64).round();
        let loan_amnt = self.rng.gen_range(1_000.0..15_000.0_f64).round();
        let age = self.rng.gen_range(23..65);

        RawApplicantRecord {
            applicant_id: Some(format!("app_{:08}", self.counter)),
            person_age: Some(age),
            person_income: Some(person_income),
            person_home_ownership: Some(
                self.random_choice(&["MORTGAGE", "OWN", "RENT"]).to_string(),
            ),
            person_emp_length: Some(self.rng.gen_range(1..15) as f64),
            loan_intent: Some(
                self.random_choice(&["EDUCATION", "HOMEIMPROVEMENT", "PERSONAL", "VENTURE"])
                    .to_string(),
            ),
            loan_grade: Some(self.random_choice(&["A", "A", "B", "B", "C"]).to_string()),
            loan_amnt: Some(loan_amnt),
            loan_int_rate: Some(round2(self.rng.gen_range(5.5..12.0))),
            loan_percent_income: Some(round2(loan_amnt / person_income)),
            cb_person_default_on_file: Some("N".to_string()),
            cb_person_cred_history_length: Some(self.rng.gen_range(2..(age - 18).max(3))),
        }
    }

    /// Low income relative to the loan, poor grade, prior default likely
    fn generate_risky(&mut self) -> RawApplicantRecord {
        self.counter += 1;
        let person_income = self.rng.gen_range(9_000.0..40_000.0_f64).round();
        let loan_amnt = self.rng.gen_range(8_000.0..30_000.0_f64).round();

        RawApplicantRecord {
            applicant_id: Some(format!("app_{:08}", self.counter)),
            person_age: Some(self.rng.gen_range(20..30)),
            person_income: Some(person_income),
            person_home_ownership: Some(self.random_choice(&["RENT", "OTHER"]).to_string()),
            person_emp_length: Some(self.rng.gen_range(0..3) as f64),
            loan_intent: Some(
                self.random_choice(&["DEBTCONSOLIDATION", "MEDICAL", "PERSONAL"])
                    .to_string(),
            ),
            loan_grade: Some(self.random_choice(&["D", "E", "F", "G"]).to_string()),
            loan_amnt: Some(loan_amnt),
            loan_int_rate: Some(round2(self.rng.gen_range(14.0..23.0))),
            loan_percent_income: Some(round2((loan_amnt / person_income).min(0.83))),
            cb_person_default_on_file: Some(
                if self.rng.gen_bool(0.6) { "Y" } else { "N" }.to_string(),
            ),
            cb_person_cred_history_length: Some(self.rng.gen_range(2..5)),
        }
    }

    /// A regular application broken in one of the ways the pipeline rejects
    fn generate_invalid(&mut self) -> RawApplicantRecord {
        let mut record = self.generate_regular();
        match self.rng.gen_range(0..3) {
            0 => record.loan_amnt = None,
            1 => record.loan_intent = Some("UNKNOWN_TEST".to_string()),
            _ => record.loan_grade = Some("Z".to_string()),
        }
        record
    }

    fn random_choice<'a>(&mut self, choices: &[&'a str]) -> &'a str {
        choices[self.rng.gen_range(0..choices.len())]
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("generate_applicants=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    anyhow::ensure!(
        (0.0..=1.0).contains(&args.risky_rate) && (0.0..=1.0).contains(&args.invalid_rate),
        "--risky-rate and --invalid-rate must be within [0, 1]"
    );

    info!(
        count = args.count,
        risky_rate = args.risky_rate,
        invalid_rate = args.invalid_rate,
        seed = ?args.seed,
        "Generating applicants"
    );

    let mut writer: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(
            std::fs::File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(std::io::stdout().lock())),
    };

    let mut generator = ApplicantGenerator::new(args.seed);
    let (mut regular, mut risky, mut invalid) = (0u64, 0u64, 0u64);

    for _ in 0..args.count {
        let roll: f64 = generator.rng.gen();
        let record = if roll < args.invalid_rate {
            invalid += 1;
            generator.generate_invalid()
        } else if roll < args.invalid_rate + args.risky_rate {
            risky += 1;
            generator.generate_risky()
        } else {
            regular += 1;
            generator.generate_regular()
        };

        serde_json::to_writer(&mut writer, &record)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;

    info!(regular, risky, invalid, "Completed");
    Ok(())
}
