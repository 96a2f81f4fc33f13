//! Scoring run statistics.

use crate::error::ScoringError;
use crate::types::assessment::{RiskAssessment, RiskLabel};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

/// Metrics collector for a scoring run
pub struct ScoringMetrics {
    /// Records that produced an assessment
    pub records_scored: AtomicU64,
    /// Records rejected by any stage
    pub records_failed: AtomicU64,
    high_risk: AtomicU64,
    low_risk: AtomicU64,
    /// Failures by error kind
    errors_by_kind: RwLock<BTreeMap<&'static str, u64>>,
    /// Processing times (in microseconds)
    processing_times: RwLock<Vec<u64>>,
    /// Probability distribution buckets
    probability_buckets: RwLock<[u64; 10]>,
    start_time: Instant,
}

impl ScoringMetrics {
    pub fn new() -> Self {
        Self {
            records_scored: AtomicU64::new(0),
            records_failed: AtomicU64::new(0),
            high_risk: AtomicU64::new(0),
            low_risk: AtomicU64::new(0),
            errors_by_kind: RwLock::new(BTreeMap::new()),
            processing_times: RwLock::new(Vec::with_capacity(1000)),
            probability_buckets: RwLock::new([0; 10]),
            start_time: Instant::now(),
        }
    }

    /// Record a successful assessment
    pub fn record_assessment(&self, processing_time: Duration, assessment: &RiskAssessment) {
        self.records_scored.fetch_add(1, Ordering::Relaxed);
        match assessment.label {
            RiskLabel::AltoRisco => self.high_risk.fetch_add(1, Ordering::Relaxed),
            RiskLabel::BaixoRisco => self.low_risk.fetch_add(1, Ordering::Relaxed),
        };

        if let Ok(mut times) = self.processing_times.write() {
            times.push(processing_time.as_micros() as u64);
            // Keep only the most recent samples
            if times.len() > 10000 {
                times.drain(0..5000);
            }
        }

        let bucket = (assessment.probability * 10.0).clamp(0.0, 9.0) as usize;
        if let Ok(mut buckets) = self.probability_buckets.write() {
            buckets[bucket] += 1;
        }
    }

    /// Record a rejected record
    pub fn record_failure(&self, error: &ScoringError) {
        self.records_failed.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut by_kind) = self.errors_by_kind.write() {
            *by_kind.entry(error.kind()).or_insert(0) += 1;
        }
    }

    pub fn get_processing_stats(&self) -> ProcessingStats {
        let mut sorted = match self.processing_times.read() {
            Ok(times) => times.clone(),
            Err(_) => return ProcessingStats::default(),
        };
        if sorted.is_empty() {
            return ProcessingStats::default();
        }
        sorted.sort_unstable();

        let count = sorted.len();
        let percentile = |p: f64| sorted[((count as f64 * p) as usize).min(count - 1)];

        ProcessingStats {
            count: count as u64,
            mean_us: sorted.iter().sum::<u64>() / count as u64,
            p50_us: percentile(0.50),
            p95_us: percentile(0.95),
            p99_us: percentile(0.99),
            max_us: sorted[count - 1],
        }
    }

    /// Records (scored or failed) per second since start
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.total() as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn total(&self) -> u64 {
        self.records_scored.load(Ordering::Relaxed) + self.records_failed.load(Ordering::Relaxed)
    }

    /// (ALTO_RISCO, BAIXO_RISCO) counts
    pub fn get_label_counts(&self) -> (u64, u64) {
        (
            self.high_risk.load(Ordering::Relaxed),
            self.low_risk.load(Ordering::Relaxed),
        )
    }

    pub fn get_error_counts(&self) -> BTreeMap<&'static str, u64> {
        self.errors_by_kind
            .read()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    pub fn get_probability_distribution(&self) -> [u64; 10] {
        self.probability_buckets
            .read()
            .map(|b| *b)
            .unwrap_or([0; 10])
    }

    /// Log summary statistics
    pub fn print_summary(&self) {
        let scored = self.records_scored.load(Ordering::Relaxed);
        let failed = self.records_failed.load(Ordering::Relaxed);
        let (high, low) = self.get_label_counts();
        let high_rate = if scored > 0 {
            (high as f64 / scored as f64) * 100.0
        } else {
            0.0
        };
        let processing = self.get_processing_stats();

        info!("╔══════════════════════════════════════════════════════════════╗");
        info!("║             CREDIT RISK SCORING - RUN SUMMARY                ║");
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Records Scored: {:>8}  │  Failed: {:>8}  │ {:>7.1} rec/s ║",
            scored,
            failed,
            self.get_throughput()
        );
        info!(
            "║ ALTO_RISCO: {:>8} ({:>5.1}%)  │  BAIXO_RISCO: {:>8}        ║",
            high, high_rate, low
        );
        info!(
            "║ Processing Time (μs): mean={:>5} p50={:>5} p95={:>5} p99={:>5} ║",
            processing.mean_us, processing.p50_us, processing.p95_us, processing.p99_us
        );

        let errors = self.get_error_counts();
        if !errors.is_empty() {
            info!("╠══════════════════════════════════════════════════════════════╣");
            info!("║ Failures by Kind:                                            ║");
            for (kind, count) in &errors {
                info!("║   {:28}: {:>8}                       ║", kind, count);
            }
        }

        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ Default Probability Distribution:                            ║");
        let dist = self.get_probability_distribution();
        let total: u64 = dist.iter().sum();
        for (i, &count) in dist.iter().enumerate() {
            let pct = if total > 0 {
                (count as f64 / total as f64) * 100.0
            } else {
                0.0
            };
            let bar: String = "█".repeat(((pct / 2.0) as usize).min(20));
            info!(
                "║   {:.1}-{:.1}: {:>6} ({:>5.1}%) {}",
                i as f64 / 10.0,
                (i + 1) as f64 / 10.0,
                count,
                pct,
                bar
            );
        }
        info!("╚══════════════════════════════════════════════════════════════╝");
    }
}

impl Default for ScoringMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Processing time statistics
#[derive(Debug, Default)]
pub struct ProcessingStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Prints a summary every `interval_secs` while a long batch runs
pub struct MetricsReporter {
    metrics: Arc<ScoringMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<ScoringMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs.max(1)));
        // The first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}
