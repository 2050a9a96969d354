//! Metrics collection and export module

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, Opts, Registry, TextEncoder};
use std::time::Instant;

/// Global metrics registry
pub struct Metrics {
    registry: Registry,

    // Counters
    pub purchase_attempts: IntCounter,
    pub purchases_succeeded: IntCounter,
    pub purchases_failed: IntCounter,
    pub approvals_submitted: IntCounter,
    pub jobs_aborted: IntCounter,
    pub jobs_faulted: IntCounter,

    // Histograms
    pub confirmation_latency: Histogram,
}

impl Metrics {
    /// Create new metrics instance
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let purchase_attempts = IntCounter::with_opts(Opts::new(
            "purchase_attempts_total",
            "Purchase transaction submissions, retries included",
        ))?;

        let purchases_succeeded = IntCounter::with_opts(Opts::new(
            "purchases_succeeded_total",
            "Tiers bought with a confirmed transaction",
        ))?;

        let purchases_failed = IntCounter::with_opts(Opts::new(
            "purchases_failed_total",
            "Tiers that exhausted their attempt budget",
        ))?;

        let approvals_submitted = IntCounter::with_opts(Opts::new(
            "approvals_submitted_total",
            "Spending approval transactions submitted",
        ))?;

        let jobs_aborted = IntCounter::with_opts(Opts::new(
            "jobs_aborted_total",
            "Account jobs stopped during preparation",
        ))?;

        let jobs_faulted = IntCounter::with_opts(Opts::new(
            "jobs_faulted_total",
            "Account jobs that crashed and were contained",
        ))?;

        let confirmation_latency = Histogram::with_opts(
            HistogramOpts::new(
                "confirmation_latency_seconds",
                "Submit-to-confirmation latency of successful purchases",
            )
            .buckets(vec![0.25, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
        )?;

        registry.register(Box::new(purchase_attempts.clone()))?;
        registry.register(Box::new(purchases_succeeded.clone()))?;
        registry.register(Box::new(purchases_failed.clone()))?;
        registry.register(Box::new(approvals_submitted.clone()))?;
        registry.register(Box::new(jobs_aborted.clone()))?;
        registry.register(Box::new(jobs_faulted.clone()))?;
        registry.register(Box::new(confirmation_latency.clone()))?;

        Ok(Self {
            registry,
            purchase_attempts,
            purchases_succeeded,
            purchases_failed,
            approvals_submitted,
            jobs_aborted,
            jobs_faulted,
            confirmation_latency,
        })
    }

    /// Prometheus text exposition of every registered metric
    pub fn render(&self) -> anyhow::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Global metrics instance
pub fn metrics() -> &'static Metrics {
    static METRICS: once_cell::sync::Lazy<Metrics> =
        once_cell::sync::Lazy::new(|| Metrics::new().expect("Failed to initialize metrics"));
    &METRICS
}

/// Timer helper for measuring operation duration
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn observe_duration(&self, histogram: &Histogram) {
        histogram.observe(self.elapsed_secs());
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
