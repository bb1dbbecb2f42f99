//! Metrics collection and export module

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::time::Instant;

/// Pipeline metrics registry
pub struct Metrics {
    registry: Registry,

    // Builder
    pub builds_total: IntCounter,
    pub build_failures: IntCounter,
    pub blockhash_fallbacks: IntCounter,

    // Account validation
    pub validations_total: IntCounter,
    pub validation_errors: IntCounter,
    pub validation_cache_hits: IntCounter,

    // Simulation
    pub simulations_total: IntCounter,
    pub simulation_cache_hits: IntCounter,
    pub simulation_cache_misses: IntCounter,
    pub preflight_failures: IntCounter,

    // Analysis
    pub analyses_total: IntCounter,
    pub analysis_cache_hits: IntCounter,

    // Network and caches
    pub rpc_errors: IntCounterVec,
    pub cache_evictions: IntCounter,

    // Histograms
    pub rpc_latency: Histogram,
    pub simulation_latency: Histogram,
    pub build_latency: Histogram,
}

impl Metrics {
    /// Create new metrics instance
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let builds_total = IntCounter::with_opts(Opts::new(
            "txforge_builds_total",
            "Total number of transaction builds attempted",
        ))?;

        let build_failures = IntCounter::with_opts(Opts::new(
            "txforge_build_failures_total",
            "Number of builds rejected by construction checks",
        ))?;

        let blockhash_fallbacks = IntCounter::with_opts(Opts::new(
            "txforge_blockhash_fallbacks_total",
            "Number of builds that used the placeholder blockhash",
        ))?;

        let validations_total = IntCounter::with_opts(Opts::new(
            "txforge_validations_total",
            "Number of account validation runs",
        ))?;

        let validation_errors = IntCounter::with_opts(Opts::new(
            "txforge_validation_errors_total",
            "Number of per-account validation errors",
        ))?;

        let validation_cache_hits = IntCounter::with_opts(Opts::new(
            "txforge_validation_cache_hits_total",
            "Account statuses served from cache",
        ))?;

        let simulations_total = IntCounter::with_opts(Opts::new(
            "txforge_simulations_total",
            "Number of simulate calls",
        ))?;

        let simulation_cache_hits = IntCounter::with_opts(Opts::new(
            "txforge_simulation_cache_hits_total",
            "Simulations served from cache",
        ))?;

        let simulation_cache_misses = IntCounter::with_opts(Opts::new(
            "txforge_simulation_cache_misses_total",
            "Simulations that required a network dry-run",
        ))?;

        let preflight_failures = IntCounter::with_opts(Opts::new(
            "txforge_preflight_failures_total",
            "Simulations rejected by account preflight",
        ))?;

        let analyses_total = IntCounter::with_opts(Opts::new(
            "txforge_analyses_total",
            "Number of simulation analyses computed",
        ))?;

        let analysis_cache_hits = IntCounter::with_opts(Opts::new(
            "txforge_analysis_cache_hits_total",
            "Analyses served from cache",
        ))?;

        let rpc_errors = IntCounterVec::new(
            Opts::new("txforge_rpc_errors_total", "Network collaborator errors"),
            &["category"],
        )?;

        let cache_evictions = IntCounter::with_opts(Opts::new(
            "txforge_cache_evictions_total",
            "Entries evicted from bounded caches",
        ))?;

        let rpc_latency = Histogram::with_opts(
            HistogramOpts::new("txforge_rpc_latency_seconds", "RPC call latency")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        )?;

        let simulation_latency = Histogram::with_opts(
            HistogramOpts::new("txforge_simulation_latency_seconds", "End-to-end simulate latency")
                .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0]),
        )?;

        let build_latency = Histogram::with_opts(
            HistogramOpts::new("txforge_build_latency_seconds", "Transaction build latency")
                .buckets(vec![0.0001, 0.001, 0.005, 0.01, 0.05, 0.1]),
        )?;

        registry.register(Box::new(builds_total.clone()))?;
        registry.register(Box::new(build_failures.clone()))?;
        registry.register(Box::new(blockhash_fallbacks.clone()))?;
        registry.register(Box::new(validations_total.clone()))?;
        registry.register(Box::new(validation_errors.clone()))?;
        registry.register(Box::new(validation_cache_hits.clone()))?;
        registry.register(Box::new(simulations_total.clone()))?;
        registry.register(Box::new(simulation_cache_hits.clone()))?;
        registry.register(Box::new(simulation_cache_misses.clone()))?;
        registry.register(Box::new(preflight_failures.clone()))?;
        registry.register(Box::new(analyses_total.clone()))?;
        registry.register(Box::new(analysis_cache_hits.clone()))?;
        registry.register(Box::new(rpc_errors.clone()))?;
        registry.register(Box::new(cache_evictions.clone()))?;
        registry.register(Box::new(rpc_latency.clone()))?;
        registry.register(Box::new(simulation_latency.clone()))?;
        registry.register(Box::new(build_latency.clone()))?;

        Ok(Self {
            registry,
            builds_total,
            build_failures,
            blockhash_fallbacks,
            validations_total,
            validation_errors,
            validation_cache_hits,
            simulations_total,
            simulation_cache_hits,
            simulation_cache_misses,
            preflight_failures,
            analyses_total,
            analysis_cache_hits,
            rpc_errors,
            cache_evictions,
            rpc_latency,
            simulation_latency,
            build_latency,
        })
    }

    /// Get the registry for exporting
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record a network error under its category label
    pub fn record_rpc_error(&self, category: &str) {
        self.rpc_errors.with_label_values(&[category]).inc();
    }

    /// Render all metrics in the Prometheus text format
    pub fn render(&self) -> anyhow::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("Failed to create metrics")
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
        histogram.observe(self.start.elapsed().as_secs_f64());
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
