//! Prometheus metrics for the percolation engine
//!
//! Call [`init_metrics`] once at startup to register everything with the
//! engine's registry, then scrape [`gather_metrics`] from the host's metrics
//! endpoint.

use lazy_static::lazy_static;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

lazy_static! {
    /// Prometheus registry for all percolator metrics
    pub static ref PROMETHEUS_REGISTRY: Registry = Registry::new();

    /// Total number of percolation calls by terminal outcome
    ///
    /// Labels: outcome (completed, timed_out, rejected, parse_failed)
    pub static ref PERCOLATIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("percolations_total", "Total number of percolation calls")
            .namespace("percolator"),
        &["outcome"]
    ).expect("Failed to create PERCOLATIONS_TOTAL metric");

    /// Percolation call duration in seconds, submission to terminal state
    pub static ref PERCOLATION_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "percolation_duration_seconds",
            "Percolation call duration in seconds"
        )
        .namespace("percolator")
        .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
    ).expect("Failed to create PERCOLATION_DURATION_SECONDS metric");

    /// Number of queries currently registered
    pub static ref REGISTERED_QUERIES: IntGauge = IntGauge::with_opts(
        Opts::new("registered_queries", "Number of queries currently registered")
            .namespace("percolator")
    ).expect("Failed to create REGISTERED_QUERIES metric");

    /// Number of live evaluation pool workers
    pub static ref POOL_WORKERS: IntGauge = IntGauge::with_opts(
        Opts::new("pool_workers", "Number of live evaluation pool workers")
            .namespace("percolator")
    ).expect("Failed to create POOL_WORKERS metric");

    /// Bytes currently reserved for transient materialized documents
    pub static ref DOCUMENT_MEMORY_BYTES: IntGauge = IntGauge::with_opts(
        Opts::new("document_memory_bytes", "Bytes reserved for transient documents")
            .namespace("percolator")
    ).expect("Failed to create DOCUMENT_MEMORY_BYTES metric");
}

/// Register all metrics with the percolator registry
///
/// Safe to call once per process; a second call reports an
/// `AlreadyReg`-flavored error from prometheus.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    PROMETHEUS_REGISTRY.register(Box::new(PERCOLATIONS_TOTAL.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(PERCOLATION_DURATION_SECONDS.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(REGISTERED_QUERIES.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(POOL_WORKERS.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(DOCUMENT_MEMORY_BYTES.clone()))?;

    tracing::info!("Percolator metrics registered");
    Ok(())
}

/// Export all metrics in Prometheus text format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = PROMETHEUS_REGISTRY.gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return String::new();
    }

    String::from_utf8(buffer).unwrap_or_default()
}
