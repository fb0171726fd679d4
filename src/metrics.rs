//! Prometheus metrics for storage reconciliation

use crate::error::{Error, Result};
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};
use std::time::Duration;

/// Reconcile outcome labels
pub const OUTCOME_READY: &str = "ready";
pub const OUTCOME_NOT_READY: &str = "not_ready";
pub const OUTCOME_UNKNOWN: &str = "unknown";
pub const OUTCOME_CONVERGED: &str = "converged";

/// Operator metrics
#[derive(Clone)]
pub struct Metrics {
    reconciles: IntCounterVec,
    duration: HistogramVec,
}

impl Metrics {
    /// Create metrics and register them with `registry`
    pub fn new(registry: &Registry) -> Result<Self> {
        let reconciles = IntCounterVec::new(
            Opts::new(
                "cluster_storage_reconciles_total",
                "Storage reconciliations by storage kind and outcome",
            ),
            &["kind", "outcome"],
        )
        .map_err(metrics_error)?;

        let duration = HistogramVec::new(
            HistogramOpts::new(
                "cluster_storage_reconcile_duration_seconds",
                "Duration of storage reconciliations",
            ),
            &["kind"],
        )
        .map_err(metrics_error)?;

        registry
            .register(Box::new(reconciles.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(duration.clone()))
            .map_err(metrics_error)?;

        Ok(Self {
            reconciles,
            duration,
        })
    }

    /// Record one reconciliation
    pub fn observe(&self, kind: &str, outcome: &str, elapsed: Duration) {
        self.reconciles.with_label_values(&[kind, outcome]).inc();
        self.duration
            .with_label_values(&[kind])
            .observe(elapsed.as_secs_f64());
    }

    /// Number of reconciliations recorded for a kind and outcome
    pub fn count(&self, kind: &str, outcome: &str) -> u64 {
        self.reconciles.with_label_values(&[kind, outcome]).get()
    }
}

fn metrics_error(e: prometheus::Error) -> Error {
    Error::Internal(format!("Metrics registration failed: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observe_counts_by_outcome() {
        let registry = Registry::new();
        let metrics = Metrics::new(&registry).unwrap();

        metrics.observe("s3", OUTCOME_READY, Duration::from_millis(5));
        metrics.observe("s3", OUTCOME_READY, Duration::from_millis(7));
        metrics.observe("inCluster", OUTCOME_UNKNOWN, Duration::from_millis(3));

        assert_eq!(metrics.count("s3", OUTCOME_READY), 2);
        assert_eq!(metrics.count("inCluster", OUTCOME_UNKNOWN), 1);
        assert_eq!(metrics.count("inCluster", OUTCOME_READY), 0);
    }

    #[test]
    fn test_double_registration_fails() {
        let registry = Registry::new();
        Metrics::new(&registry).unwrap();
        assert!(Metrics::new(&registry).is_err());
    }
}
