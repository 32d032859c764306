//! # Metrics
//!
//! Prometheus metrics for monitoring the operator.
//!
//! ## Metrics Exposed
//!
//! - `hubcluster_reconciliations_total` - Total number of reconcile cycles
//! - `hubcluster_reconciliation_errors_total` - Total number of failed reconcile cycles
//! - `hubcluster_reconciliation_duration_seconds` - Duration of reconcile cycles
//! - `hubcluster_teardowns_total` - Total number of teardowns of deleted instances
//! - `hubcluster_resources_applied_total` - Total number of manifest resources applied
//! - `hubcluster_resources_deleted_total` - Total number of manifest resources deleted
//! - `hubcluster_manifest_reparse_failures_total` - Total number of failed manifest reparses
//! - `hubcluster_requeues_total` - Total number of requeues by reason

use anyhow::Result;
use prometheus::{Histogram, IntCounter, IntCounterVec, Registry};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "hubcluster_reconciliations_total",
        "Total number of reconcile cycles",
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "hubcluster_reconciliation_errors_total",
        "Total number of failed reconcile cycles",
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "hubcluster_reconciliation_duration_seconds",
            "Duration of reconcile cycles in seconds",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static TEARDOWNS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "hubcluster_teardowns_total",
        "Total number of teardowns of deleted instances",
    )
    .expect("Failed to create TEARDOWNS_TOTAL metric - this should never happen")
});

static RESOURCES_APPLIED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "hubcluster_resources_applied_total",
        "Total number of manifest resources applied",
    )
    .expect("Failed to create RESOURCES_APPLIED_TOTAL metric - this should never happen")
});

static RESOURCES_DELETED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "hubcluster_resources_deleted_total",
        "Total number of manifest resources deleted",
    )
    .expect("Failed to create RESOURCES_DELETED_TOTAL metric - this should never happen")
});

static MANIFEST_REPARSE_FAILURES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "hubcluster_manifest_reparse_failures_total",
        "Total number of failed manifest reparses (previous manifest kept)",
    )
    .expect("Failed to create MANIFEST_REPARSE_FAILURES_TOTAL metric - this should never happen")
});

static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "hubcluster_requeues_total",
            "Total number of requeues by reason",
        ),
        &["reason"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

/// Register all metrics with the private registry
///
/// # Errors
///
/// Returns an error if a metric is registered twice.
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(TEARDOWNS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RESOURCES_APPLIED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RESOURCES_DELETED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(MANIFEST_REPARSE_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;

    Ok(())
}

pub fn increment_reconciliations() {
    RECONCILIATIONS_TOTAL.inc();
}

pub fn increment_reconciliation_errors() {
    RECONCILIATION_ERRORS_TOTAL.inc();
}

pub fn observe_reconciliation_duration(duration: f64) {
    RECONCILIATION_DURATION.observe(duration);
}

pub fn increment_teardowns() {
    TEARDOWNS_TOTAL.inc();
}

pub fn increment_resources_applied(count: u64) {
    RESOURCES_APPLIED_TOTAL.inc_by(count);
}

pub fn increment_resources_deleted(count: u64) {
    RESOURCES_DELETED_TOTAL.inc_by(count);
}

pub fn increment_manifest_reparse_failures() {
    MANIFEST_REPARSE_FAILURES_TOTAL.inc();
}

pub fn increment_requeues_total(reason: &str) {
    REQUEUES_TOTAL.with_label_values(&[reason]).inc();
}
