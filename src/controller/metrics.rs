//! Prometheus metrics for the Open Liberty operator
//!
//! # Exported metrics
//! The `/metrics` endpoint (when built with `--features metrics`) exports:
//! - `openliberty_reconcile_duration_seconds` (histogram): reconcile duration labeled by controller.
//! - `openliberty_reconcile_errors_total` (counter): reconcile errors labeled by controller and kind.
//! - `openliberty_child_resource_operations_total` (counter): create/update/delete calls
//!   labeled by child kind and operation.

use std::sync::atomic::AtomicU64;

use once_cell::sync::Lazy;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;

/// Labels for operator reconcile metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ReconcileLabels {
    /// Controller name, e.g. "openlibertyapplication"
    pub controller: String,
}

/// Labels for operator error metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ErrorLabels {
    pub controller: String,
    /// Error kind, see `Error::kind`
    pub kind: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ChildLabels {
    /// Child resource kind, e.g. "Deployment"
    pub kind: String,
    /// "create", "update" or "delete"
    pub operation: String,
}

/// Histogram tracking reconcile duration (seconds)
pub static RECONCILE_DURATION_SECONDS: Lazy<Family<ReconcileLabels, Histogram>> = Lazy::new(|| {
    fn reconcile_histogram() -> Histogram {
        // 1ms .. ~32s across 16 buckets.
        Histogram::new(exponential_buckets(0.001, 2.0, 16))
    }

    Family::new_with_constructor(reconcile_histogram)
});

pub static RECONCILE_ERRORS_TOTAL: Lazy<Family<ErrorLabels, Counter<u64, AtomicU64>>> =
    Lazy::new(Family::default);

pub static CHILD_RESOURCE_OPERATIONS_TOTAL: Lazy<Family<ChildLabels, Counter<u64, AtomicU64>>> =
    Lazy::new(Family::default);

/// Global metrics registry
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let mut registry = Registry::default();

    registry.register(
        "openliberty_reconcile_duration_seconds",
        "Duration of reconcile loops in seconds",
        RECONCILE_DURATION_SECONDS.clone(),
    );
    registry.register(
        "openliberty_reconcile_errors_total",
        "Total number of reconcile errors",
        RECONCILE_ERRORS_TOTAL.clone(),
    );
    registry.register(
        "openliberty_child_resource_operations_total",
        "Child resources created, updated or deleted by the operator",
        CHILD_RESOURCE_OPERATIONS_TOTAL.clone(),
    );
    registry
});

/// Observe a reconcile duration in seconds.
pub fn observe_reconcile_duration_seconds(controller: &str, seconds: f64) {
    let labels = ReconcileLabels {
        controller: controller.to_string(),
    };
    RECONCILE_DURATION_SECONDS
        .get_or_create(&labels)
        .observe(seconds);
}

/// Increment the reconcile error counter.
pub fn inc_reconcile_error(controller: &str, kind: &str) {
    let labels = ErrorLabels {
        controller: controller.to_string(),
        kind: kind.to_string(),
    };
    RECONCILE_ERRORS_TOTAL.get_or_create(&labels).inc();
}

pub fn inc_child_operation(kind: &str, operation: &str) {
    let labels = ChildLabels {
        kind: kind.to_string(),
        operation: operation.to_string(),
    };
    CHILD_RESOURCE_OPERATIONS_TOTAL.get_or_create(&labels).inc();
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus_client::encoding::text::encode;

    #[test]
    fn test_registry_exports_operator_metrics() {
        observe_reconcile_duration_seconds("openlibertyapplication", 0.2);
        inc_reconcile_error("openlibertyapplication", "validation");
        inc_child_operation("Deployment", "create");

        let mut out = String::new();
        encode(&mut out, &REGISTRY).unwrap();
        assert!(out.contains("openliberty_reconcile_duration_seconds"));
        assert!(out.contains("kind=\"validation\""));
        assert!(out.contains("operation=\"create\""));
    }

    #[test]
    fn test_child_counter_increments() {
        let labels = ChildLabels {
            kind: "Route".to_string(),
            operation: "delete".to_string(),
        };
        let before = CHILD_RESOURCE_OPERATIONS_TOTAL.get_or_create(&labels).get();
        inc_child_operation("Route", "delete");
        assert_eq!(
            CHILD_RESOURCE_OPERATIONS_TOTAL.get_or_create(&labels).get(),
            before + 1
        );
    }
}
