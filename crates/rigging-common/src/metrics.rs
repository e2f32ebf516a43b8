//! Metrics registry for Rigging observability
//!
//! OpenTelemetry instruments on the global meter. They are no-ops until
//! `telemetry::init_telemetry` installs a meter provider.

use once_cell::sync::Lazy;
use opentelemetry::global;
use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::KeyValue;

/// Global meter for Rigging metrics
static METER: Lazy<Meter> = Lazy::new(|| global::meter("rigging"));

// ============================================================================
// Mutation Pipeline Metrics
// ============================================================================

/// Counter of candidate objects processed by the mutation pipeline
///
/// Labels:
/// - `kind`: candidate kind (RoleBinding, ConfigMap, ...)
/// - `result`: unchanged, mutated, failed, cancelled, short_circuited
pub static MUTATIONS_TOTAL: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("rigging_mutations_total")
        .with_description("Candidate objects processed by the mutation pipeline")
        .with_unit("{objects}")
        .build()
});

/// Histogram of a full pipeline run
pub static MUTATION_PIPELINE_DURATION: Lazy<Histogram<f64>> = Lazy::new(|| {
    METER
        .f64_histogram("rigging_mutation_pipeline_duration_seconds")
        .with_description("Duration of one mutation pipeline run in seconds")
        .with_unit("s")
        .build()
});

// ============================================================================
// Component Reconcile Metrics
// ============================================================================

/// Counter of component reconciliations
///
/// Labels:
/// - `result`: ready, failed, waiting, cancelled
pub static COMPONENT_RECONCILE_TOTAL: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("rigging_component_reconcile_total")
        .with_description("Component reconciliations by result")
        .with_unit("{reconciles}")
        .build()
});

/// Record one processed candidate
pub fn record_mutation(kind: &str, result: &'static str) {
    MUTATIONS_TOTAL.add(
        1,
        &[
            KeyValue::new("kind", kind.to_string()),
            KeyValue::new("result", result),
        ],
    );
}

/// Record the duration of a pipeline run
pub fn record_pipeline_duration(seconds: f64) {
    MUTATION_PIPELINE_DURATION.record(seconds, &[]);
}

/// Record one component reconcile result
pub fn record_reconcile(result: &'static str) {
    COMPONENT_RECONCILE_TOTAL.add(1, &[KeyValue::new("result", result)]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_provider_is_a_noop() {
        record_mutation("RoleBinding", "unchanged");
        record_pipeline_duration(0.01);
        record_reconcile("ready");
    }
}
