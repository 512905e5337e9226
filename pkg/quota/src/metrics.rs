//! Metric names recorded by the quota engine.

use pkg_metrics::MetricsRegistry;

pub const EVALUATIONS_TOTAL: &str = "quota_admission_evaluations_total";
pub const BATCHES_TOTAL: &str = "quota_batches_total";
pub const BATCH_WAITERS_TOTAL: &str = "quota_batch_waiters_total";
pub const STATUS_UPDATES_TOTAL: &str = "quota_status_updates_total";
pub const UPDATE_CONFLICTS_TOTAL: &str = "quota_status_update_conflicts_total";
pub const LIVE_LOOKUPS_TOTAL: &str = "quota_live_lookups_total";
pub const OVERRIDE_HITS_TOTAL: &str = "quota_override_hits_total";
pub const PENDING_NAMESPACES: &str = "quota_pending_namespaces";

pub fn register(registry: &MetricsRegistry) {
    registry.register_counter(EVALUATIONS_TOTAL, "Quota admission verdicts by outcome");
    registry.register_counter(BATCHES_TOTAL, "Namespace batches processed");
    registry.register_counter(BATCH_WAITERS_TOTAL, "Admission requests processed in batches");
    registry.register_counter(STATUS_UPDATES_TOTAL, "Committed quota usage updates");
    registry.register_counter(UPDATE_CONFLICTS_TOTAL, "Quota usage updates lost to a concurrent writer");
    registry.register_counter(LIVE_LOOKUPS_TOTAL, "Quota lists served from the authoritative store");
    registry.register_counter(OVERRIDE_HITS_TOTAL, "Quota reads answered by a recently written copy");
    registry.register_gauge(PENDING_NAMESPACES, "Namespaces with queued admission requests");
}
