pub mod handlers;
pub mod request_id;
pub mod server;

use std::sync::Arc;

use pkg_metrics::MetricsRegistry;
use pkg_quota::QuotaAdmission;
use pkg_state::QuotaClient;

/// Shared application state injected into all Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub quotas: QuotaClient,
    pub admission: QuotaAdmission,
    pub metrics: Arc<MetricsRegistry>,
}
