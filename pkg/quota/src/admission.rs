use pkg_constants::quota::ADMISSION_TIMEOUT_SECS;
use pkg_metrics::MetricsRegistry;
use pkg_types::admission::{AdmissionRequest, AdmissionResponse, Operation};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::coordinator::{Attributes, QuotaCoordinator};
use crate::error::QuotaError;
use crate::metrics::EVALUATIONS_TOTAL;

/// Admission plug-in that enforces resource quotas.
#[derive(Clone)]
pub struct QuotaAdmission {
    coordinator: QuotaCoordinator,
    timeout: Duration,
    metrics: Arc<MetricsRegistry>,
}

impl QuotaAdmission {
    pub fn new(coordinator: QuotaCoordinator, metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            coordinator,
            timeout: Duration::from_secs(ADMISSION_TIMEOUT_SECS),
            metrics,
        }
    }

    /// Override how long a request may wait for its verdict.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn coordinator(&self) -> &QuotaCoordinator {
        &self.coordinator
    }

    /// Whether quota applies to `request` at all. Subresources, cluster-scoped
    /// objects, namespace creation, deletes and connects pass through.
    pub fn handles(&self, request: &AdmissionRequest) -> bool {
        request.subresource.is_empty()
            && !request.namespace.is_empty()
            && !request.is_namespace_creation()
            && matches!(request.operation, Operation::Create | Operation::Update)
    }

    /// Check `request` against the namespace's quotas.
    pub async fn validate(&self, request: &AdmissionRequest) -> Result<(), QuotaError> {
        if !self.handles(request) {
            self.metrics
                .counter_inc_with(EVALUATIONS_TOTAL, &[("outcome", "not_applicable")]);
            return Ok(());
        }
        let object = request
            .object
            .clone()
            .ok_or_else(|| QuotaError::InvalidObject("request carries no object".to_string()))?;
        let attributes = Attributes {
            namespace: request.namespace.clone(),
            operation: request.operation,
            object,
            old_object: request.old_object.clone(),
            dry_run: request.dry_run,
        };

        match tokio::time::timeout(self.timeout, self.coordinator.evaluate(attributes)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    uid = %request.uid,
                    namespace = %request.namespace,
                    "Quota evaluation timed out after {:?}",
                    self.timeout
                );
                self.metrics
                    .counter_inc_with(EVALUATIONS_TOTAL, &[("outcome", "timeout")]);
                Err(QuotaError::Timeout)
            }
        }
    }

    /// Run [`validate`](Self::validate) and shape the verdict as an admission response.
    pub async fn review(&self, request: &AdmissionRequest) -> AdmissionResponse {
        match self.validate(request).await {
            Ok(()) => AdmissionResponse::allow(&request.uid),
            Err(e) => {
                let (code, reason) = status_for(&e);
                if e.is_denied() {
                    info!(uid = %request.uid, namespace = %request.namespace, "Denied by quota: {}", e);
                }
                AdmissionResponse::deny(&request.uid, code, reason, e.to_string())
            }
        }
    }
}

/// HTTP-style status code and reason for a failed check.
pub fn status_for(err: &QuotaError) -> (u16, &'static str) {
    match err {
        e if e.is_denied() => (403, "Forbidden"),
        QuotaError::InvalidObject(_) => (400, "BadRequest"),
        QuotaError::Timeout => (504, "Timeout"),
        QuotaError::ShuttingDown => (503, "ServiceUnavailable"),
        _ => (500, "InternalError"),
    }
}
