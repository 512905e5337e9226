use pkg_state::StoreError;
use pkg_types::quota::QuotaScope;
use pkg_types::resources::{ResourceList, pretty_print};
use std::sync::Arc;

/// Why a quota admission check did not allow a request.
#[derive(Debug, Clone, thiserror::Error)]
pub enum QuotaError {
    /// The request would push a quota's usage past its hard limit.
    /// Each list only carries the exceeded resource names.
    #[error(
        "exceeded quota: {quota}, requested: {}, used: {}, limited: {}",
        pretty_print(.requested),
        pretty_print(.used),
        pretty_print(.limited)
    )]
    Denied {
        quota: String,
        requested: ResourceList,
        used: ResourceList,
        limited: ResourceList,
    },

    #[error("quota usage is negative for resource(s): {}", .0.join(","))]
    NegativeUsage(Vec<String>),

    /// A limited resource was consumed with no quota covering it.
    #[error("insufficient quota to consume: {}", .0.join(","))]
    InsufficientQuota(Vec<String>),

    /// A matched quota has no usage entry for resources it limits, so the
    /// check cannot tell what is already consumed.
    #[error("status unknown for quota: {quota}, resources: {}", .resources.join(","))]
    StatusUnknown { quota: String, resources: Vec<String> },

    #[error("unable to match scope {scope}: {message}")]
    ScopeMatch { scope: QuotaScope, message: String },

    #[error("unable to compute usage of {object}: {message}")]
    Usage { object: String, message: String },

    #[error("invalid admission request: {0}")]
    InvalidObject(String),

    #[error("quota store error: {0}")]
    Store(Arc<StoreError>),

    #[error("quota evaluation timed out")]
    Timeout,

    #[error("quota evaluator is shutting down")]
    ShuttingDown,

    #[error("quota evaluation finished without a verdict")]
    Unresolved,
}

impl QuotaError {
    /// Client-visible rejections, as opposed to internal failures.
    pub fn is_denied(&self) -> bool {
        matches!(
            self,
            QuotaError::Denied { .. }
                | QuotaError::NegativeUsage(_)
                | QuotaError::InsufficientQuota(_)
        )
    }
}

impl From<StoreError> for QuotaError {
    fn from(e: StoreError) -> Self {
        QuotaError::Store(Arc::new(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkg_types::resources::resource_list;

    #[test]
    fn test_denied_message_names_amounts() {
        let err = QuotaError::Denied {
            quota: "compute".to_string(),
            requested: resource_list(&[("cpu", "5")]),
            used: resource_list(&[("cpu", "1")]),
            limited: resource_list(&[("cpu", "4")]),
        };
        assert_eq!(
            err.to_string(),
            "exceeded quota: compute, requested: cpu=5, used: cpu=1, limited: cpu=4"
        );
        assert!(err.is_denied());
    }

    #[test]
    fn test_internal_errors_are_not_denials() {
        assert!(!QuotaError::Timeout.is_denied());
        let unknown = QuotaError::StatusUnknown {
            quota: "compute".to_string(),
            resources: vec!["cpu".to_string(), "memory".to_string()],
        };
        assert!(!unknown.is_denied());
        assert_eq!(
            unknown.to_string(),
            "status unknown for quota: compute, resources: cpu,memory"
        );
        let store: QuotaError = StoreError::NotFound("team-a/q".to_string()).into();
        assert!(!store.is_denied());
        assert_eq!(store.to_string(), "quota store error: team-a/q not found");
    }
}
