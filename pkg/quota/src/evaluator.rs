use async_trait::async_trait;
use parking_lot::RwLock;
use pkg_types::object::{DynamicObject, GroupKind};
use pkg_types::quota::ScopeRequirement;
use pkg_types::resources::ResourceList;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::error::QuotaError;

/// Quota plug-in for one governed kind.
/// Implementations: machines, volumes, buckets and plain object counts.
#[async_trait]
pub trait Evaluator: Send + Sync {
    /// Kind this evaluator governs.
    fn group_kind(&self) -> &GroupKind;

    /// Plural resource name, used by limited-resource rules and count names.
    fn resource(&self) -> &str;

    /// Whether this evaluator can produce usage for `name`.
    fn matches_resource_name(&self, name: &str) -> bool;

    /// Whether `object` satisfies one scope requirement of a quota.
    fn matches_scope_requirement(
        &self,
        object: &DynamicObject,
        requirement: &ScopeRequirement,
    ) -> Result<bool, QuotaError>;

    /// Resources consumed by `object`.
    async fn usage(&self, object: &DynamicObject) -> Result<ResourceList, QuotaError>;
}

/// Evaluators keyed by the kind they govern.
/// Written once at startup and read on every admission.
#[derive(Default)]
pub struct Registry {
    evaluators: RwLock<HashMap<GroupKind, Arc<dyn Evaluator>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an evaluator, replacing any previous one for the same kind.
    pub fn add(&self, evaluator: Arc<dyn Evaluator>) {
        let kind = evaluator.group_kind().clone();
        info!("Registered quota evaluator for {}", kind);
        self.evaluators.write().insert(kind, evaluator);
    }

    pub fn remove(&self, kind: &GroupKind) -> Option<Arc<dyn Evaluator>> {
        self.evaluators.write().remove(kind)
    }

    /// Evaluator for the kind of `object`. `None` means the kind is not
    /// quota-governed.
    pub fn get(&self, object: &DynamicObject) -> Option<Arc<dyn Evaluator>> {
        self.get_by_kind(&object.group_kind())
    }

    pub fn get_by_kind(&self, kind: &GroupKind) -> Option<Arc<dyn Evaluator>> {
        self.evaluators.read().get(kind).cloned()
    }

    pub fn list(&self) -> Vec<Arc<dyn Evaluator>> {
        let mut evaluators: Vec<_> = self.evaluators.read().values().cloned().collect();
        evaluators.sort_by(|a, b| a.group_kind().cmp(b.group_kind()));
        evaluators
    }
}
