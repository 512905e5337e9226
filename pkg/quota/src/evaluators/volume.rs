use async_trait::async_trait;
use pkg_types::object::{DynamicObject, GroupKind};
use pkg_types::quota::{QuotaScope, ScopeRequirement};
use pkg_types::resources::{RESOURCE_REQUESTS_STORAGE, ResourceList, object_count_name};
use pkg_types::volume::{STORAGE_GROUP, VOLUME_KIND, VOLUME_RESOURCE, VolumeSpec};

use super::{decode_spec, insert, is_storage_class_resource, one, storage_class_resource};
use crate::error::QuotaError;
use crate::evaluator::Evaluator;
use crate::scope::matches_value;

/// Charges volumes for their size, in total and per storage class.
pub struct VolumeEvaluator {
    kind: GroupKind,
    count_name: String,
}

impl VolumeEvaluator {
    pub fn new() -> Self {
        Self {
            kind: GroupKind::new(STORAGE_GROUP, VOLUME_KIND),
            count_name: object_count_name(STORAGE_GROUP, VOLUME_RESOURCE),
        }
    }
}

impl Default for VolumeEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Evaluator for VolumeEvaluator {
    fn group_kind(&self) -> &GroupKind {
        &self.kind
    }

    fn resource(&self) -> &str {
        VOLUME_RESOURCE
    }

    fn matches_resource_name(&self, name: &str) -> bool {
        name == self.count_name
            || name == VOLUME_RESOURCE
            || name == RESOURCE_REQUESTS_STORAGE
            || is_storage_class_resource(name, RESOURCE_REQUESTS_STORAGE)
            || is_storage_class_resource(name, VOLUME_RESOURCE)
    }

    /// Volumes are never preemptible, so preemption-scoped quotas skip them.
    fn matches_scope_requirement(
        &self,
        object: &DynamicObject,
        requirement: &ScopeRequirement,
    ) -> Result<bool, QuotaError> {
        match requirement.scope_name {
            QuotaScope::Class => {
                let spec: VolumeSpec = decode_spec(object)?;
                Ok(matches_value(requirement, spec.storage_class.as_deref()))
            }
            QuotaScope::Preemptible | QuotaScope::NotPreemptible => Ok(false),
        }
    }

    async fn usage(&self, object: &DynamicObject) -> Result<ResourceList, QuotaError> {
        let spec: VolumeSpec = decode_spec(object)?;
        let mut usage = ResourceList::new();
        insert(&mut usage, &self.count_name, one());
        insert(&mut usage, VOLUME_RESOURCE, one());
        insert(&mut usage, RESOURCE_REQUESTS_STORAGE, spec.size);
        if let Some(class) = spec.storage_class.as_deref() {
            insert(
                &mut usage,
                &storage_class_resource(class, RESOURCE_REQUESTS_STORAGE),
                spec.size,
            );
            insert(&mut usage, &storage_class_resource(class, VOLUME_RESOURCE), one());
        }
        Ok(usage)
    }
}
