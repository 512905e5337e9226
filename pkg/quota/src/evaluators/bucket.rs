use async_trait::async_trait;
use pkg_types::bucket::{BUCKET_KIND, BUCKET_RESOURCE, BucketSpec};
use pkg_types::object::{DynamicObject, GroupKind};
use pkg_types::quota::{QuotaScope, ScopeRequirement};
use pkg_types::resources::{RESOURCE_REQUESTS_STORAGE, ResourceList, object_count_name};
use pkg_types::volume::STORAGE_GROUP;

use super::{decode_spec, insert, is_storage_class_resource, one, storage_class_resource};
use crate::error::QuotaError;
use crate::evaluator::Evaluator;
use crate::scope::matches_value;

/// Charges buckets by count, and by size limit when one is set.
pub struct BucketEvaluator {
    kind: GroupKind,
    count_name: String,
}

impl BucketEvaluator {
    pub fn new() -> Self {
        Self {
            kind: GroupKind::new(STORAGE_GROUP, BUCKET_KIND),
            count_name: object_count_name(STORAGE_GROUP, BUCKET_RESOURCE),
        }
    }
}

impl Default for BucketEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Evaluator for BucketEvaluator {
    fn group_kind(&self) -> &GroupKind {
        &self.kind
    }

    fn resource(&self) -> &str {
        BUCKET_RESOURCE
    }

    fn matches_resource_name(&self, name: &str) -> bool {
        name == self.count_name
            || name == BUCKET_RESOURCE
            || name == RESOURCE_REQUESTS_STORAGE
            || is_storage_class_resource(name, RESOURCE_REQUESTS_STORAGE)
            || is_storage_class_resource(name, BUCKET_RESOURCE)
    }

    fn matches_scope_requirement(
        &self,
        object: &DynamicObject,
        requirement: &ScopeRequirement,
    ) -> Result<bool, QuotaError> {
        match requirement.scope_name {
            QuotaScope::Class => {
                let spec: BucketSpec = decode_spec(object)?;
                Ok(matches_value(requirement, spec.storage_class.as_deref()))
            }
            QuotaScope::Preemptible | QuotaScope::NotPreemptible => Ok(false),
        }
    }

    async fn usage(&self, object: &DynamicObject) -> Result<ResourceList, QuotaError> {
        let spec: BucketSpec = decode_spec(object)?;
        let mut usage = ResourceList::new();
        insert(&mut usage, &self.count_name, one());
        insert(&mut usage, BUCKET_RESOURCE, one());
        if let Some(class) = spec.storage_class.as_deref() {
            insert(&mut usage, &storage_class_resource(class, BUCKET_RESOURCE), one());
        }
        if let Some(limit) = spec.size_limit {
            insert(&mut usage, RESOURCE_REQUESTS_STORAGE, limit);
            if let Some(class) = spec.storage_class.as_deref() {
                insert(
                    &mut usage,
                    &storage_class_resource(class, RESOURCE_REQUESTS_STORAGE),
                    limit,
                );
            }
        }
        Ok(usage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkg_types::resources::resource_list;
    use serde_json::json;

    fn bucket(spec: serde_json::Value) -> DynamicObject {
        DynamicObject::new(&GroupKind::new(STORAGE_GROUP, BUCKET_KIND), "team-a", "logs", spec)
    }

    #[tokio::test]
    async fn test_unbounded_bucket_only_counts() {
        let usage = BucketEvaluator::new().usage(&bucket(json!({}))).await.unwrap();
        assert_eq!(
            usage,
            resource_list(&[("count/buckets.storage", "1"), ("buckets", "1")])
        );
    }

    #[tokio::test]
    async fn test_size_limit_charges_storage() {
        let object = bucket(json!({ "storage_class": "cold", "size_limit": "1Ti" }));
        let usage = BucketEvaluator::new().usage(&object).await.unwrap();
        assert_eq!(usage.get("requests.storage").map(|q| q.to_string()), Some("1Ti".to_string()));
        assert_eq!(
            usage.get("cold.storageclass.storage/requests.storage").map(|q| q.to_string()),
            Some("1Ti".to_string())
        );
        assert!(usage.contains_key("cold.storageclass.storage/buckets"));
    }
}
