use async_trait::async_trait;
use pkg_types::object::{DynamicObject, GroupKind};
use pkg_types::quota::ScopeRequirement;
use pkg_types::resources::{ResourceList, object_count_name};

use super::{insert, one};
use crate::error::QuotaError;
use crate::evaluator::Evaluator;

/// Counts objects of any kind as `count/<resource>.<group>`.
/// Scoped quotas never apply to plain object counts.
pub struct ObjectCountEvaluator {
    kind: GroupKind,
    resource: String,
    count_name: String,
}

impl ObjectCountEvaluator {
    pub fn new(kind: &GroupKind, resource: &str) -> Self {
        Self {
            kind: kind.clone(),
            resource: resource.to_string(),
            count_name: object_count_name(&kind.group, resource),
        }
    }
}

#[async_trait]
impl Evaluator for ObjectCountEvaluator {
    fn group_kind(&self) -> &GroupKind {
        &self.kind
    }

    fn resource(&self) -> &str {
        &self.resource
    }

    fn matches_resource_name(&self, name: &str) -> bool {
        name == self.count_name
    }

    fn matches_scope_requirement(
        &self,
        _object: &DynamicObject,
        _requirement: &ScopeRequirement,
    ) -> Result<bool, QuotaError> {
        Ok(false)
    }

    async fn usage(&self, _object: &DynamicObject) -> Result<ResourceList, QuotaError> {
        let mut usage = ResourceList::new();
        insert(&mut usage, &self.count_name, one());
        Ok(usage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_counts_one_per_object() {
        let kind = GroupKind::new("network", "Router");
        let evaluator = ObjectCountEvaluator::new(&kind, "routers");
        let object = DynamicObject::new(&kind, "team-a", "edge", serde_json::Value::Null);
        let usage = evaluator.usage(&object).await.unwrap();
        assert_eq!(usage.len(), 1);
        assert!(usage["count/routers.network"] == pkg_types::Quantity::from_units(1));
        assert!(evaluator.matches_resource_name("count/routers.network"));
        assert!(!evaluator.matches_resource_name("routers"));
    }
}
