use async_trait::async_trait;
use pkg_types::machine::{COMPUTE_GROUP, MACHINE_KIND, MACHINE_RESOURCE, MachineSpec};
use pkg_types::object::{DynamicObject, GroupKind};
use pkg_types::quota::{QuotaScope, ScopeRequirement};
use pkg_types::resources::*;

use super::{decode_spec, insert, one};
use crate::error::QuotaError;
use crate::evaluator::Evaluator;
use crate::scope::{matches_flag, matches_value};

/// Charges machines for their compute requests and limits.
///
/// A missing request defaults to the limit for the same resource.
pub struct MachineEvaluator {
    kind: GroupKind,
    count_name: String,
}

impl MachineEvaluator {
    pub fn new() -> Self {
        Self {
            kind: GroupKind::new(COMPUTE_GROUP, MACHINE_KIND),
            count_name: object_count_name(COMPUTE_GROUP, MACHINE_RESOURCE),
        }
    }
}

impl Default for MachineEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

const MACHINE_RESOURCES: &[&str] = &[
    RESOURCE_CPU,
    RESOURCE_MEMORY,
    RESOURCE_REQUESTS_CPU,
    RESOURCE_REQUESTS_MEMORY,
    RESOURCE_REQUESTS_GPU,
    RESOURCE_LIMITS_CPU,
    RESOURCE_LIMITS_MEMORY,
    MACHINE_RESOURCE,
];

#[async_trait]
impl Evaluator for MachineEvaluator {
    fn group_kind(&self) -> &GroupKind {
        &self.kind
    }

    fn resource(&self) -> &str {
        MACHINE_RESOURCE
    }

    fn matches_resource_name(&self, name: &str) -> bool {
        name == self.count_name || MACHINE_RESOURCES.contains(&name)
    }

    fn matches_scope_requirement(
        &self,
        object: &DynamicObject,
        requirement: &ScopeRequirement,
    ) -> Result<bool, QuotaError> {
        let spec: MachineSpec = decode_spec(object)?;
        match requirement.scope_name {
            QuotaScope::Class => Ok(matches_value(requirement, spec.class.as_deref())),
            QuotaScope::Preemptible => matches_flag(requirement, spec.preemptible),
            QuotaScope::NotPreemptible => matches_flag(requirement, !spec.preemptible),
        }
    }

    async fn usage(&self, object: &DynamicObject) -> Result<ResourceList, QuotaError> {
        let spec: MachineSpec = decode_spec(object)?;
        let requests = &spec.resources.requests;
        let limits = &spec.resources.limits;

        let mut usage = ResourceList::new();
        insert(&mut usage, &self.count_name, one());
        insert(&mut usage, MACHINE_RESOURCE, one());

        let requested = [
            (RESOURCE_CPU, RESOURCE_REQUESTS_CPU, Some(RESOURCE_CPU)),
            (RESOURCE_MEMORY, RESOURCE_REQUESTS_MEMORY, Some(RESOURCE_MEMORY)),
            (RESOURCE_GPU, RESOURCE_REQUESTS_GPU, None),
        ];
        for (resource, request_name, plain_name) in requested {
            if let Some(qty) = requests.get(resource).or_else(|| limits.get(resource)) {
                insert(&mut usage, request_name, *qty);
                if let Some(plain) = plain_name {
                    insert(&mut usage, plain, *qty);
                }
            }
        }
        for (resource, limit_name) in [
            (RESOURCE_CPU, RESOURCE_LIMITS_CPU),
            (RESOURCE_MEMORY, RESOURCE_LIMITS_MEMORY),
        ] {
            if let Some(qty) = limits.get(resource) {
                insert(&mut usage, limit_name, *qty);
            }
        }
        Ok(usage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkg_types::quota::ScopeOperator;
    use serde_json::json;

    fn machine(spec: serde_json::Value) -> DynamicObject {
        DynamicObject::new(&GroupKind::new(COMPUTE_GROUP, MACHINE_KIND), "team-a", "vm-1", spec)
    }

    #[tokio::test]
    async fn test_usage_defaults_requests_to_limits() {
        let object = machine(json!({
            "resources": {
                "requests": { "cpu": "500m" },
                "limits": { "cpu": "2", "memory": "4Gi", "gpu": "1" }
            }
        }));
        let usage = MachineEvaluator::new().usage(&object).await.unwrap();
        assert_eq!(
            usage,
            resource_list(&[
                ("count/machines.compute", "1"),
                ("machines", "1"),
                ("cpu", "500m"),
                ("requests.cpu", "500m"),
                ("limits.cpu", "2"),
                ("memory", "4Gi"),
                ("requests.memory", "4Gi"),
                ("limits.memory", "4Gi"),
                ("requests.gpu", "1"),
            ])
        );
    }

    #[tokio::test]
    async fn test_usage_rejects_malformed_spec() {
        let object = machine(json!({ "resources": { "requests": { "cpu": "lots" } } }));
        let err = MachineEvaluator::new().usage(&object).await.unwrap_err();
        assert!(matches!(err, QuotaError::Usage { .. }));
    }

    #[test]
    fn test_scope_matching() {
        let evaluator = MachineEvaluator::new();
        let spot = machine(json!({ "class": "gpu", "preemptible": true }));
        let plain = machine(json!({}));

        let preemptible = ScopeRequirement::exists(QuotaScope::Preemptible);
        assert!(evaluator.matches_scope_requirement(&spot, &preemptible).unwrap());
        assert!(!evaluator.matches_scope_requirement(&plain, &preemptible).unwrap());

        let not_preemptible = ScopeRequirement::exists(QuotaScope::NotPreemptible);
        assert!(evaluator.matches_scope_requirement(&plain, &not_preemptible).unwrap());

        let gpu_class = ScopeRequirement {
            scope_name: QuotaScope::Class,
            operator: ScopeOperator::In,
            values: vec!["gpu".to_string()],
        };
        assert!(evaluator.matches_scope_requirement(&spot, &gpu_class).unwrap());
        assert!(!evaluator.matches_scope_requirement(&plain, &gpu_class).unwrap());
    }

    #[test]
    fn test_matches_resource_names() {
        let evaluator = MachineEvaluator::new();
        assert!(evaluator.matches_resource_name("requests.cpu"));
        assert!(evaluator.matches_resource_name("count/machines.compute"));
        assert!(!evaluator.matches_resource_name("requests.storage"));
    }
}
