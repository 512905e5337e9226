//! Built-in quota evaluators.

mod bucket;
mod count;
mod machine;
mod volume;

pub use bucket::BucketEvaluator;
pub use count::ObjectCountEvaluator;
pub use machine::MachineEvaluator;
pub use volume::VolumeEvaluator;

use pkg_types::object::DynamicObject;
use pkg_types::{Quantity, ResourceList};
use serde::de::DeserializeOwned;
use std::sync::Arc;

use crate::error::QuotaError;
use crate::evaluator::Registry;

/// Register every built-in evaluator.
pub fn register_defaults(registry: &Registry) {
    registry.add(Arc::new(MachineEvaluator::new()));
    registry.add(Arc::new(VolumeEvaluator::new()));
    registry.add(Arc::new(BucketEvaluator::new()));
}

/// Decode the typed spec of `object`, reporting failures as usage errors.
fn decode_spec<T: DeserializeOwned>(object: &DynamicObject) -> Result<T, QuotaError> {
    object.spec_as().map_err(|e| QuotaError::Usage {
        object: format!("{} {}/{}", object.group_kind(), object.namespace, object.name),
        message: e.to_string(),
    })
}

/// Per-storage-class resource name, e.g. `fast.storageclass.storage/requests.storage`.
pub fn storage_class_resource(class: &str, resource: &str) -> String {
    format!("{}.storageclass.{}/{}", class, pkg_types::volume::STORAGE_GROUP, resource)
}

fn is_storage_class_resource(name: &str, resource: &str) -> bool {
    name.split_once('/').is_some_and(|(prefix, suffix)| {
        suffix == resource
            && prefix
                .strip_suffix(&format!(".storageclass.{}", pkg_types::volume::STORAGE_GROUP))
                .is_some_and(|class| !class.is_empty())
    })
}

fn one() -> Quantity {
    Quantity::from_units(1)
}

fn insert(usage: &mut ResourceList, name: &str, quantity: Quantity) {
    usage.insert(name.to_string(), quantity);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_class_resource_names() {
        let name = storage_class_resource("fast", "requests.storage");
        assert_eq!(name, "fast.storageclass.storage/requests.storage");
        assert!(is_storage_class_resource(&name, "requests.storage"));
        assert!(!is_storage_class_resource(&name, "volumes"));
        assert!(!is_storage_class_resource(".storageclass.storage/volumes", "volumes"));
        assert!(!is_storage_class_resource("requests.storage", "requests.storage"));
    }

    #[test]
    fn test_register_defaults() {
        let registry = Registry::new();
        register_defaults(&registry);
        let kinds: Vec<String> = registry
            .list()
            .iter()
            .map(|e| e.group_kind().to_string())
            .collect();
        assert_eq!(kinds, vec!["Machine.compute", "Bucket.storage", "Volume.storage"]);
    }
}
