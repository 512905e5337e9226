use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// API group + kind of an object type, e.g. `Machine.compute`.
/// Identifies the type, never an instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupKind {
    #[serde(default)]
    pub group: String,
    pub kind: String,
}

impl GroupKind {
    pub fn new(group: &str, kind: &str) -> Self {
        Self {
            group: group.to_string(),
            kind: kind.to_string(),
        }
    }
}

impl std::fmt::Display for GroupKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{}.{}", self.kind, self.group)
        }
    }
}

/// Untyped object as it arrives at admission. Evaluators decode `spec` into
/// the typed spec of the kind they govern.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DynamicObject {
    #[serde(default)]
    pub api_group: String,
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Set once the object has been persisted. An update whose old object has
    /// no version is a create-on-update.
    #[serde(default)]
    pub resource_version: Option<String>,
    #[serde(default)]
    pub spec: serde_json::Value,
}

impl DynamicObject {
    pub fn new(group_kind: &GroupKind, namespace: &str, name: &str, spec: serde_json::Value) -> Self {
        Self {
            api_group: group_kind.group.clone(),
            kind: group_kind.kind.clone(),
            name: name.to_string(),
            namespace: namespace.to_string(),
            labels: BTreeMap::new(),
            resource_version: None,
            spec,
        }
    }

    pub fn group_kind(&self) -> GroupKind {
        GroupKind {
            group: self.api_group.clone(),
            kind: self.kind.clone(),
        }
    }

    /// Decode the spec into a typed struct.
    pub fn spec_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.spec.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_kind_display() {
        assert_eq!(GroupKind::new("compute", "Machine").to_string(), "Machine.compute");
        assert_eq!(GroupKind::new("", "Namespace").to_string(), "Namespace");
    }

    #[test]
    fn test_spec_as_decodes_typed_spec() {
        #[derive(Deserialize)]
        struct Spec {
            size: String,
        }
        let obj = DynamicObject::new(
            &GroupKind::new("storage", "Volume"),
            "team-a",
            "data",
            serde_json::json!({"size": "10Gi"}),
        );
        let spec: Spec = obj.spec_as().unwrap();
        assert_eq!(spec.size, "10Gi");
        assert_eq!(obj.group_kind(), GroupKind::new("storage", "Volume"));
    }
}
