use serde::{Deserialize, Serialize};

use crate::object::DynamicObject;

pub const NAMESPACE_KIND: &str = "Namespace";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Operation {
    Create,
    Update,
    Delete,
    Connect,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Create => write!(f, "CREATE"),
            Operation::Update => write!(f, "UPDATE"),
            Operation::Delete => write!(f, "DELETE"),
            Operation::Connect => write!(f, "CONNECT"),
        }
    }
}

/// A candidate mutation handed to admission by the API server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionRequest {
    pub uid: String,
    pub operation: Operation,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub subresource: String,
    #[serde(default)]
    pub object: Option<DynamicObject>,
    #[serde(default)]
    pub old_object: Option<DynamicObject>,
    #[serde(default)]
    pub dry_run: bool,
}

impl AdmissionRequest {
    /// Creating a namespace cannot be charged to a quota inside that namespace.
    pub fn is_namespace_creation(&self) -> bool {
        self.operation == Operation::Create
            && self
                .object
                .as_ref()
                .is_some_and(|o| o.api_group.is_empty() && o.kind == NAMESPACE_KIND)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdmissionStatus {
    pub code: u16,
    pub reason: String,
    pub message: String,
}

/// Verdict returned to the API server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdmissionResponse {
    pub uid: String,
    pub allowed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<AdmissionStatus>,
}

impl AdmissionResponse {
    pub fn allow(uid: &str) -> Self {
        Self {
            uid: uid.to_string(),
            allowed: true,
            status: None,
        }
    }

    pub fn deny(uid: &str, code: u16, reason: &str, message: String) -> Self {
        Self {
            uid: uid.to_string(),
            allowed: false,
            status: Some(AdmissionStatus {
                code,
                reason: reason.to_string(),
                message,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::GroupKind;

    #[test]
    fn test_namespace_creation_detection() {
        let ns = DynamicObject::new(
            &GroupKind::new("", NAMESPACE_KIND),
            "",
            "team-a",
            serde_json::Value::Null,
        );
        let mut req = AdmissionRequest {
            uid: "1".to_string(),
            operation: Operation::Create,
            namespace: "team-a".to_string(),
            subresource: String::new(),
            object: Some(ns),
            old_object: None,
            dry_run: false,
        };
        assert!(req.is_namespace_creation());

        req.operation = Operation::Update;
        assert!(!req.is_namespace_creation());
    }

    #[test]
    fn test_response_serialization_skips_empty_status() {
        let json = serde_json::to_value(AdmissionResponse::allow("abc")).unwrap();
        assert_eq!(json, serde_json::json!({"uid": "abc", "allowed": true}));
    }
}
