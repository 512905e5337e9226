use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::quantity::Quantity;
use crate::resources::ResourceList;
use crate::validate::{validate_name, validate_resource_name};

/// Resource quota for a namespace. Caps the aggregate resources consumed by
/// the objects that match its scopes.
///
/// `hard` is owned by operators; `used` is owned by the admission engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceQuota {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    pub hard: ResourceList,
    #[serde(default)]
    pub used: ResourceList,
    /// Shorthand scopes; each one behaves as an `Exists` requirement.
    #[serde(default)]
    pub scopes: Vec<QuotaScope>,
    #[serde(default)]
    pub scope_selector: Option<ScopeSelector>,
    /// Optimistic concurrency token, bumped by the store on every write.
    #[serde(default)]
    pub resource_version: u64,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

/// Attribute of a governed object that a quota can be scoped on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum QuotaScope {
    /// Machine class or storage class of the object.
    Class,
    /// Machines that may be reclaimed by the provider at any time.
    Preemptible,
    /// Everything that is not preemptible.
    NotPreemptible,
}

impl std::fmt::Display for QuotaScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuotaScope::Class => write!(f, "Class"),
            QuotaScope::Preemptible => write!(f, "Preemptible"),
            QuotaScope::NotPreemptible => write!(f, "NotPreemptible"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ScopeOperator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScopeRequirement {
    pub scope_name: QuotaScope,
    pub operator: ScopeOperator,
    #[serde(default)]
    pub values: Vec<String>,
}

impl ScopeRequirement {
    pub fn exists(scope_name: QuotaScope) -> Self {
        Self {
            scope_name,
            operator: ScopeOperator::Exists,
            values: Vec::new(),
        }
    }

    /// Structural validation of a single requirement.
    pub fn validate(&self) -> Result<()> {
        match (self.scope_name, self.operator) {
            (QuotaScope::Preemptible | QuotaScope::NotPreemptible, ScopeOperator::In | ScopeOperator::NotIn) => {
                bail!(
                    "scope {} only supports Exists and DoesNotExist operators",
                    self.scope_name
                );
            }
            (_, ScopeOperator::In | ScopeOperator::NotIn) if self.values.is_empty() => {
                bail!(
                    "scope {} with operator {:?} requires at least one value",
                    self.scope_name,
                    self.operator
                );
            }
            (_, ScopeOperator::Exists | ScopeOperator::DoesNotExist) if !self.values.is_empty() => {
                bail!(
                    "scope {} with operator {:?} must not carry values",
                    self.scope_name,
                    self.operator
                );
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScopeSelector {
    #[serde(default)]
    pub match_expressions: Vec<ScopeRequirement>,
}

impl ResourceQuota {
    pub fn new(namespace: &str, name: &str, hard: ResourceList) -> Self {
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
            hard,
            used: ResourceList::new(),
            scopes: Vec::new(),
            scope_selector: None,
            resource_version: 0,
            created_at: Utc::now(),
        }
    }

    /// `namespace/name`, unique across the cluster.
    pub fn id(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    /// Give every hard resource without a usage entry an explicit zero. A
    /// missing entry means usage is unknown, not zero.
    pub fn seed_usage(&mut self) {
        for name in self.hard.keys() {
            self.used.entry(name.clone()).or_insert_with(Quantity::zero);
        }
    }

    /// All scope requirements an object must satisfy to be charged to this quota:
    /// the shorthand `scopes` followed by the selector's expressions.
    pub fn scope_requirements(&self) -> Vec<ScopeRequirement> {
        let mut requirements: Vec<ScopeRequirement> = self
            .scopes
            .iter()
            .map(|scope| ScopeRequirement::exists(*scope))
            .collect();
        if let Some(selector) = &self.scope_selector {
            requirements.extend(selector.match_expressions.iter().cloned());
        }
        requirements
    }

    /// Validate an operator-supplied quota before it is stored.
    pub fn validate(&self) -> Result<()> {
        validate_name(&self.name)?;
        validate_name(&self.namespace)?;
        for (name, qty) in &self.hard {
            validate_resource_name(name)?;
            if qty.is_negative() {
                bail!("hard limit for '{}' must not be negative (got {})", name, qty);
            }
        }
        for requirement in self.scope_requirements() {
            requirement.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::resource_list;

    #[test]
    fn test_scope_requirements_merge_scopes_and_selector() {
        let mut quota = ResourceQuota::new("team-a", "compute", resource_list(&[("cpu", "4")]));
        quota.scopes = vec![QuotaScope::Preemptible];
        quota.scope_selector = Some(ScopeSelector {
            match_expressions: vec![ScopeRequirement {
                scope_name: QuotaScope::Class,
                operator: ScopeOperator::In,
                values: vec!["gpu-large".to_string()],
            }],
        });

        let reqs = quota.scope_requirements();
        assert_eq!(reqs.len(), 2);
        assert_eq!(reqs[0], ScopeRequirement::exists(QuotaScope::Preemptible));
        assert_eq!(reqs[1].scope_name, QuotaScope::Class);
        assert!(quota.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_quotas() {
        let mut quota = ResourceQuota::new("team-a", "compute", resource_list(&[("cpu", "-1")]));
        assert!(quota.validate().is_err());

        quota.hard = resource_list(&[("cpu", "1")]);
        quota.scope_selector = Some(ScopeSelector {
            match_expressions: vec![ScopeRequirement {
                scope_name: QuotaScope::Preemptible,
                operator: ScopeOperator::In,
                values: vec!["x".to_string()],
            }],
        });
        assert!(quota.validate().is_err());

        quota.scope_selector = Some(ScopeSelector {
            match_expressions: vec![ScopeRequirement {
                scope_name: QuotaScope::Class,
                operator: ScopeOperator::NotIn,
                values: vec![],
            }],
        });
        assert!(quota.validate().is_err());

        let bad_name = ResourceQuota::new("team-a", "Bad_Name", resource_list(&[("cpu", "1")]));
        assert!(bad_name.validate().is_err());
    }

    #[test]
    fn test_seed_usage_keeps_existing_entries() {
        let mut quota = ResourceQuota::new(
            "team-a",
            "compute",
            resource_list(&[("cpu", "4"), ("memory", "8Gi")]),
        );
        quota.used = resource_list(&[("cpu", "3"), ("gpu", "1")]);
        quota.seed_usage();
        assert_eq!(
            quota.used,
            resource_list(&[("cpu", "3"), ("gpu", "1"), ("memory", "0")])
        );
    }

    #[test]
    fn test_deserialize_defaults() {
        let json = r#"{
            "name": "compute",
            "namespace": "team-a",
            "hard": {"requests.cpu": "4", "requests.memory": "8Gi"},
            "created_at": "2026-01-01T00:00:00Z"
        }"#;
        let quota: ResourceQuota = serde_json::from_str(json).unwrap();
        assert!(quota.used.is_empty());
        assert_eq!(quota.resource_version, 0);
        assert_eq!(quota.hard["requests.memory"].value(), 8 * 1024 * 1024 * 1024);
    }
}
