//! In-memory quota store and evaluator used by the engine's tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use pkg_state::{QuotaBackend, QuotaIndex, StoreError};
use pkg_types::object::{DynamicObject, GroupKind};
use pkg_types::quota::{QuotaScope, ResourceQuota, ScopeRequirement};
use pkg_types::resources::{ResourceList, add, resource_list};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::QuotaError;
use crate::evaluator::Evaluator;
use crate::scope::{matches_flag, matches_value};

type Key = (String, String);

#[derive(Default)]
struct FakeInner {
    records: BTreeMap<Key, ResourceQuota>,
    index: BTreeMap<Key, ResourceQuota>,
    lagging: bool,
    /// Pending foreign writes per quota name, and the usage each one adds.
    conflicts: BTreeMap<String, (u32, ResourceList)>,
    fail_updates: bool,
    fail_lists: bool,
    list_calls: usize,
    update_calls: usize,
}

/// Authoritative records plus a separately synced index, with failure injection.
#[derive(Default)]
pub struct FakeStore {
    inner: Mutex<FakeInner>,
}

impl FakeStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A store whose index only moves on `sync_index`.
    pub fn lagging() -> Arc<Self> {
        let store = Self::default();
        store.inner.lock().lagging = true;
        Arc::new(store)
    }

    pub fn seed(&self, mut quota: ResourceQuota) {
        if quota.resource_version == 0 {
            quota.resource_version = 1;
        }
        let mut inner = self.inner.lock();
        let key = (quota.namespace.clone(), quota.name.clone());
        if !inner.lagging {
            inner.index.insert(key.clone(), quota.clone());
        }
        inner.records.insert(key, quota);
    }

    pub fn sync_index(&self) {
        let mut inner = self.inner.lock();
        inner.index = inner.records.clone();
    }

    pub fn get(&self, namespace: &str, name: &str) -> Option<ResourceQuota> {
        self.inner
            .lock()
            .records
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Make the next `n` status updates of quota `name` lose to a simulated
    /// foreign writer that charges `usage` each time.
    pub fn inject_conflicts(&self, name: &str, n: u32, usage: &[(&str, &str)]) {
        self.inner
            .lock()
            .conflicts
            .insert(name.to_string(), (n, resource_list(usage)));
    }

    pub fn fail_updates(&self, fail: bool) {
        self.inner.lock().fail_updates = fail;
    }

    pub fn fail_lists(&self, fail: bool) {
        self.inner.lock().fail_lists = fail;
    }

    pub fn list_calls(&self) -> usize {
        self.inner.lock().list_calls
    }

    pub fn update_calls(&self) -> usize {
        self.inner.lock().update_calls
    }
}

impl QuotaIndex for FakeStore {
    fn list(&self, namespace: &str) -> Vec<ResourceQuota> {
        self.inner
            .lock()
            .index
            .values()
            .filter(|q| q.namespace == namespace)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl QuotaBackend for FakeStore {
    async fn list_quotas(&self, namespace: &str) -> Result<Vec<ResourceQuota>, StoreError> {
        let mut inner = self.inner.lock();
        inner.list_calls += 1;
        if inner.fail_lists {
            return Err(StoreError::Backend(anyhow::anyhow!("injected list failure")));
        }
        Ok(inner
            .records
            .values()
            .filter(|q| q.namespace == namespace)
            .cloned()
            .collect())
    }

    async fn update_status(&self, quota: &ResourceQuota) -> Result<ResourceQuota, StoreError> {
        let mut inner = self.inner.lock();
        inner.update_calls += 1;
        if inner.fail_updates {
            return Err(StoreError::Backend(anyhow::anyhow!("injected update failure")));
        }
        let key = (quota.namespace.clone(), quota.name.clone());
        let lagging = inner.lagging;
        let foreign_usage = match inner.conflicts.get_mut(&quota.name) {
            Some((left, usage)) if *left > 0 => {
                *left -= 1;
                Some(usage.clone())
            }
            _ => None,
        };
        let Some(current) = inner.records.get_mut(&key) else {
            return Err(StoreError::NotFound(quota.id()));
        };
        if let Some(usage) = foreign_usage {
            current.used = add(&current.used, &usage);
            current.resource_version += 1;
        }
        if current.resource_version != quota.resource_version {
            return Err(StoreError::Conflict {
                key: quota.id(),
                expected: quota.resource_version,
                actual: current.resource_version,
            });
        }
        current.used = quota.used.clone();
        current.resource_version += 1;
        let committed = current.clone();
        if !lagging {
            inner.index.insert(key, committed.clone());
        }
        Ok(committed)
    }
}

pub fn widget_kind() -> GroupKind {
    GroupKind::new("test", "Widget")
}

/// Object whose spec is exactly the usage it consumes.
pub fn widget(namespace: &str, name: &str, usage: &[(&str, &str)]) -> DynamicObject {
    let usage: BTreeMap<&str, &str> = usage.iter().copied().collect();
    DynamicObject::new(&widget_kind(), namespace, name, serde_json::json!(usage))
}

/// Charges a widget whatever its spec lists. Class comes from the `class`
/// label, preemption from `preemptible=true`. A `scope-error` label makes
/// every scope check of that widget fail.
pub struct WidgetEvaluator {
    kind: GroupKind,
}

impl WidgetEvaluator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            kind: widget_kind(),
        })
    }
}

#[async_trait]
impl Evaluator for WidgetEvaluator {
    fn group_kind(&self) -> &GroupKind {
        &self.kind
    }

    fn resource(&self) -> &str {
        "widgets"
    }

    fn matches_resource_name(&self, name: &str) -> bool {
        !name.starts_with("count/")
    }

    fn matches_scope_requirement(
        &self,
        object: &DynamicObject,
        requirement: &ScopeRequirement,
    ) -> Result<bool, QuotaError> {
        if let Some(message) = object.labels.get("scope-error") {
            return Err(QuotaError::ScopeMatch {
                scope: requirement.scope_name,
                message: message.clone(),
            });
        }
        let preemptible = object.labels.get("preemptible").is_some_and(|v| v == "true");
        match requirement.scope_name {
            QuotaScope::Class => Ok(matches_value(
                requirement,
                object.labels.get("class").map(String::as_str),
            )),
            QuotaScope::Preemptible => matches_flag(requirement, preemptible),
            QuotaScope::NotPreemptible => matches_flag(requirement, !preemptible),
        }
    }

    async fn usage(&self, object: &DynamicObject) -> Result<ResourceList, QuotaError> {
        object.spec_as().map_err(|e| QuotaError::Usage {
            object: object.name.clone(),
            message: e.to_string(),
        })
    }
}
