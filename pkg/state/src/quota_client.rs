use async_trait::async_trait;
use pkg_constants::state::{QUOTA_KEY_PREFIX, QUOTA_VERSION_KEY};
use pkg_types::quota::ResourceQuota;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::client::StateStore;
use crate::error::StoreError;

/// Authoritative, strongly consistent access to quota records.
#[async_trait]
pub trait QuotaBackend: Send + Sync {
    /// Read every quota in `namespace` straight from the store.
    async fn list_quotas(&self, namespace: &str) -> Result<Vec<ResourceQuota>, StoreError>;

    /// Write `quota.used`, conditional on `quota.resource_version` still being
    /// the stored version. Returns the committed record with its new version.
    async fn update_status(&self, quota: &ResourceQuota) -> Result<ResourceQuota, StoreError>;
}

/// Storage key for a quota record.
pub fn quota_key(namespace: &str, name: &str) -> String {
    format!("{}{}/{}", QUOTA_KEY_PREFIX, namespace, name)
}

/// Quota record CRUD on top of [`StateStore`].
///
/// Conditional writes are serialized through one in-process lock, so every
/// writer of quota records must go through the same `QuotaClient`.
///
/// Resource versions come from one store-wide counter, so a record that is
/// deleted and created again never reuses a version seen before.
#[derive(Clone)]
pub struct QuotaClient {
    store: StateStore,
    write_lock: Arc<Mutex<()>>,
}

impl QuotaClient {
    pub fn new(store: StateStore) -> Self {
        Self {
            store,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub async fn get(&self, namespace: &str, name: &str) -> Result<Option<ResourceQuota>, StoreError> {
        match self.store.get(&quota_key(namespace, name)).await? {
            Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
            None => Ok(None),
        }
    }

    /// List quotas under a key prefix, skipping records that fail to decode.
    async fn list_under(&self, prefix: &str) -> Result<Vec<ResourceQuota>, StoreError> {
        let entries = self.store.list_prefix(prefix).await?;
        Ok(entries
            .into_iter()
            .filter_map(|(_, v)| serde_json::from_slice(&v).ok())
            .collect())
    }

    pub async fn list_all(&self) -> Result<Vec<ResourceQuota>, StoreError> {
        self.list_under(QUOTA_KEY_PREFIX).await
    }

    /// Create a new quota. `used` starts at zero for every hard resource and
    /// `resource_version` is assigned by the store.
    pub async fn create(&self, quota: &ResourceQuota) -> Result<ResourceQuota, StoreError> {
        let key = quota_key(&quota.namespace, &quota.name);
        let _guard = self.write_lock.lock().await;
        if self.store.get(&key).await?.is_some() {
            return Err(StoreError::AlreadyExists(quota.id()));
        }
        let mut created = quota.clone();
        created.used.clear();
        created.seed_usage();
        created.resource_version = self.next_version(0).await?;
        self.store.put(&key, &serde_json::to_vec(&created)?).await?;
        info!("Created resource quota {}", created.id());
        Ok(created)
    }

    /// Operator edit of `hard` and scopes. `used` is preserved and newly added
    /// hard resources start at zero. A non-zero
    /// `resource_version` on the input acts as a precondition.
    pub async fn update_spec(&self, quota: &ResourceQuota) -> Result<ResourceQuota, StoreError> {
        let key = quota_key(&quota.namespace, &quota.name);
        let _guard = self.write_lock.lock().await;
        let mut current = self.load(&key, &quota.id()).await?;
        if quota.resource_version != 0 && quota.resource_version != current.resource_version {
            return Err(StoreError::Conflict {
                key,
                expected: quota.resource_version,
                actual: current.resource_version,
            });
        }
        current.hard = quota.hard.clone();
        current.scopes = quota.scopes.clone();
        current.scope_selector = quota.scope_selector.clone();
        current.seed_usage();
        current.resource_version = self.next_version(current.resource_version).await?;
        self.store.put(&key, &serde_json::to_vec(&current)?).await?;
        info!("Updated resource quota {}", current.id());
        Ok(current)
    }

    pub async fn delete(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        let key = quota_key(namespace, name);
        let _guard = self.write_lock.lock().await;
        if self.store.get(&key).await?.is_none() {
            return Err(StoreError::NotFound(format!("{}/{}", namespace, name)));
        }
        self.store.delete(&key).await?;
        info!("Deleted resource quota {}/{}", namespace, name);
        Ok(())
    }

    /// Draw the next resource version. Must be called with the write lock held.
    /// `floor` is the version being replaced; records written before the
    /// counter existed may be ahead of it.
    async fn next_version(&self, floor: u64) -> Result<u64, StoreError> {
        let last = match self.store.get(QUOTA_VERSION_KEY).await? {
            Some(data) => String::from_utf8_lossy(&data).trim().parse::<u64>().map_err(|e| {
                StoreError::Backend(anyhow::anyhow!("corrupt quota version counter: {}", e))
            })?,
            None => 0,
        };
        let next = last.max(floor) + 1;
        self.store
            .put(QUOTA_VERSION_KEY, next.to_string().as_bytes())
            .await?;
        Ok(next)
    }

    async fn load(&self, key: &str, id: &str) -> Result<ResourceQuota, StoreError> {
        match self.store.get(key).await? {
            Some(data) => Ok(serde_json::from_slice(&data)?),
            None => Err(StoreError::NotFound(id.to_string())),
        }
    }
}

#[async_trait]
impl QuotaBackend for QuotaClient {
    async fn list_quotas(&self, namespace: &str) -> Result<Vec<ResourceQuota>, StoreError> {
        self.list_under(&format!("{}{}/", QUOTA_KEY_PREFIX, namespace))
            .await
    }

    async fn update_status(&self, quota: &ResourceQuota) -> Result<ResourceQuota, StoreError> {
        let key = quota_key(&quota.namespace, &quota.name);
        let _guard = self.write_lock.lock().await;
        let mut current = self.load(&key, &quota.id()).await?;
        if current.resource_version != quota.resource_version {
            debug!(
                quota = %quota.id(),
                expected = quota.resource_version,
                actual = current.resource_version,
                "Quota status update conflict"
            );
            return Err(StoreError::Conflict {
                key,
                expected: quota.resource_version,
                actual: current.resource_version,
            });
        }
        current.used = quota.used.clone();
        current.resource_version = self.next_version(current.resource_version).await?;
        self.store.put(&key, &serde_json::to_vec(&current)?).await?;
        Ok(current)
    }
}
