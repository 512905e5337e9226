use pkg_constants::quota::{LIVE_LOOKUP_CACHE_SIZE, LIVE_LOOKUP_TTL_SECS, UPDATED_QUOTA_CACHE_SIZE};
use pkg_metrics::MetricsRegistry;
use pkg_state::{QuotaBackend, QuotaIndex, StoreError};
use pkg_types::quota::ResourceQuota;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::cache::ExpiringCache;
use crate::metrics::{LIVE_LOOKUPS_TOTAL, OVERRIDE_HITS_TOTAL, STATUS_UPDATES_TOTAL};

#[derive(Debug, Clone)]
pub struct AccessorConfig {
    /// How long a live list of an apparently empty namespace is reused.
    pub live_lookup_ttl: Duration,
    pub live_lookup_cache_size: usize,
    /// Capacity of the recently-written override cache.
    pub updated_cache_size: usize,
}

impl Default for AccessorConfig {
    fn default() -> Self {
        Self {
            live_lookup_ttl: Duration::from_secs(LIVE_LOOKUP_TTL_SECS),
            live_lookup_cache_size: LIVE_LOOKUP_CACHE_SIZE,
            updated_cache_size: UPDATED_QUOTA_CACHE_SIZE,
        }
    }
}

type QuotaKey = (String, String);

/// Reads quota records for admission and commits usage updates.
///
/// Reads go to the watch-fed index first. A namespace the index reports as
/// empty is listed from the authoritative store and the answer is reused for
/// the TTL. Records this process committed recently shadow older copies until
/// the index catches up.
pub struct QuotaAccessor {
    index: Arc<dyn QuotaIndex>,
    backend: Arc<dyn QuotaBackend>,
    live_lookups: ExpiringCache<String, Vec<ResourceQuota>>,
    updated: ExpiringCache<QuotaKey, ResourceQuota>,
    metrics: Arc<MetricsRegistry>,
}

impl QuotaAccessor {
    pub fn new(
        config: &AccessorConfig,
        index: Arc<dyn QuotaIndex>,
        backend: Arc<dyn QuotaBackend>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            index,
            backend,
            live_lookups: ExpiringCache::new(
                config.live_lookup_cache_size,
                Some(config.live_lookup_ttl),
            ),
            updated: ExpiringCache::new(config.updated_cache_size, None),
            metrics,
        }
    }

    /// Current quota records of `namespace`.
    pub async fn list(&self, namespace: &str) -> Result<Vec<ResourceQuota>, StoreError> {
        let mut quotas = self.index.list(namespace);
        if quotas.is_empty() {
            quotas = match self.live_lookups.get(&namespace.to_string()) {
                Some(cached) => cached,
                None => {
                    let fetched = self.list_from_store(namespace).await?;
                    self.live_lookups
                        .insert(namespace.to_string(), fetched.clone());
                    fetched
                }
            };
        }
        Ok(quotas.into_iter().map(|q| self.overlay(q)).collect())
    }

    /// Authoritative read of the named quotas in `namespace`, bypassing the
    /// index and the live-lookup cache.
    pub async fn list_live(
        &self,
        namespace: &str,
        names: &BTreeSet<String>,
    ) -> Result<Vec<ResourceQuota>, StoreError> {
        let quotas = self.list_from_store(namespace).await?;
        Ok(quotas
            .into_iter()
            .filter(|q| names.contains(&q.name))
            .map(|q| self.overlay(q))
            .collect())
    }

    /// Compare-and-swap `quota.used` against `quota.resource_version`.
    /// Conflicts are returned as-is.
    pub async fn update_status(&self, quota: &ResourceQuota) -> Result<ResourceQuota, StoreError> {
        let committed = self.backend.update_status(quota).await?;
        self.metrics.counter_inc(STATUS_UPDATES_TOTAL);
        self.updated.insert(
            (committed.namespace.clone(), committed.name.clone()),
            committed.clone(),
        );
        Ok(committed)
    }

    async fn list_from_store(&self, namespace: &str) -> Result<Vec<ResourceQuota>, StoreError> {
        self.metrics.counter_inc(LIVE_LOOKUPS_TOTAL);
        debug!(namespace, "Listing quotas from the store");
        self.backend.list_quotas(namespace).await
    }

    /// Swap in the recently written copy when it is newer than `quota`, and
    /// forget it once reads have caught up.
    fn overlay(&self, quota: ResourceQuota) -> ResourceQuota {
        let key = (quota.namespace.clone(), quota.name.clone());
        match self.updated.get(&key) {
            Some(recent) if recent.resource_version > quota.resource_version => {
                self.metrics.counter_inc(OVERRIDE_HITS_TOTAL);
                recent
            }
            Some(_) => {
                self.updated.remove(&key);
                quota
            }
            None => quota,
        }
    }
}
