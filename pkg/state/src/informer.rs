use parking_lot::RwLock;
use pkg_constants::state::QUOTA_KEY_PREFIX;
use pkg_types::quota::ResourceQuota;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::quota_client::QuotaClient;
use crate::watch::{EventType, WatchEvent};

/// Fast, possibly stale, per-namespace view of quota records.
pub trait QuotaIndex: Send + Sync {
    fn list(&self, namespace: &str) -> Vec<ResourceQuota>;
}

type NamespaceIndex = HashMap<String, BTreeMap<String, ResourceQuota>>;

/// Watch-fed cache of every quota record, indexed by namespace.
///
/// Seeded by a full list, then kept current by applying `Put`/`Delete` events
/// from the store's event log. Reads never touch the store, so they may lag
/// behind recent writes.
#[derive(Clone)]
pub struct QuotaInformer {
    client: QuotaClient,
    index: Arc<RwLock<NamespaceIndex>>,
    synced: Arc<AtomicBool>,
}

impl QuotaInformer {
    pub fn new(client: QuotaClient) -> Self {
        Self {
            client,
            index: Arc::new(RwLock::new(HashMap::new())),
            synced: Arc::new(AtomicBool::new(false)),
        }
    }

    /// True once the initial list has been loaded.
    pub fn has_synced(&self) -> bool {
        self.synced.load(Ordering::Acquire)
    }

    /// Replace the whole index with a fresh list from the store.
    pub async fn resync(&self) -> anyhow::Result<()> {
        let quotas = self.client.list_all().await?;
        let mut fresh: NamespaceIndex = HashMap::new();
        for quota in quotas {
            fresh
                .entry(quota.namespace.clone())
                .or_default()
                .insert(quota.name.clone(), quota);
        }
        let count: usize = fresh.values().map(BTreeMap::len).sum();
        *self.index.write() = fresh;
        self.synced.store(true, Ordering::Release);
        debug!("Quota informer resynced ({} records)", count);
        Ok(())
    }

    /// Start following the event log as a background task. Subscribes before
    /// the initial list so no write between the two is missed.
    pub fn start(&self) -> tokio::task::JoinHandle<()> {
        let informer = self.clone();
        let mut event_rx = self.client.store().event_log.subscribe();
        tokio::spawn(async move {
            info!("QuotaInformer started");
            if let Err(e) = informer.resync().await {
                warn!("QuotaInformer initial list failed: {}", e);
            }
            loop {
                match event_rx.recv().await {
                    Ok(event) => informer.apply(&event),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("QuotaInformer lagged by {} events, resyncing", skipped);
                        if let Err(e) = informer.resync().await {
                            warn!("QuotaInformer resync failed: {}", e);
                        }
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            info!("QuotaInformer stopped");
        })
    }

    /// Apply one watch event to the index. Events for other prefixes are ignored.
    pub fn apply(&self, event: &WatchEvent) {
        let Some(rest) = event.key.strip_prefix(QUOTA_KEY_PREFIX) else {
            return;
        };
        let Some((namespace, name)) = rest.split_once('/') else {
            return;
        };

        match event.event_type {
            EventType::Put => {
                let quota: ResourceQuota = match event.decode() {
                    Some(Ok(q)) => q,
                    Some(Err(e)) => {
                        warn!("QuotaInformer: undecodable quota at {}: {}", event.key, e);
                        return;
                    }
                    None => return,
                };
                let mut index = self.index.write();
                let records = index.entry(namespace.to_string()).or_default();
                // A resync may already have loaded a newer copy.
                let stale = records
                    .get(name)
                    .is_some_and(|existing| existing.resource_version > quota.resource_version);
                if !stale {
                    records.insert(name.to_string(), quota);
                }
            }
            EventType::Delete => {
                let mut index = self.index.write();
                if let Some(records) = index.get_mut(namespace) {
                    records.remove(name);
                    if records.is_empty() {
                        index.remove(namespace);
                    }
                }
            }
        }
    }
}

impl QuotaIndex for QuotaInformer {
    fn list(&self, namespace: &str) -> Vec<ResourceQuota> {
        self.index
            .read()
            .get(namespace)
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::StateStore;
    use crate::quota_client::{QuotaBackend, quota_key};
    use pkg_types::resources::resource_list;
    use std::time::Duration;

    async fn wait_for<F: Fn() -> bool>(cond: F) {
        for _ in 0..200 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn test_informer_follows_writes() {
        let client = QuotaClient::new(StateStore::in_memory().await.unwrap());
        let seeded = ResourceQuota::new("team-a", "seeded", resource_list(&[("cpu", "1")]));
        client.create(&seeded).await.unwrap();

        let informer = QuotaInformer::new(client.clone());
        let handle = informer.start();
        wait_for(|| informer.has_synced()).await;
        assert_eq!(informer.list("team-a").len(), 1);

        let created = client
            .create(&ResourceQuota::new("team-a", "live", resource_list(&[("cpu", "2")])))
            .await
            .unwrap();
        wait_for(|| informer.list("team-a").len() == 2).await;

        let mut next = created.clone();
        next.used = resource_list(&[("cpu", "1")]);
        let committed = client.update_status(&next).await.unwrap();
        wait_for(|| {
            informer
                .list("team-a")
                .iter()
                .any(|q| q.name == "live" && q.resource_version == committed.resource_version)
        })
        .await;

        client.delete("team-a", "seeded").await.unwrap();
        client.delete("team-a", "live").await.unwrap();
        wait_for(|| informer.list("team-a").is_empty()).await;
        handle.abort();
    }

    #[tokio::test]
    async fn test_apply_ignores_older_versions_and_foreign_keys() {
        let client = QuotaClient::new(StateStore::in_memory().await.unwrap());
        let informer = QuotaInformer::new(client);

        let mut newer = ResourceQuota::new("team-a", "q", resource_list(&[("cpu", "1")]));
        newer.resource_version = 5;
        let mut older = newer.clone();
        older.resource_version = 4;

        let event = |quota: &ResourceQuota, seq| WatchEvent {
            seq,
            event_type: EventType::Put,
            key: quota_key("team-a", "q"),
            value: Some(serde_json::to_vec(quota).unwrap()),
        };
        informer.apply(&event(&newer, 1));
        informer.apply(&event(&older, 2));
        assert_eq!(informer.list("team-a")[0].resource_version, 5);

        informer.apply(&WatchEvent {
            seq: 3,
            event_type: EventType::Delete,
            key: "/registry/machines/team-a/q".to_string(),
            value: None,
        });
        assert_eq!(informer.list("team-a").len(), 1);
    }
}
