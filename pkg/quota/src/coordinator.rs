use pkg_constants::quota::{DEFAULT_MAX_UPDATE_RETRIES, DEFAULT_WORKERS};
use pkg_metrics::MetricsRegistry;
use pkg_types::admission::Operation;
use pkg_types::config::LimitedResource;
use pkg_types::object::DynamicObject;
use pkg_types::quota::ResourceQuota;
use pkg_types::resources::{
    ResourceList, add, equals, is_negative, less_than_or_equal, mask, remove_zeros,
    resource_names, subtract_non_negative,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::accessor::QuotaAccessor;
use crate::error::QuotaError;
use crate::evaluator::{Evaluator, Registry};
use crate::metrics::{
    BATCH_WAITERS_TOTAL, BATCHES_TOTAL, EVALUATIONS_TOTAL, PENDING_NAMESPACES,
    UPDATE_CONFLICTS_TOTAL,
};
use crate::queue::NamespaceQueue;
use crate::scope::quota_matches;

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Number of namespace batches processed concurrently.
    pub workers: usize,
    /// Extra commit rounds after a version conflict.
    pub max_update_retries: u32,
    /// Resources that may only be consumed when some quota covers them.
    pub limited_resources: Vec<LimitedResource>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            max_update_retries: DEFAULT_MAX_UPDATE_RETRIES,
            limited_resources: Vec::new(),
        }
    }
}

/// One admission check handed to the coordinator.
#[derive(Debug, Clone)]
pub struct Attributes {
    pub namespace: String,
    pub operation: Operation,
    pub object: DynamicObject,
    pub old_object: Option<DynamicObject>,
    /// Evaluate without committing usage.
    pub dry_run: bool,
}

impl Attributes {
    pub fn create(object: DynamicObject) -> Self {
        Self {
            namespace: object.namespace.clone(),
            operation: Operation::Create,
            object,
            old_object: None,
            dry_run: false,
        }
    }

    pub fn update(object: DynamicObject, old_object: DynamicObject) -> Self {
        Self {
            namespace: object.namespace.clone(),
            operation: Operation::Update,
            object,
            old_object: Some(old_object),
            dry_run: false,
        }
    }
}

struct Waiter {
    attributes: Attributes,
    evaluator: Arc<dyn Evaluator>,
    reply: oneshot::Sender<Result<(), QuotaError>>,
}

#[derive(Debug, Clone)]
enum Verdict {
    Pending,
    Allowed,
    Denied(QuotaError),
}

/// Batches admission checks per namespace and commits quota usage.
///
/// Callers block in [`evaluate`](Self::evaluate) while a fixed pool of
/// workers drains the namespace queue. Each batch is checked in arrival order
/// against one snapshot of the namespace's quotas, and every changed quota
/// is written once with compare-and-swap.
#[derive(Clone)]
pub struct QuotaCoordinator {
    inner: Arc<CoordinatorInner>,
}

struct CoordinatorInner {
    config: CoordinatorConfig,
    registry: Arc<Registry>,
    accessor: Arc<QuotaAccessor>,
    queue: NamespaceQueue<Waiter>,
    metrics: Arc<MetricsRegistry>,
    shutdown: watch::Sender<bool>,
}

impl QuotaCoordinator {
    pub fn new(
        config: CoordinatorConfig,
        registry: Arc<Registry>,
        accessor: Arc<QuotaAccessor>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Arc::new(CoordinatorInner {
                config,
                registry,
                accessor,
                queue: NamespaceQueue::new(),
                metrics,
                shutdown,
            }),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.inner.registry
    }

    /// Spawn the worker pool.
    pub fn start(&self) -> Vec<JoinHandle<()>> {
        let workers = self.inner.config.workers.max(1);
        info!("QuotaCoordinator started with {} workers", workers);
        (0..workers)
            .map(|id| {
                let inner = self.inner.clone();
                let shutdown = inner.shutdown.subscribe();
                tokio::spawn(async move { inner.run_worker(id, shutdown).await })
            })
            .collect()
    }

    /// Stop taking work. Queued checks fail with `ShuttingDown`; batches
    /// already being processed run to completion.
    pub fn shutdown(&self) {
        self.inner.shutdown.send_replace(true);
        let abandoned = self.inner.queue.close();
        if !abandoned.is_empty() {
            info!("Rejecting {} queued quota checks on shutdown", abandoned.len());
        }
        for waiter in abandoned {
            let _ = waiter.reply.send(Err(QuotaError::ShuttingDown));
        }
        self.inner.update_pending_gauge();
    }

    /// Check (and unless dry-run, charge) the usage of `attributes.object`.
    /// Kinds without an evaluator are allowed without touching any quota.
    pub async fn evaluate(&self, attributes: Attributes) -> Result<(), QuotaError> {
        let Some(evaluator) = self.inner.registry.get(&attributes.object) else {
            return Ok(());
        };
        let namespace = attributes.namespace.clone();
        let (reply, rx) = oneshot::channel();
        let waiter = Waiter {
            attributes,
            evaluator,
            reply,
        };
        if self.inner.queue.enqueue(&namespace, waiter).is_err() {
            return Err(QuotaError::ShuttingDown);
        }
        self.inner.update_pending_gauge();

        let result = rx.await.unwrap_or(Err(QuotaError::ShuttingDown));
        let outcome = match &result {
            Ok(()) => "allowed",
            Err(e) if e.is_denied() => "denied",
            Err(_) => "error",
        };
        self.inner
            .metrics
            .counter_inc_with(EVALUATIONS_TOTAL, &[("outcome", outcome)]);
        result
    }

    /// Checks queued for `namespace` that no worker has picked up.
    pub fn queued(&self, namespace: &str) -> usize {
        self.inner.queue.queued(namespace)
    }
}

impl CoordinatorInner {
    async fn run_worker(self: Arc<Self>, id: usize, mut shutdown: watch::Receiver<bool>) {
        debug!(worker = id, "Quota worker started");
        loop {
            let (namespace, batch) = tokio::select! {
                _ = shutdown.wait_for(|stop| *stop) => break,
                batch = self.queue.take_batch() => batch,
            };
            self.update_pending_gauge();
            self.process_batch(&namespace, batch).await;
            self.queue.complete(&namespace);
            self.update_pending_gauge();
        }
        debug!(worker = id, "Quota worker stopped");
    }

    fn update_pending_gauge(&self) {
        self.metrics
            .gauge_set(PENDING_NAMESPACES, self.queue.ready_len() as i64);
    }

    async fn process_batch(&self, namespace: &str, waiters: Vec<Waiter>) {
        self.metrics.counter_inc(BATCHES_TOTAL);
        self.metrics
            .counter_add_with(BATCH_WAITERS_TOTAL, &[], waiters.len() as u64);
        debug!(namespace, waiters = waiters.len(), "Evaluating quota batch");

        let verdicts = match self.accessor.list(namespace).await {
            Ok(quotas) => self.check_quotas(namespace, quotas, &waiters).await,
            Err(e) => {
                warn!(namespace, "Failed to list quotas: {}", e);
                vec![Verdict::Denied(QuotaError::from(e)); waiters.len()]
            }
        };

        for (waiter, verdict) in waiters.into_iter().zip(verdicts) {
            let result = match verdict {
                Verdict::Allowed => Ok(()),
                Verdict::Denied(e) => Err(e),
                Verdict::Pending => Err(QuotaError::Unresolved),
            };
            // The caller may have stopped waiting.
            let _ = waiter.reply.send(result);
        }
    }

    /// Evaluate `waiters` against `quotas`, commit the changed quotas and
    /// re-evaluate the waiters whose quotas lost a version race.
    async fn check_quotas(
        &self,
        namespace: &str,
        mut quotas: Vec<ResourceQuota>,
        waiters: &[Waiter],
    ) -> Vec<Verdict> {
        let mut verdicts = vec![Verdict::Pending; waiters.len()];
        let mut candidates: Vec<usize> = (0..waiters.len()).collect();
        let mut retries_left = self.config.max_update_retries;
        let mut first_round = true;

        loop {
            let original = quotas.clone();
            let mut working = quotas;
            // Quota names whose usage each staged waiter changed.
            let mut touched: BTreeMap<usize, BTreeSet<String>> = BTreeMap::new();

            for &i in &candidates {
                let waiter = &waiters[i];
                let checked = self.check_request(&working, waiter, first_round).await;
                match checked {
                    Err(e) => {
                        debug!(namespace, object = %waiter.attributes.object.name, "Quota check failed: {}", e);
                        verdicts[i] = Verdict::Denied(e);
                    }
                    Ok(updated) => {
                        let changed: BTreeSet<String> = working
                            .iter()
                            .zip(&updated)
                            .filter(|(before, after)| !equals(&before.used, &after.used))
                            .map(|(quota, _)| quota.name.clone())
                            .collect();
                        if changed.is_empty() || waiter.attributes.dry_run {
                            verdicts[i] = Verdict::Allowed;
                        } else {
                            working = updated;
                            touched.insert(i, changed);
                        }
                    }
                }
            }

            let mut conflicted = BTreeSet::new();
            let mut failed: HashMap<String, QuotaError> = HashMap::new();
            let mut last_conflict = None;
            for (quota, before) in working.iter().zip(&original) {
                if equals(&quota.used, &before.used) {
                    continue;
                }
                match self.accessor.update_status(quota).await {
                    Ok(committed) => {
                        debug!(quota = %committed.id(), version = committed.resource_version, "Committed quota usage");
                    }
                    Err(e) if e.is_conflict() => {
                        self.metrics.counter_inc(UPDATE_CONFLICTS_TOTAL);
                        conflicted.insert(quota.name.clone());
                        last_conflict = Some(QuotaError::from(e));
                    }
                    Err(e) => {
                        warn!(quota = %quota.id(), "Failed to update quota usage: {}", e);
                        failed.insert(quota.name.clone(), QuotaError::from(e));
                    }
                }
            }

            let mut retry = Vec::new();
            for (i, names) in touched {
                if let Some(err) = names.iter().find_map(|name| failed.get(name)) {
                    verdicts[i] = Verdict::Denied(err.clone());
                } else if names.iter().any(|name| conflicted.contains(name)) {
                    retry.push(i);
                } else {
                    verdicts[i] = Verdict::Allowed;
                }
            }
            let Some(conflict) = last_conflict else {
                return verdicts;
            };
            if retry.is_empty() {
                return verdicts;
            }
            if retries_left == 0 {
                warn!(namespace, waiters = retry.len(), "Quota update retries exhausted: {}", conflict);
                for i in retry {
                    verdicts[i] = Verdict::Denied(conflict.clone());
                }
                return verdicts;
            }
            retries_left -= 1;
            first_round = false;

            quotas = match self.accessor.list_live(namespace, &conflicted).await {
                Ok(fresh) => fresh,
                Err(e) => {
                    let err = QuotaError::from(e);
                    for i in retry {
                        verdicts[i] = Verdict::Denied(err.clone());
                    }
                    return verdicts;
                }
            };
            candidates = retry;
        }
    }

    /// Check one waiter against `quotas`. Returns `quotas` with the waiter's
    /// usage added to every quota it counts against.
    async fn check_request(
        &self,
        quotas: &[ResourceQuota],
        waiter: &Waiter,
        check_limited: bool,
    ) -> Result<Vec<ResourceQuota>, QuotaError> {
        let evaluator = waiter.evaluator.as_ref();
        let attributes = &waiter.attributes;

        let mut interesting = Vec::new();
        let mut restricted = BTreeSet::new();
        for (idx, quota) in quotas.iter().enumerate() {
            if !quota_matches(evaluator, &attributes.object, quota)? {
                continue;
            }
            let names: Vec<&String> = quota
                .hard
                .keys()
                .filter(|name| evaluator.matches_resource_name(name))
                .collect();
            if names.is_empty() {
                continue;
            }
            restricted.extend(names.into_iter().cloned());
            interesting.push(idx);
        }

        let rules = if check_limited {
            self.limited_rules(evaluator)
        } else {
            Vec::new()
        };
        if interesting.is_empty() && rules.is_empty() {
            return Ok(quotas.to_vec());
        }

        let mut delta = evaluator.usage(&attributes.object).await?;
        if !rules.is_empty() {
            let uncovered: Vec<String> = limited_names(&delta, &rules)
                .difference(&restricted)
                .cloned()
                .collect();
            if !uncovered.is_empty() {
                return Err(QuotaError::InsufficientQuota(uncovered));
            }
        }
        if interesting.is_empty() {
            return Ok(quotas.to_vec());
        }
        for &idx in &interesting {
            let quota = &quotas[idx];
            let missing: Vec<String> = quota
                .hard
                .keys()
                .filter(|name| {
                    evaluator.matches_resource_name(name) && !quota.used.contains_key(*name)
                })
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(QuotaError::StatusUnknown {
                    quota: quota.name.clone(),
                    resources: missing,
                });
            }
        }

        reject_negative(&delta)?;
        if attributes.operation == Operation::Update {
            let previous = attributes
                .old_object
                .as_ref()
                .filter(|old| old.resource_version.is_some());
            if let Some(old) = previous {
                let previous_usage = evaluator.usage(old).await?;
                reject_negative(&previous_usage)?;
                delta = subtract_non_negative(&delta, &previous_usage);
            }
        }
        let delta = remove_zeros(&delta);
        if delta.is_empty() {
            return Ok(quotas.to_vec());
        }

        let mut updated = quotas.to_vec();
        for idx in interesting {
            let quota = &quotas[idx];
            let requested = mask(&delta, &resource_names(&quota.hard));
            let new_used = add(&quota.used, &requested);
            let (fits, exceeded) =
                less_than_or_equal(&mask(&new_used, &resource_names(&requested)), &quota.hard);
            if !fits {
                let exceeded: BTreeSet<String> = exceeded.into_iter().collect();
                return Err(QuotaError::Denied {
                    quota: quota.name.clone(),
                    requested: mask(&requested, &exceeded),
                    used: mask(&quota.used, &exceeded),
                    limited: mask(&quota.hard, &exceeded),
                });
            }
            updated[idx].used = new_used;
        }
        Ok(updated)
    }

    /// Limited-resource rules that apply to the evaluator's resource.
    fn limited_rules(&self, evaluator: &dyn Evaluator) -> Vec<&LimitedResource> {
        self.config
            .limited_resources
            .iter()
            .filter(|rule| {
                rule.api_group == evaluator.group_kind().group && rule.resource == evaluator.resource()
            })
            .collect()
    }
}

fn reject_negative(usage: &ResourceList) -> Result<(), QuotaError> {
    let negative = is_negative(usage);
    if negative.is_empty() {
        Ok(())
    } else {
        Err(QuotaError::NegativeUsage(negative))
    }
}

/// Non-zero usage names that some rule marks as limited.
fn limited_names(usage: &ResourceList, rules: &[&LimitedResource]) -> BTreeSet<String> {
    usage
        .iter()
        .filter(|(_, qty)| !qty.is_zero())
        .map(|(name, _)| name)
        .filter(|name| {
            rules
                .iter()
                .any(|rule| rule.match_contains.iter().any(|m| name.contains(m.as_str())))
        })
        .cloned()
        .collect()
}
