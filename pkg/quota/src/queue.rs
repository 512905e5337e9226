use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use tokio::sync::Notify;

enum NamespaceState<T> {
    /// Waiting for a worker. The namespace is in the ready list.
    Scheduled(Vec<T>),
    /// Held by a worker. Items here arrived mid-batch and form the next batch.
    Processing(Vec<T>),
}

struct QueueInner<T> {
    states: HashMap<String, NamespaceState<T>>,
    ready: VecDeque<String>,
    closed: bool,
}

/// Namespace-keyed work queue.
///
/// Items for one namespace are handed out as a single batch, in arrival
/// order, and a namespace is held by at most one worker at a time. Items that
/// arrive while their namespace is held are collected and re-queued when the
/// worker calls [`complete`](Self::complete).
pub struct NamespaceQueue<T> {
    inner: Mutex<QueueInner<T>>,
    notify: Notify,
}

impl<T> NamespaceQueue<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                states: HashMap::new(),
                ready: VecDeque::new(),
                closed: false,
            }),
            notify: Notify::new(),
        }
    }

    /// Add an item for `namespace`. Hands the item back if the queue is closed.
    pub fn enqueue(&self, namespace: &str, item: T) -> Result<(), T> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(item);
        }
        match inner.states.get_mut(namespace) {
            Some(NamespaceState::Scheduled(items)) | Some(NamespaceState::Processing(items)) => {
                items.push(item);
            }
            None => {
                inner
                    .states
                    .insert(namespace.to_string(), NamespaceState::Scheduled(vec![item]));
                inner.ready.push_back(namespace.to_string());
                drop(inner);
                self.notify.notify_one();
            }
        }
        Ok(())
    }

    /// Wait for a namespace with pending items and take all of them.
    /// Cancel-safe: nothing is taken unless the batch is returned.
    pub async fn take_batch(&self) -> (String, Vec<T>) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if let Some(batch) = self.try_take_batch() {
                return batch;
            }
            notified.await;
        }
    }

    pub fn try_take_batch(&self) -> Option<(String, Vec<T>)> {
        let mut inner = self.inner.lock();
        while let Some(namespace) = inner.ready.pop_front() {
            let Some(state) = inner.states.get_mut(&namespace) else {
                continue;
            };
            let NamespaceState::Scheduled(items) = &mut *state else {
                continue;
            };
            let items = std::mem::take(items);
            *state = NamespaceState::Processing(Vec::new());
            let more = !inner.ready.is_empty();
            drop(inner);
            if more {
                self.notify.notify_one();
            }
            return Some((namespace, items));
        }
        None
    }

    /// Release `namespace` after its batch. Items that arrived meanwhile are
    /// scheduled again; otherwise the namespace goes idle.
    pub fn complete(&self, namespace: &str) {
        let mut inner = self.inner.lock();
        let Some(state) = inner.states.remove(namespace) else {
            return;
        };
        let pending = match state {
            NamespaceState::Processing(items) | NamespaceState::Scheduled(items) => items,
        };
        if pending.is_empty() || inner.closed {
            return;
        }
        inner
            .states
            .insert(namespace.to_string(), NamespaceState::Scheduled(pending));
        inner.ready.push_back(namespace.to_string());
        drop(inner);
        self.notify.notify_one();
    }

    /// Refuse new items and return everything not yet handed to a worker.
    pub fn close(&self) -> Vec<T> {
        let mut inner = self.inner.lock();
        inner.closed = true;
        inner.ready.clear();
        let mut drained = Vec::new();
        for state in inner.states.values_mut() {
            match state {
                NamespaceState::Scheduled(items) | NamespaceState::Processing(items) => {
                    drained.append(items);
                }
            }
        }
        inner
            .states
            .retain(|_, state| matches!(state, NamespaceState::Processing(_)));
        drained
    }

    /// Namespaces waiting for a worker.
    pub fn ready_len(&self) -> usize {
        self.inner.lock().ready.len()
    }

    /// Items queued for `namespace` that no worker has taken yet.
    pub fn queued(&self, namespace: &str) -> usize {
        match self.inner.lock().states.get(namespace) {
            Some(NamespaceState::Scheduled(items)) | Some(NamespaceState::Processing(items)) => {
                items.len()
            }
            None => 0,
        }
    }
}

impl<T> Default for NamespaceQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_items_batch_per_namespace_in_order() {
        let queue = NamespaceQueue::new();
        queue.enqueue("team-a", 1).unwrap();
        queue.enqueue("team-b", 2).unwrap();
        queue.enqueue("team-a", 3).unwrap();
        assert_eq!(queue.ready_len(), 2);

        assert_eq!(queue.try_take_batch(), Some(("team-a".to_string(), vec![1, 3])));
        assert_eq!(queue.try_take_batch(), Some(("team-b".to_string(), vec![2])));
        assert_eq!(queue.try_take_batch(), None);
    }

    #[test]
    fn test_namespace_is_held_by_one_worker() {
        let queue = NamespaceQueue::new();
        queue.enqueue("team-a", 1).unwrap();
        let (ns, batch) = queue.try_take_batch().unwrap();
        assert_eq!(batch, vec![1]);

        // Arrives mid-batch: parked until the holder completes.
        queue.enqueue("team-a", 2).unwrap();
        queue.enqueue("team-a", 3).unwrap();
        assert_eq!(queue.queued("team-a"), 2);
        assert_eq!(queue.try_take_batch(), None);

        queue.complete(&ns);
        assert_eq!(queue.try_take_batch(), Some(("team-a".to_string(), vec![2, 3])));
        queue.complete("team-a");
        assert_eq!(queue.queued("team-a"), 0);
        assert_eq!(queue.try_take_batch(), None);
    }

    #[test]
    fn test_close_drains_and_rejects() {
        let queue = NamespaceQueue::new();
        queue.enqueue("team-a", 1).unwrap();
        queue.enqueue("team-b", 2).unwrap();
        let _held = queue.try_take_batch().unwrap();
        queue.enqueue("team-a", 3).unwrap();

        let mut drained = queue.close();
        drained.sort();
        assert_eq!(drained, vec![2, 3]);
        assert_eq!(queue.enqueue("team-a", 4), Err(4));

        queue.complete("team-a");
        assert_eq!(queue.try_take_batch(), None);
    }

    #[tokio::test]
    async fn test_take_batch_wakes_every_idle_worker() {
        let queue = Arc::new(NamespaceQueue::new());
        let mut workers = Vec::new();
        for _ in 0..2 {
            let queue = queue.clone();
            workers.push(tokio::spawn(async move { queue.take_batch().await }));
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.enqueue("team-a", 1).unwrap();
        queue.enqueue("team-b", 2).unwrap();

        let mut namespaces = Vec::new();
        for worker in workers {
            let (ns, _) = tokio::time::timeout(Duration::from_secs(1), worker)
                .await
                .expect("worker woke")
                .unwrap();
            namespaces.push(ns);
        }
        namespaces.sort();
        assert_eq!(namespaces, vec!["team-a", "team-b"]);
    }
}
