use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use kubelens_core::{EventKind, NormalizedRecord, ResourceIdentity, ResourceKind, StoreEvent};

use crate::bus::BusEvent;

const DEFAULT_SUBSCRIPTION_CAPACITY: usize = 256;

struct KindBus {
    sender: broadcast::Sender<BusEvent>,
    /// Guards the map mutation and the broadcast send as one critical
    /// section (spec.md §4.2), so a subscriber either sees a record in
    /// a snapshot taken strictly after `apply`, or receives the event
    /// on the bus, or both -- never neither.
    write_lock: Mutex<()>,
}

/// The authoritative normalized mirror, keyed by `(kind, namespace,
/// name)`, and the fan-out bus subscribers attach to (spec.md §4.2).
///
/// No I/O. Cloning shares the same backing map and buses; `Store` is
/// the one long-lived object the watcher, the session manager, and the
/// deprecated HTTP snapshot routes all hold a handle to.
#[derive(Clone)]
pub struct Store {
    records: Arc<DashMap<ResourceIdentity, NormalizedRecord>>,
    buses: Arc<[KindBus; 4]>,
    subscription_capacity: usize,
}

fn bus_index(kind: ResourceKind) -> usize {
    ResourceKind::ALL.iter().position(|k| *k == kind).expect("ResourceKind::ALL is exhaustive")
}

impl Default for Store {
    fn default() -> Self {
        Self::new(DEFAULT_SUBSCRIPTION_CAPACITY)
    }
}

impl Store {
    pub fn new(subscription_capacity: usize) -> Self {
        let buses = std::array::from_fn(|_| KindBus {
            sender: broadcast::channel(subscription_capacity).0,
            write_lock: Mutex::new(()),
        });
        Self { records: Arc::new(DashMap::new()), buses: Arc::new(buses), subscription_capacity }
    }

    /// Writer-side ingest (spec.md §4.2). `event_kind` is one of
    /// `Added`/`Modified`/`Deleted`/`Initial`; callers other than the
    /// watcher's own INIT burst always use `Added`/`Modified`/`Deleted`.
    ///
    /// A record is logically replaced on every `Modified`, even if
    /// the new normalized form equals the stored one -- the store does
    /// not dedup (spec.md §4.2 "Identity and equality").
    pub fn apply(&self, event_kind: EventKind, record: NormalizedRecord) {
        let kind = record.kind();
        let identity = record.identity();
        let bus = &self.buses[bus_index(kind)];

        let _guard = bus.write_lock.lock();
        match event_kind {
            EventKind::Deleted => {
                self.records.remove(&identity);
            }
            EventKind::Added | EventKind::Modified | EventKind::Initial => {
                self.records.insert(identity, record.clone());
            }
        }
        // Never block the writer: broadcast::Sender::send never
        // suspends, and errors only when there are zero receivers,
        // which is not a failure worth surfacing.
        let _ = bus.sender.send(BusEvent::Change(StoreEvent::new(event_kind, record)));
    }

    /// Signals the end of a watcher's INIT burst for `kind` (spec.md
    /// §4.1 "Batched initial delivery"). Carries no map mutation.
    pub fn mark_initial_sync_complete(&self, kind: ResourceKind, count: usize) {
        let bus = &self.buses[bus_index(kind)];
        let _guard = bus.write_lock.lock();
        let _ = bus.sender.send(BusEvent::InitialSyncComplete { count });
    }

    /// Deep-copied list of current records for a kind, optionally
    /// filtered by namespace, taken atomically with respect to the
    /// writer (spec.md §4.2, GLOSSARY "Snapshot").
    pub fn snapshot(&self, kind: ResourceKind, namespace: Option<&str>) -> Vec<NormalizedRecord> {
        self.records
            .iter()
            .filter(|entry| entry.key().kind == kind)
            .filter(|entry| namespace.is_none_or(|ns| entry.key().namespace == ns))
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// All keys currently stored for a kind, used by the watcher's
    /// re-list reconciliation to compute which keys disappeared
    /// (spec.md §3 Lifecycle, §4.1 INIT, invariant 5).
    pub fn keys(&self, kind: ResourceKind) -> Vec<ResourceIdentity> {
        self.records.iter().filter(|entry| entry.key().kind == kind).map(|entry| entry.key().clone()).collect()
    }

    pub fn get(&self, identity: &ResourceIdentity) -> Option<NormalizedRecord> {
        self.records.get(identity).map(|entry| entry.value().clone())
    }

    /// Register a callback to receive all subsequent bus events for a
    /// kind, on its own task, until the returned handle is dropped or
    /// explicitly unsubscribed (spec.md §4.2).
    ///
    /// The callback runs synchronously per event on a dedicated task,
    /// never inside `apply`'s critical section, so a slow subscriber
    /// cannot stall the writer or other subscribers.
    pub fn subscribe<F>(&self, kind: ResourceKind, mut callback: F) -> Subscription
    where
        F: FnMut(BusEvent) + Send + 'static,
    {
        let mut receiver = self.buses[bus_index(kind)].sender.subscribe();
        let task = tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => callback(event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "subscription lagged, events were dropped");
                        callback(BusEvent::Lagged { skipped });
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Subscription { task: Some(task) }
    }

    pub fn subscription_capacity(&self) -> usize {
        self.subscription_capacity
    }
}

/// An unsubscribe handle (spec.md §4.2, §5 "Subscription handles are
/// owned by the subscriber"). Dropping it, or calling `unsubscribe`
/// explicitly, stops the callback task.
pub struct Subscription {
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kubelens_core::{CommonFields, NormalizedRecord};
    use std::collections::BTreeMap;
    use std::sync::mpsc;

    fn pod(namespace: &str, name: &str, resource_version: &str) -> NormalizedRecord {
        NormalizedRecord::Pod {
            common: CommonFields {
                name: name.to_string(),
                namespace: namespace.to_string(),
                labels: BTreeMap::new(),
                resource_version: resource_version.to_string(),
                creation_time: chrono::Utc::now(),
            },
            phase: "Running".to_string(),
            containers: vec![],
            pod_ip: None,
            host_ip: None,
            started_at: None,
            owner_references: vec![],
            status: kubelens_core::PodStatus::Running,
        }
    }

    #[tokio::test]
    async fn apply_added_then_snapshot_returns_it() {
        let store = Store::default();
        store.apply(EventKind::Added, pod("a", "p1", "1"));
        let snapshot = store.snapshot(ResourceKind::Pod, None);
        assert_eq!(snapshot.len(), 1);
    }

    #[tokio::test]
    async fn snapshot_filters_by_namespace() {
        let store = Store::default();
        store.apply(EventKind::Added, pod("a", "p1", "1"));
        store.apply(EventKind::Added, pod("b", "p2", "1"));
        assert_eq!(store.snapshot(ResourceKind::Pod, Some("a")).len(), 1);
        assert_eq!(store.snapshot(ResourceKind::Pod, None).len(), 2);
    }

    #[tokio::test]
    async fn added_then_deleted_leaves_count_unchanged() {
        let store = Store::default();
        let before = store.snapshot(ResourceKind::Pod, None).len();
        store.apply(EventKind::Added, pod("a", "p1", "1"));
        store.apply(EventKind::Deleted, pod("a", "p1", "2"));
        assert_eq!(store.snapshot(ResourceKind::Pod, None).len(), before);
    }

    #[tokio::test]
    async fn modified_replaces_even_when_equal() {
        let store = Store::default();
        store.apply(EventKind::Added, pod("a", "p1", "1"));
        store.apply(EventKind::Modified, pod("a", "p1", "1"));
        assert_eq!(store.snapshot(ResourceKind::Pod, None).len(), 1);
    }

    #[tokio::test]
    async fn subscriber_receives_events_after_subscribe() {
        let store = Store::default();
        let (tx, rx) = mpsc::channel();
        let _sub = store.subscribe(ResourceKind::Pod, move |event| {
            let _ = tx.send(event);
        });
        // give the subscriber task a chance to register its receiver
        tokio::task::yield_now().await;
        store.apply(EventKind::Added, pod("a", "p1", "1"));
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let received = rx.try_recv().unwrap();
        assert!(matches!(received, BusEvent::Change(_)));
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let store = Store::default();
        let (tx, rx) = mpsc::channel();
        let sub = store.subscribe(ResourceKind::Pod, move |event| {
            let _ = tx.send(event);
        });
        sub.unsubscribe();
        tokio::task::yield_now().await;
        store.apply(EventKind::Added, pod("a", "p1", "1"));
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(rx.try_recv().is_err());
    }

    /// spec.md §4.2 "Slow-consumer policy": a subscription that falls
    /// behind the bus's capacity sees a `Lagged` event (GLOSSARY
    /// "Lagged subscription" counter), not a silently truncated stream.
    #[tokio::test]
    async fn lagged_subscription_surfaces_lagged_event() {
        let store = Store::new(1);
        let (tx, rx) = mpsc::channel();
        let _sub = store.subscribe(ResourceKind::Pod, move |event| {
            let _ = tx.send(event);
        });
        // No yield point here: on the current-thread test executor the
        // subscriber task cannot run until we await, so these sends
        // overflow the capacity-1 channel before anything drains it.
        for i in 0..5 {
            store.apply(EventKind::Added, pod("a", &format!("p{i}"), "1"));
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let mut saw_lagged = false;
        while let Ok(event) = rx.try_recv() {
            saw_lagged |= matches!(event, BusEvent::Lagged { .. });
        }
        assert!(saw_lagged);
    }

    #[tokio::test]
    async fn keys_lists_identities_for_reconciliation() {
        let store = Store::default();
        store.apply(EventKind::Added, pod("a", "p1", "1"));
        store.apply(EventKind::Added, pod("a", "p2", "1"));
        let keys = store.keys(ResourceKind::Pod);
        assert_eq!(keys.len(), 2);
    }
}
