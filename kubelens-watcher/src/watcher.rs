use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use kubelens_config::{NamespaceFilter, RetryConfig};
use kubelens_core::{EventKind, NormalizedRecord, ResourceKind};
use kubelens_kube::{Error as KubeError, KubeFacade, ListOptions, RawEvent, WatchOptions};
use kubelens_store::Store;

use crate::normalize::normalize;

const DISPATCH_CHANNEL_CAPACITY: usize = 256;

/// The name a namespace filter should be matched against for this
/// record (spec.md §6: patterns match "the namespace's own name").
/// `Namespace` records carry their own name as an empty
/// `CommonFields.namespace` (kubelens-core's cluster-scoped identity
/// convention), so filtering them by `record.namespace()` would match
/// against `""` instead of the namespace's actual name.
fn filter_key(record: &NormalizedRecord) -> &str {
    match record {
        NormalizedRecord::Namespace { .. } => &record.common().name,
        _ => record.namespace(),
    }
}

/// Per-kind watcher metrics counters (SPEC_FULL.md supplemented feature:
/// internal observability, not a metrics-server integration).
#[derive(Default)]
struct Metrics {
    applied: AtomicU64,
    deleted: AtomicU64,
    resume_generation: AtomicU64,
}

/// Maintains, for one resource kind, a live stream of normalized events
/// feeding the Store, recovering from transport and versioning faults
/// without external intervention (spec.md §4.1).
pub struct Watcher {
    kind: ResourceKind,
    facade: Arc<dyn KubeFacade>,
    store: Store,
    namespace_filter: NamespaceFilter,
    retry: RetryConfig,
    list_timeout_seconds: u32,
    metrics: Metrics,
}

enum WatchOutcome {
    /// The server rejected the resume cursor; a re-list is mandatory.
    Gone,
    /// The stream ended without error (the server-side `timeout_seconds`
    /// elapsed); reconnect from the same cursor, no backoff.
    Ended,
    /// A network error, an unexpected stream close, or a non-410 API
    /// error; back off before reconnecting.
    TransientFault,
    Cancelled,
}

impl Watcher {
    pub fn new(
        kind: ResourceKind,
        facade: Arc<dyn KubeFacade>,
        store: Store,
        namespace_filter: NamespaceFilter,
        retry: RetryConfig,
        list_timeout_seconds: u32,
    ) -> Self {
        Self { kind, facade, store, namespace_filter, retry, list_timeout_seconds, metrics: Metrics::default() }
    }

    fn build_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_secs(self.retry.initial_seconds))
            .with_max_interval(Duration::from_secs(self.retry.max_seconds))
            .with_multiplier(2.0)
            .with_max_elapsed_time(None)
            .build()
    }

    /// Run the state machine until `cancel` fires. Never returns early
    /// on a recoverable fault (spec.md §4.1 "the watcher never exits
    /// voluntarily").
    pub async fn run(self, cancel: CancellationToken) {
        let mut backoff = self.build_backoff();

        loop {
            if cancel.is_cancelled() {
                return;
            }

            let cursor = match self.init().await {
                Ok(cursor) => {
                    backoff.reset();
                    self.metrics.resume_generation.fetch_add(1, Ordering::Relaxed);
                    cursor
                }
                Err(error) => {
                    tracing::warn!(kind = %self.kind, %error, "initial list failed, retrying");
                    self.sleep_backoff(&mut backoff, &cancel).await;
                    continue;
                }
            };

            if self.watch_until_relist(cursor, &mut backoff, &cancel).await {
                return;
            }
        }
    }

    /// **INIT**: full list, emit every item as `INITIAL`, synthesize
    /// deletes for keys the store still holds but the new list dropped
    /// (reconciliation), signal burst completion, return the resume
    /// cursor.
    async fn init(&self) -> Result<String, KubeError> {
        let list = self.facade.list(self.kind, &ListOptions::default()).await?;

        let mut seen = std::collections::HashSet::new();
        for raw in &list.items {
            let record = normalize(self.kind, raw);
            if !self.namespace_filter.matches(filter_key(&record)) {
                continue;
            }
            seen.insert(record.identity());
            self.store.apply(EventKind::Initial, record);
        }

        for key in self.store.keys(self.kind) {
            if !seen.contains(&key) {
                if let Some(existing) = self.store.get(&key) {
                    self.store.apply(EventKind::Deleted, existing);
                    self.metrics.deleted.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        self.store.mark_initial_sync_complete(self.kind, seen.len());
        tracing::debug!(kind = %self.kind, count = seen.len(), "initial sync complete");
        Ok(list.resource_version)
    }

    /// Runs **WATCH**/**BACKOFF** until a 410 forces a re-list (returns
    /// `false`) or cancellation is observed (returns `true`).
    async fn watch_until_relist(
        &self,
        mut cursor: String,
        backoff: &mut ExponentialBackoff,
        cancel: &CancellationToken,
    ) -> bool {
        loop {
            let (outcome, new_cursor) = self.watch_once(cursor, cancel).await;
            cursor = new_cursor;
            match outcome {
                WatchOutcome::Gone => return false,
                WatchOutcome::Cancelled => return true,
                WatchOutcome::Ended => {
                    backoff.reset();
                }
                WatchOutcome::TransientFault => {
                    self.sleep_backoff(backoff, cancel).await;
                }
            }
            if cancel.is_cancelled() {
                return true;
            }
        }
    }

    async fn sleep_backoff(&self, backoff: &mut ExponentialBackoff, cancel: &CancellationToken) {
        let delay = backoff.next_backoff().unwrap_or(Duration::from_secs(self.retry.max_seconds));
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(delay) => {}
        }
    }

    /// One `watch` call from `cursor`. The stream reader never touches
    /// the Store directly (spec.md §5): normalized, filter-passing
    /// events are forwarded over a bounded channel to a dedicated
    /// dispatcher task that calls `Store::apply`.
    async fn watch_once(&self, cursor: String, cancel: &CancellationToken) -> (WatchOutcome, String) {
        let options = WatchOptions {
            resource_version: cursor.clone(),
            label_selector: None,
            field_selector: None,
            timeout_seconds: self.list_timeout_seconds,
        };
        let mut stream = self.facade.watch(self.kind, options);

        let (dispatch_tx, mut dispatch_rx) = mpsc::channel::<(EventKind, NormalizedRecord)>(DISPATCH_CHANNEL_CAPACITY);
        let store = self.store.clone();
        let dispatcher = tokio::spawn(async move {
            while let Some((event_kind, record)) = dispatch_rx.recv().await {
                store.apply(event_kind, record);
            }
        });

        let mut cursor = cursor;
        let outcome = loop {
            tokio::select! {
                _ = cancel.cancelled() => break WatchOutcome::Cancelled,
                next = stream.next() => match next {
                    None => break WatchOutcome::Ended,
                    Some(Ok(RawEvent::Bookmark { resource_version })) => {
                        cursor = resource_version;
                    }
                    Some(Ok(event)) => {
                        let (event_kind, raw) = match event {
                            RawEvent::Added(obj) => (EventKind::Added, obj),
                            RawEvent::Modified(obj) => (EventKind::Modified, obj),
                            RawEvent::Deleted(obj) => (EventKind::Deleted, obj),
                            RawEvent::Bookmark { .. } => unreachable!("handled above"),
                        };
                        let record = normalize(self.kind, &raw);
                        cursor = record.resource_version().to_string();
                        if self.namespace_filter.matches(filter_key(&record)) {
                            if event_kind == EventKind::Deleted {
                                self.metrics.deleted.fetch_add(1, Ordering::Relaxed);
                            } else {
                                self.metrics.applied.fetch_add(1, Ordering::Relaxed);
                            }
                            if dispatch_tx.send((event_kind, record)).await.is_err() {
                                break WatchOutcome::Cancelled;
                            }
                        }
                    }
                    Some(Err(error)) if error.is_gone() => break WatchOutcome::Gone,
                    Some(Err(error)) => {
                        tracing::warn!(kind = %self.kind, %error, "transient watch fault");
                        break WatchOutcome::TransientFault;
                    }
                },
            }
        };

        // Graceful teardown (spec.md §4.1): drop the sender so the
        // dispatcher drains whatever is already queued, then wait for
        // it to finish before emitting no further events to the Store.
        drop(dispatch_tx);
        let _ = dispatcher.await;

        (outcome, cursor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::{DynamicObject, ObjectMeta};
    use kubelens_kube::MockFacade;
    use std::time::Duration as StdDuration;

    fn pod_obj(namespace: &str, name: &str, resource_version: &str, phase: &str) -> DynamicObject {
        DynamicObject {
            types: None,
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                resource_version: Some(resource_version.to_string()),
                ..Default::default()
            },
            data: serde_json::json!({"status": {"phase": phase}}),
        }
    }

    fn namespace_obj(name: &str, resource_version: &str, phase: &str) -> DynamicObject {
        DynamicObject {
            types: None,
            metadata: ObjectMeta { name: Some(name.to_string()), resource_version: Some(resource_version.to_string()), ..Default::default() },
            data: serde_json::json!({"status": {"phase": phase}}),
        }
    }

    fn watcher(facade: Arc<dyn KubeFacade>, store: Store, filter: NamespaceFilter) -> Watcher {
        watcher_of_kind(ResourceKind::Pod, facade, store, filter)
    }

    fn watcher_of_kind(kind: ResourceKind, facade: Arc<dyn KubeFacade>, store: Store, filter: NamespaceFilter) -> Watcher {
        Watcher::new(kind, facade, store, filter, RetryConfig { initial_seconds: 1, max_seconds: 1 }, 300)
    }

    #[tokio::test]
    async fn init_applies_seeded_items() {
        let mock = MockFacade::new();
        let mock_handle = mock.handle();
        mock_handle.seed(ResourceKind::Pod, vec![pod_obj("a", "p1", "1", "Running")]);
        let facade: Arc<dyn KubeFacade> = Arc::new(mock);

        let store = Store::default();
        let w = watcher(facade, store.clone(), NamespaceFilter::allow_all());
        w.init().await.unwrap();
        assert_eq!(store.snapshot(ResourceKind::Pod, None).len(), 1);
    }

    #[tokio::test]
    async fn init_reconciles_keys_missing_from_new_list() {
        let mock = MockFacade::new();
        let mock_handle = mock.handle();
        mock_handle.seed(ResourceKind::Pod, vec![pod_obj("a", "p1", "1", "Running")]);
        let facade: Arc<dyn KubeFacade> = Arc::new(mock);

        let store = Store::default();
        store.apply(EventKind::Added, normalize(ResourceKind::Pod, &pod_obj("a", "stale", "0", "Running")));

        let w = watcher(facade, store.clone(), NamespaceFilter::allow_all());
        w.init().await.unwrap();

        let names: Vec<_> = store.snapshot(ResourceKind::Pod, None).iter().map(|r| r.common().name.clone()).collect();
        assert_eq!(names, vec!["p1".to_string()]);
    }

    #[tokio::test]
    async fn namespace_filter_drops_items_at_init() {
        let mock = MockFacade::new();
        let mock_handle = mock.handle();
        mock_handle.seed(ResourceKind::Pod, vec![pod_obj("dev-a", "p1", "1", "Running")]);
        let facade: Arc<dyn KubeFacade> = Arc::new(mock);

        let store = Store::default();
        let filter = NamespaceFilter::compile(&["^prod-.*$".to_string()]).unwrap();
        let w = watcher(facade, store.clone(), filter);
        w.init().await.unwrap();
        assert!(store.snapshot(ResourceKind::Pod, None).is_empty());
    }

    /// `Namespace` records carry their own name as an empty
    /// `CommonFields.namespace`; the filter must match against the
    /// record's name, not its (always-empty) namespace field.
    #[tokio::test]
    async fn namespace_kind_filters_by_its_own_name() {
        let mock = MockFacade::new();
        let mock_handle = mock.handle();
        mock_handle.seed(
            ResourceKind::Namespace,
            vec![namespace_obj("prod-a", "1", "Active"), namespace_obj("dev-a", "1", "Active")],
        );
        let facade: Arc<dyn KubeFacade> = Arc::new(mock);

        let store = Store::default();
        let filter = NamespaceFilter::compile(&["^prod-.*$".to_string()]).unwrap();
        let w = watcher_of_kind(ResourceKind::Namespace, facade, store.clone(), filter);
        w.init().await.unwrap();

        let names: Vec<_> = store.snapshot(ResourceKind::Namespace, None).iter().map(|r| r.common().name.clone()).collect();
        assert_eq!(names, vec!["prod-a".to_string()]);
    }

    #[tokio::test]
    async fn watch_once_stops_promptly_on_cancellation() {
        let facade: Arc<dyn KubeFacade> = Arc::new(MockFacade::new());
        let store = Store::default();
        let w = watcher(facade, store, NamespaceFilter::allow_all());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let (outcome, _cursor) = w.watch_once("0".to_string(), &cancel).await;
        assert!(matches!(outcome, WatchOutcome::Cancelled));
    }

    #[tokio::test]
    async fn watch_once_applies_live_events_matching_filter() {
        let mock = MockFacade::new();
        let mock_handle = mock.handle();
        let facade: Arc<dyn KubeFacade> = Arc::new(mock);
        let store = Store::default();
        let w = watcher(facade, store.clone(), NamespaceFilter::allow_all());

        let cancel = CancellationToken::new();
        let cancel_for_task = cancel.clone();
        let task = tokio::spawn(async move { w.watch_once("0".to_string(), &cancel_for_task).await });

        tokio::task::yield_now().await;
        mock_handle.push(ResourceKind::Pod, RawEvent::Added(pod_obj("a", "p1", "1", "Running")));
        tokio::time::sleep(StdDuration::from_millis(20)).await;
        cancel.cancel();
        let _ = task.await;

        assert_eq!(store.snapshot(ResourceKind::Pod, None).len(), 1);
    }

    #[tokio::test]
    async fn watch_once_returns_gone_outcome_on_injected_fault() {
        let mock = MockFacade::new();
        let mock_handle = mock.handle();
        let facade: Arc<dyn KubeFacade> = Arc::new(mock);
        let store = Store::default();
        let w = watcher(facade, store, NamespaceFilter::allow_all());

        let cancel = CancellationToken::new();
        let cancel_for_task = cancel.clone();
        let task = tokio::spawn(async move { w.watch_once("0".to_string(), &cancel_for_task).await });

        tokio::task::yield_now().await;
        mock_handle.fail_gone(ResourceKind::Pod);
        let (outcome, _cursor) = task.await.unwrap();
        assert!(matches!(outcome, WatchOutcome::Gone));
    }

    /// S3: a 410 on the watch stream forces a re-list; keys present
    /// before the 410 but absent from the new list are synthesized as
    /// deletes, reconciling the store (spec.md §4.1, §8 invariant 5).
    #[tokio::test]
    async fn run_relists_and_reconciles_deleted_keys_after_gone() {
        let mock = MockFacade::new();
        let mock_handle = mock.handle();
        mock_handle.seed(ResourceKind::Pod, vec![pod_obj("a", "p1", "1", "Running"), pod_obj("a", "p2", "1", "Running")]);
        let facade: Arc<dyn KubeFacade> = Arc::new(mock);

        let store = Store::default();
        let w = watcher(facade, store.clone(), NamespaceFilter::allow_all());

        let cancel = CancellationToken::new();
        let cancel_for_task = cancel.clone();
        let task = tokio::spawn(async move { w.run(cancel_for_task).await });

        // Let the first INIT+WATCH cycle settle before changing the
        // fixture list out from under it.
        tokio::time::sleep(StdDuration::from_millis(30)).await;
        assert_eq!(store.snapshot(ResourceKind::Pod, None).len(), 2);

        mock_handle.seed(ResourceKind::Pod, vec![pod_obj("a", "p1", "1", "Running")]);
        mock_handle.fail_gone(ResourceKind::Pod);
        tokio::time::sleep(StdDuration::from_millis(30)).await;

        cancel.cancel();
        let _ = task.await;

        let names: Vec<_> = store.snapshot(ResourceKind::Pod, None).iter().map(|r| r.common().name.clone()).collect();
        assert_eq!(names, vec!["p1".to_string()]);
    }
}
