use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use kubelens_core::ResourceKind;

use crate::error::Error;
use crate::facade::{KubeFacade, PodMetrics};
use crate::raw::{ListOptions, ListResult, RawEvent, RawObject, WatchOptions};

/// `KubeFacade` driven by static fixtures, used for `kube.mode: mock`
/// and by the test suite. Seeded objects are served from `list`;
/// events pushed through `MockHandle` after a watcher subscribes are
/// replayed on the per-kind broadcast channel.
/// A fixture-stream item: either a real event or a synthesized fault,
/// so tests can exercise the watcher's 410-Gone/backoff paths without
/// a real `kube::Error` to wrap (spec.md §8 boundary behaviors).
#[derive(Debug, Clone)]
enum MockItem {
    Event(RawEvent),
    Gone,
    Transient(String),
}

pub struct MockFacade {
    state: Arc<Mutex<HashMap<ResourceKind, Vec<RawObject>>>>,
    channels: Arc<Mutex<HashMap<ResourceKind, broadcast::Sender<MockItem>>>>,
    metrics: Arc<Mutex<HashMap<(String, String), PodMetrics>>>,
}

/// A handle retained by test setup code to push events into a running
/// `MockFacade` after watchers have subscribed.
#[derive(Clone)]
pub struct MockHandle {
    state: Arc<Mutex<HashMap<ResourceKind, Vec<RawObject>>>>,
    channels: Arc<Mutex<HashMap<ResourceKind, broadcast::Sender<MockItem>>>>,
    metrics: Arc<Mutex<HashMap<(String, String), PodMetrics>>>,
}

impl Default for MockFacade {
    fn default() -> Self {
        Self::new()
    }
}

impl MockFacade {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(HashMap::new())),
            channels: Arc::new(Mutex::new(HashMap::new())),
            metrics: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn handle(&self) -> MockHandle {
        MockHandle {
            state: self.state.clone(),
            channels: self.channels.clone(),
            metrics: self.metrics.clone(),
        }
    }

    fn sender(&self, kind: ResourceKind) -> broadcast::Sender<MockItem> {
        self.channels
            .lock()
            .entry(kind)
            .or_insert_with(|| broadcast::channel(1024).0)
            .clone()
    }
}

impl MockHandle {
    /// Seed the initial list contents for a kind, as if the fixtures
    /// were present before any watcher started.
    pub fn seed(&self, kind: ResourceKind, objects: Vec<RawObject>) {
        self.state.lock().insert(kind, objects);
    }

    /// Push a live event, visible to any watcher already subscribed to
    /// this kind's channel. Also keeps the seeded list in sync so a
    /// re-list after this call reflects the same state.
    pub fn push(&self, kind: ResourceKind, event: RawEvent) {
        let mut state = self.state.lock();
        let objects = state.entry(kind).or_default();
        match &event {
            RawEvent::Added(obj) | RawEvent::Modified(obj) => {
                let key = (obj.metadata.namespace.clone(), obj.metadata.name.clone());
                objects.retain(|existing| (&existing.metadata.namespace, &existing.metadata.name) != (&key.0, &key.1));
                objects.push(obj.clone());
            }
            RawEvent::Deleted(obj) => {
                let key = (obj.metadata.namespace.clone(), obj.metadata.name.clone());
                objects.retain(|existing| (&existing.metadata.namespace, &existing.metadata.name) != (&key.0, &key.1));
            }
            RawEvent::Bookmark { .. } => {}
        }
        drop(state);
        let sender = self.channels.lock().entry(kind).or_insert_with(|| broadcast::channel(1024).0).clone();
        let _ = sender.send(MockItem::Event(event));
    }

    /// Synthesize a 410-Gone on the next `watch` read for `kind`,
    /// forcing the watcher back to INIT (spec.md §4.1, S3).
    pub fn fail_gone(&self, kind: ResourceKind) {
        let sender = self.channels.lock().entry(kind).or_insert_with(|| broadcast::channel(1024).0).clone();
        let _ = sender.send(MockItem::Gone);
    }

    /// Synthesize a transient transport fault on the next `watch` read
    /// for `kind`, exercising the watcher's backoff path.
    pub fn fail_transient(&self, kind: ResourceKind, message: &str) {
        let sender = self.channels.lock().entry(kind).or_insert_with(|| broadcast::channel(1024).0).clone();
        let _ = sender.send(MockItem::Transient(message.to_string()));
    }

    pub fn set_metrics(&self, namespace: &str, pod: &str, metrics: PodMetrics) {
        self.metrics.lock().insert((namespace.to_string(), pod.to_string()), metrics);
    }
}

#[async_trait]
impl KubeFacade for MockFacade {
    async fn list(&self, kind: ResourceKind, _options: &ListOptions) -> Result<ListResult, Error> {
        let items = self.state.lock().get(&kind).cloned().unwrap_or_default();
        let resource_version = items
            .iter()
            .filter_map(|o| o.metadata.resource_version.clone())
            .last()
            .unwrap_or_else(|| "0".to_string());
        Ok(ListResult { items, resource_version })
    }

    fn watch(&self, kind: ResourceKind, _options: WatchOptions) -> BoxStream<'static, Result<RawEvent, Error>> {
        let receiver = self.sender(kind).subscribe();
        tokio_stream::wrappers::BroadcastStream::new(receiver)
            .filter_map(|item| async move {
                match item {
                    Ok(MockItem::Event(event)) => Some(Ok(event)),
                    Ok(MockItem::Gone) => Some(Err(Error::Gone)),
                    Ok(MockItem::Transient(message)) => Some(Err(Error::Transient(message))),
                    Err(tokio_stream::wrappers::errors::BroadcastStreamRecvError::Lagged(_)) => None,
                }
            })
            .boxed()
    }

    async fn read_metrics(&self, namespace: &str, pod: &str) -> Result<PodMetrics, Error> {
        self.metrics
            .lock()
            .get(&(namespace.to_string(), pod.to_string()))
            .cloned()
            .ok_or_else(|| Error::MetricsNotFound { namespace: namespace.to_string(), pod: pod.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use kube::core::{DynamicObject, ObjectMeta};

    fn obj(name: &str, namespace: &str) -> RawObject {
        DynamicObject {
            types: None,
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                resource_version: Some("1".to_string()),
                ..Default::default()
            },
            data: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn list_returns_seeded_objects() {
        let facade = MockFacade::new();
        let handle = facade.handle();
        handle.seed(ResourceKind::Pod, vec![obj("p1", "a")]);
        let result = facade.list(ResourceKind::Pod, &ListOptions::default()).await.unwrap();
        assert_eq!(result.items.len(), 1);
    }

    #[tokio::test]
    async fn watch_receives_pushed_events() {
        let facade = MockFacade::new();
        let handle = facade.handle();
        let mut stream = facade.watch(
            ResourceKind::Pod,
            WatchOptions { resource_version: "1".into(), label_selector: None, field_selector: None, timeout_seconds: 300 },
        );
        handle.push(ResourceKind::Pod, RawEvent::Added(obj("p1", "a")));
        let event = stream.next().await.unwrap().unwrap();
        assert!(matches!(event, RawEvent::Added(_)));
    }

    #[tokio::test]
    async fn watch_surfaces_injected_gone_fault() {
        let facade = MockFacade::new();
        let handle = facade.handle();
        let mut stream = facade.watch(
            ResourceKind::Pod,
            WatchOptions { resource_version: "1".into(), label_selector: None, field_selector: None, timeout_seconds: 300 },
        );
        handle.fail_gone(ResourceKind::Pod);
        let error = stream.next().await.unwrap().unwrap_err();
        assert!(error.is_gone());
    }

    #[tokio::test]
    async fn watch_surfaces_injected_transient_fault() {
        let facade = MockFacade::new();
        let handle = facade.handle();
        let mut stream = facade.watch(
            ResourceKind::Pod,
            WatchOptions { resource_version: "1".into(), label_selector: None, field_selector: None, timeout_seconds: 300 },
        );
        handle.fail_transient(ResourceKind::Pod, "connection reset");
        let error = stream.next().await.unwrap().unwrap_err();
        assert!(!error.is_gone());
    }
}
