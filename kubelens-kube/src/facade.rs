use async_trait::async_trait;
use futures::stream::BoxStream;
use kubelens_core::ResourceKind;
use serde::Serialize;

use crate::error::Error;
use crate::raw::{ListOptions, ListResult, RawEvent, WatchOptions};

/// Per-pod resource usage, the single on-demand read kept around as a
/// sidecar concern (spec.md §4.4, §9 design notes).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PodMetrics {
    pub cpu_millicores: u64,
    pub memory_bytes: u64,
}

/// The seam the watcher and the on-demand metrics path depend on,
/// replacing the source's runtime-typed "client bag" with a typed
/// interface (spec.md §9): `list`/`watch`/`read_metrics`, implemented
/// either by a real `kube::Client` or by static mock fixtures.
#[async_trait]
pub trait KubeFacade: Send + Sync {
    async fn list(&self, kind: ResourceKind, options: &ListOptions) -> Result<ListResult, Error>;

    fn watch(&self, kind: ResourceKind, options: WatchOptions) -> BoxStream<'static, Result<RawEvent, Error>>;

    async fn read_metrics(&self, namespace: &str, pod: &str) -> Result<PodMetrics, Error>;
}
