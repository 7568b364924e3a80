use kube::core::DynamicObject;
use kubelens_core::ResourceKind;

/// A raw object as returned by the API server, untyped beyond its
/// metadata and a JSON body. The watcher is the only place that parses
/// kind-specific fields out of `data`.
pub type RawObject = DynamicObject;

/// One event from a `list` or `watch` call, before normalization.
#[derive(Debug, Clone)]
pub enum RawEvent {
    Added(RawObject),
    Modified(RawObject),
    Deleted(RawObject),
    /// Carries only an updated resume cursor.
    Bookmark { resource_version: String },
}

#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub label_selector: Option<String>,
    pub field_selector: Option<String>,
}

#[derive(Debug, Clone)]
pub struct WatchOptions {
    pub resource_version: String,
    pub label_selector: Option<String>,
    pub field_selector: Option<String>,
    /// Server-side timeout for the watch HTTP request (spec.md §6,
    /// `watch.list_timeout_seconds`). The server self-terminates the
    /// stream at this bound; the watcher reconnects from the cursor.
    pub timeout_seconds: u32,
}

pub struct ListResult {
    pub items: Vec<RawObject>,
    pub resource_version: String,
}

/// Map a kubelens resource kind to the Kubernetes GVK the real facade
/// queries. Kept here (rather than in `kubelens-core`) since it's a
/// concern of talking to the API, not of the normalized data model.
pub fn api_resource_for(kind: ResourceKind) -> kube::core::ApiResource {
    use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
    use k8s_openapi::api::core::v1::{Namespace, Pod};
    use kube::core::ApiResource;

    match kind {
        ResourceKind::Namespace => ApiResource::erase::<Namespace>(&()),
        ResourceKind::Deployment => ApiResource::erase::<Deployment>(&()),
        ResourceKind::StatefulSet => ApiResource::erase::<StatefulSet>(&()),
        ResourceKind::Pod => ApiResource::erase::<Pod>(&()),
    }
}
