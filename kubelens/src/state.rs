use std::sync::Arc;
use std::time::Duration;

use kubelens_cache::TtlCache;
use kubelens_config::{Config, NamespaceFilter};
use kubelens_kube::{KubeFacade, PodMetrics};
use kubelens_store::Store;

/// Shared application state handed to every axum handler.
///
/// Holds no mutable fields directly -- `Store` and `TtlCache` are
/// internally synchronized, matching the rule in spec.md §9 that there
/// is no global mutable module state, only explicit long-lived objects
/// built at startup and passed through context.
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub namespace_filter: NamespaceFilter,
    pub facade: Arc<dyn KubeFacade>,
    pub metrics_cache: Arc<TtlCache<Option<Arc<PodMetrics>>>>,
    pub pod_metrics_ttl: Duration,
}

impl AppState {
    pub fn new(config: &Config, store: Store, namespace_filter: NamespaceFilter, facade: Arc<dyn KubeFacade>) -> Self {
        Self {
            store,
            namespace_filter,
            facade,
            metrics_cache: Arc::new(TtlCache::new()),
            pod_metrics_ttl: Duration::from_secs(config.cache_ttl_seconds("pod_metrics")),
        }
    }
}
