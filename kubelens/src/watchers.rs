use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use kubelens_config::{Config, NamespaceFilter};
use kubelens_core::ResourceKind;
use kubelens_kube::KubeFacade;
use kubelens_store::Store;
use kubelens_watcher::Watcher;

/// Spawn one `Watcher` task per `ResourceKind::ALL` (spec.md §4.1,
/// §5 "one task per watcher"). Each watcher is supervised only by its
/// own internal backoff loop; this function's job is solely to start
/// them and hand back a way to wait for clean shutdown.
pub fn spawn_all(
    config: &Config,
    facade: Arc<dyn KubeFacade>,
    store: Store,
    namespace_filter: NamespaceFilter,
    cancel: &CancellationToken,
) -> Vec<JoinHandle<()>> {
    ResourceKind::ALL
        .into_iter()
        .map(|kind| {
            let watcher = Watcher::new(
                kind,
                facade.clone(),
                store.clone(),
                namespace_filter.clone(),
                config.watch.retry.clone(),
                config.watch.list_timeout_seconds as u32,
            );
            let child_cancel = cancel.child_token();
            tokio::spawn(async move {
                tracing::info!(%kind, "watcher starting");
                watcher.run(child_cancel).await;
                tracing::info!(%kind, "watcher stopped");
            })
        })
        .collect()
}
