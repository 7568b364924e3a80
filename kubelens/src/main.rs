//! Process entry point: loads configuration, builds the Kubernetes API
//! facade, starts one watcher per configured kind, wires the axum
//! HTTP/WebSocket listener, and owns graceful shutdown (spec.md §6,
//! SPEC_FULL.md "MODULE: wire-http").

mod cli;
mod http;
mod shutdown;
mod state;
mod watchers;

use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tower_http::trace::{DefaultMakeSpan, TraceLayer};
use tracing_subscriber::EnvFilter;

use kubelens_config::{Config, KubeMode};
use kubelens_kube::{KubeFacade, MockFacade, RealFacade};
use kubelens_store::Store;
use kubelens_ws::{AllowAll, SessionManager};

use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Args::parse();
    init_tracing(&args.log_level);

    let config = Config::load(&args.config).map_err(|error| {
        tracing::error!(%error, "fatal misconfiguration, refusing to start");
        error
    })?;

    let namespace_filter = config.namespace_filter()?;
    let facade = build_facade(&config).await?;
    let subscription_capacity = config.ws.outgoing_queue_size.max(1);
    let store = Store::new(subscription_capacity);

    let cancel = CancellationToken::new();
    let watcher_handles = watchers::spawn_all(&config, facade.clone(), store.clone(), namespace_filter.clone(), &cancel);

    let app_state = AppState::new(&config, store.clone(), namespace_filter, facade);
    let sessions = SessionManager::new(store, config.ws.clone(), Arc::new(AllowAll));

    let router = http::router(app_state, sessions.clone())
        .layer(TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::new().level(tracing::Level::INFO)));

    let listener = tokio::net::TcpListener::bind(&config.listen_address).await?;
    tracing::info!(address = %config.listen_address, "listening");

    axum::serve(listener, router).with_graceful_shutdown(shutdown::signalled()).await?;

    tracing::info!("http listener stopped, draining sessions and watchers");
    cancel.cancel();
    sessions.shutdown().await;
    for handle in watcher_handles {
        let _ = handle.await;
    }

    Ok(())
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Build the `KubeFacade` according to `kube.mode` (spec.md §6).
async fn build_facade(config: &Config) -> anyhow::Result<Arc<dyn KubeFacade>> {
    match config.kube.mode {
        KubeMode::Mock => Ok(Arc::new(MockFacade::new())),
        mode @ (KubeMode::InCluster | KubeMode::Kubeconfig) => {
            let facade = RealFacade::build(mode, config.kube.kubeconfig_path.as_deref()).await?;
            Ok(Arc::new(facade))
        }
    }
}
