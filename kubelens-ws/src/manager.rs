use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::http::HeaderMap;
use futures::SinkExt;
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use kubelens_config::WsConfig;
use kubelens_store::Store;

use crate::authorizer::SessionAuthorizer;
use crate::session;

/// Owns the process-wide admission semaphore (spec.md §4.3 "Admission
/// limit") and the set of live session tasks, so shutdown can drain
/// them within a bounded window (spec.md §5 "Cancellation and
/// timeouts").
pub struct SessionManager {
    store: Store,
    config: WsConfig,
    authorizer: Arc<dyn SessionAuthorizer>,
    semaphore: Arc<Semaphore>,
    shutdown: CancellationToken,
    tasks: Mutex<JoinSet<()>>,
}

impl SessionManager {
    pub fn new(store: Store, config: WsConfig, authorizer: Arc<dyn SessionAuthorizer>) -> Arc<Self> {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_sessions.max(1)));
        Arc::new(Self {
            store,
            config,
            authorizer,
            semaphore,
            shutdown: CancellationToken::new(),
            tasks: Mutex::new(JoinSet::new()),
        })
    }

    /// Admit an upgraded socket. Rejects with 1013 before any
    /// subscription is accepted if the admission limit is already at
    /// capacity (spec.md §8 boundary behavior).
    pub fn accept(self: &Arc<Self>, socket: WebSocket, headers: HeaderMap) {
        let permit = match self.semaphore.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                tracing::warn!("rejecting connection, admission limit reached");
                tokio::spawn(reject_overloaded(socket));
                return;
            }
        };

        let store = self.store.clone();
        let config = self.config.clone();
        let authorizer = self.authorizer.clone();
        let shutdown = self.shutdown.child_token();

        self.tasks.lock().spawn(async move {
            session::run(socket, store, config, authorizer, headers, permit, shutdown).await;
        });
    }

    /// Cancel every live session and wait up to 5 seconds for them to
    /// close with 1001, then forcibly abort whatever remains (spec.md
    /// §4.3 "On server shutdown all sessions receive close code 1001
    /// within a 5 s drain window, then are forcibly closed").
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let mut tasks = {
            let mut guard = self.tasks.lock();
            std::mem::replace(&mut *guard, JoinSet::new())
        };
        let drain = async {
            while tasks.join_next().await.is_some() {}
        };
        if tokio::time::timeout(Duration::from_secs(5), drain).await.is_err() {
            tracing::warn!("session drain window elapsed, aborting remaining sessions");
            tasks.abort_all();
        }
    }
}

async fn reject_overloaded(mut socket: WebSocket) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame { code: 1013, reason: "overloaded".into() })))
        .await;
}
