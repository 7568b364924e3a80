use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::http::HeaderMap;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{mpsc, OwnedSemaphorePermit};
use tokio_util::sync::CancellationToken;

use kubelens_config::WsConfig;
use kubelens_core::{EventKind, ResourceKind};
use kubelens_store::{BusEvent, Store, Subscription};

use crate::authorizer::SessionAuthorizer;
use crate::wire::{namespace_label, InboundFrame, OutboundFrame, SubscriptionKey};

/// Per-session state machine terminal reasons (spec.md §4.3's
/// HANDSHAKE/OPEN/DRAIN/CLOSED diagram collapses, in this
/// implementation, to "run until one of these, then close").
enum CloseReason {
    ClientClosed,
    Timeout,
    SlowConsumer,
    Shutdown,
}

impl CloseReason {
    fn wire(&self) -> (u16, &'static str) {
        match self {
            CloseReason::ClientClosed => (1000, "client closed"),
            CloseReason::Timeout => (1001, "keepalive timeout"),
            CloseReason::SlowConsumer => (1013, "slow consumer"),
            CloseReason::Shutdown => (1001, "server shutting down"),
        }
    }
}

/// One client's subscription set and outgoing queue.
struct Session {
    store: Store,
    outgoing: mpsc::Sender<Message>,
    subscriptions: HashMap<SubscriptionKey, Subscription>,
    overflowed: Arc<AtomicBool>,
}

impl Session {
    fn new(store: Store, outgoing: mpsc::Sender<Message>) -> Self {
        Self { store, outgoing, subscriptions: HashMap::new(), overflowed: Arc::new(AtomicBool::new(false)) }
    }

    fn overflowed(&self) -> bool {
        self.overflowed.load(Ordering::Relaxed)
    }

    /// Non-blocking enqueue. A full queue is this session's
    /// slow-consumer signal (spec.md §4.3), not something to wait out.
    fn send_now(&self, frame: OutboundFrame) -> Result<(), ()> {
        match self.outgoing.try_send(Message::Text(frame.to_json())) {
            Ok(()) => Ok(()),
            Err(_) => {
                self.overflowed.store(true, Ordering::Relaxed);
                Err(())
            }
        }
    }

    fn handle_frame(&mut self, text: &str) -> Result<(), CloseReason> {
        let frame = match serde_json::from_str::<InboundFrame>(text) {
            Ok(frame) => frame,
            Err(error) => {
                // Protocol violation: send an error frame, keep the
                // session open (spec.md §7).
                tracing::debug!(%error, "malformed client frame");
                let _ = self.send_now(OutboundFrame::Error { message: "malformed frame".to_string() });
                return self.close_if_overflowed();
            }
        };

        match frame {
            InboundFrame::Subscribe { resource_type, namespace } => self.subscribe(resource_type, namespace),
            InboundFrame::Unsubscribe { resource_type, namespace } => self.unsubscribe(resource_type, namespace),
            InboundFrame::Ping { timestamp } => {
                let _ = self.send_now(OutboundFrame::Pong { timestamp });
            }
            InboundFrame::Pong {} => {}
        }

        self.close_if_overflowed()
    }

    fn close_if_overflowed(&self) -> Result<(), CloseReason> {
        if self.overflowed() {
            Err(CloseReason::SlowConsumer)
        } else {
            Ok(())
        }
    }

    /// Subscribe-before-snapshot ordering (spec.md §4.3): register the
    /// live bus callback first, staging whatever it receives into a
    /// buffer; take the snapshot and replay it as `INITIAL`; then drain
    /// the staged buffer (preserving arrival order) before handing the
    /// callback over to direct passthrough. No gap, no duplication of
    /// ordering guarantees, between snapshot and live deltas.
    fn subscribe(&mut self, resource_type: ResourceKind, namespace: Option<String>) {
        let key = SubscriptionKey { resource_type, namespace: namespace.clone() };
        if self.subscriptions.contains_key(&key) {
            let _ = self.send_now(OutboundFrame::Subscribed { resource_type, namespace: namespace_label(&namespace) });
            return;
        }

        let staging: Arc<Mutex<Option<Vec<Message>>>> = Arc::new(Mutex::new(Some(Vec::new())));
        let staging_for_callback = staging.clone();
        let overflowed = self.overflowed.clone();
        let outgoing = self.outgoing.clone();
        let callback_namespace = namespace.clone();
        let store_for_callback = self.store.clone();

        let subscription = self.store.subscribe(resource_type, move |event| {
            let messages: Vec<Message> = match event {
                BusEvent::Change(store_event) => {
                    if !callback_namespace.as_deref().is_none_or(|ns| store_event.record.namespace() == ns) {
                        return;
                    }
                    let frame = OutboundFrame::Resource {
                        event_type: store_event.event_kind,
                        resource_type,
                        resource: store_event.record,
                    };
                    vec![Message::Text(frame.to_json())]
                }
                // `InitialSyncComplete` is the watcher's own burst
                // sentinel; each session subscription emits its own
                // `initial_state_complete` from the snapshot it replays.
                BusEvent::InitialSyncComplete { .. } => return,
                // The broadcast channel dropped events before this
                // subscription could read them (spec.md §4.2
                // "Slow-consumer policy"). Detect the lag and reset by
                // re-snapshotting, replayed the same way the initial
                // subscribe snapshot is.
                BusEvent::Lagged { skipped } => {
                    tracing::warn!(skipped, %resource_type, "session subscription lagged, resyncing from snapshot");
                    let snapshot = store_for_callback.snapshot(resource_type, callback_namespace.as_deref());
                    let count = snapshot.len();
                    let mut messages: Vec<Message> = snapshot
                        .into_iter()
                        .map(|record| {
                            Message::Text(
                                OutboundFrame::Resource { event_type: EventKind::Initial, resource_type, resource: record }
                                    .to_json(),
                            )
                        })
                        .collect();
                    messages.push(Message::Text(
                        OutboundFrame::InitialStateComplete {
                            resource_type,
                            count,
                            namespace: namespace_label(&callback_namespace),
                        }
                        .to_json(),
                    ));
                    messages
                }
            };
            let mut staged = staging_for_callback.lock();
            for message in messages {
                match staged.as_mut() {
                    Some(buffer) => buffer.push(message),
                    None => {
                        if outgoing.try_send(message).is_err() {
                            overflowed.store(true, Ordering::Relaxed);
                        }
                    }
                }
            }
        });

        let snapshot = self.store.snapshot(resource_type, namespace.as_deref());
        let count = snapshot.len();
        for record in snapshot {
            if self
                .send_now(OutboundFrame::Resource { event_type: EventKind::Initial, resource_type, resource: record })
                .is_err()
            {
                break;
            }
        }
        let _ = self.send_now(OutboundFrame::InitialStateComplete {
            resource_type,
            count,
            namespace: namespace_label(&namespace),
        });

        for message in staging.lock().take().unwrap_or_default() {
            if self.outgoing.try_send(message).is_err() {
                self.overflowed.store(true, Ordering::Relaxed);
            }
        }

        self.subscriptions.insert(key, subscription);
        let _ = self.send_now(OutboundFrame::Subscribed { resource_type, namespace: namespace_label(&namespace) });
    }

    fn unsubscribe(&mut self, resource_type: ResourceKind, namespace: Option<String>) {
        let key = SubscriptionKey { resource_type, namespace: namespace.clone() };
        if self.subscriptions.remove(&key).is_some() {
            let _ = self.send_now(OutboundFrame::Unsubscribed { resource_type, namespace: namespace_label(&namespace) });
        }
    }

    fn teardown(&mut self) {
        self.subscriptions.clear();
    }
}

/// Run one client's session to completion. Called by
/// `SessionManager::accept` once an admission permit has been granted.
///
/// `shutdown` is a child of the manager's process-wide token: it fires
/// once at server shutdown, closing this session with 1001 inside the
/// manager's drain window (spec.md §5, §4.3 "Backpressure and shutdown").
pub async fn run(
    socket: WebSocket,
    store: Store,
    config: WsConfig,
    authorizer: Arc<dyn SessionAuthorizer>,
    headers: HeaderMap,
    _permit: OwnedSemaphorePermit,
    shutdown: CancellationToken,
) {
    let mut socket = socket;
    if let Err(reason) = authorizer.authorize(&headers).await {
        let _ = socket.send(Message::Close(Some(CloseFrame { code: 1008, reason: reason.into() }))).await;
        return;
    }

    let (mut sink, mut stream) = socket.split();
    let (outgoing_tx, mut outgoing_rx) = mpsc::channel::<Message>(config.outgoing_queue_size.max(1));

    let writer = tokio::spawn(async move {
        while let Some(message) = outgoing_rx.recv().await {
            if sink.send(message).await.is_err() {
                break;
            }
        }
    });

    let mut session = Session::new(store, outgoing_tx.clone());
    let _ = session.send_now(OutboundFrame::connected());

    let ping_interval = Duration::from_secs(config.ping_interval_seconds.max(1));
    let idle_timeout = ping_interval * 3;
    let mut ticker = tokio::time::interval(ping_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await;
    let mut last_seen = tokio::time::Instant::now();

    let close_reason = loop {
        let outcome = tokio::select! {
            _ = shutdown.cancelled() => Some(CloseReason::Shutdown),
            _ = ticker.tick() => {
                if last_seen.elapsed() > idle_timeout {
                    Some(CloseReason::Timeout)
                } else if session.send_now(OutboundFrame::Ping { timestamp: None }).is_err() {
                    Some(CloseReason::SlowConsumer)
                } else {
                    None
                }
            }
            incoming = stream.next() => match incoming {
                None => Some(CloseReason::ClientClosed),
                Some(Ok(Message::Close(_))) => Some(CloseReason::ClientClosed),
                Some(Ok(Message::Text(text))) => {
                    last_seen = tokio::time::Instant::now();
                    session.handle_frame(&text).err()
                }
                Some(Ok(_)) => {
                    last_seen = tokio::time::Instant::now();
                    None
                }
                Some(Err(_)) => Some(CloseReason::ClientClosed),
            },
        };
        if let Some(reason) = outcome {
            break reason;
        }
        if session.overflowed() {
            break CloseReason::SlowConsumer;
        }
    };

    session.teardown();
    let (code, reason) = close_reason.wire();
    let _ = outgoing_tx.try_send(Message::Close(Some(CloseFrame { code, reason: reason.into() })));
    drop(outgoing_tx);
    let _ = writer.await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use kubelens_core::{CommonFields, NormalizedRecord, PodStatus};
    use std::collections::BTreeMap;

    fn pod(namespace: &str, name: &str) -> NormalizedRecord {
        NormalizedRecord::Pod {
            common: CommonFields {
                name: name.to_string(),
                namespace: namespace.to_string(),
                labels: BTreeMap::new(),
                resource_version: "1".to_string(),
                creation_time: chrono::Utc::now(),
            },
            phase: "Running".to_string(),
            containers: vec![],
            pod_ip: None,
            host_ip: None,
            started_at: None,
            owner_references: vec![],
            status: PodStatus::Running,
        }
    }

    fn frames(rx: &mut mpsc::Receiver<Message>) -> Vec<serde_json::Value> {
        let mut out = Vec::new();
        while let Ok(message) = rx.try_recv() {
            if let Message::Text(text) = message {
                out.push(serde_json::from_str(&text).unwrap());
            }
        }
        out
    }

    /// S1: subscribe replays exactly one INITIAL per matching record,
    /// followed by initial_state_complete, then live deltas in arrival
    /// order, with no frame for a namespace outside the filter.
    #[tokio::test]
    async fn subscribe_replays_snapshot_then_live_deltas_in_order() {
        let store = Store::default();
        store.apply(EventKind::Added, pod("a", "p1"));
        store.apply(EventKind::Added, pod("a", "p2"));
        store.apply(EventKind::Added, pod("b", "p3"));

        let (tx, mut rx) = mpsc::channel(64);
        let mut session = Session::new(store.clone(), tx);
        session.subscribe(ResourceKind::Pod, Some("a".to_string()));

        let frames = frames(&mut rx);
        assert_eq!(frames[0]["type"], "resource");
        assert_eq!(frames[0]["eventType"], "INITIAL");
        assert_eq!(frames[0]["resource"]["name"], "p1");
        assert_eq!(frames[1]["eventType"], "INITIAL");
        assert_eq!(frames[1]["resource"]["name"], "p2");
        assert_eq!(frames[2]["type"], "initial_state_complete");
        assert_eq!(frames[2]["count"], 2);
        assert_eq!(frames[2]["namespace"], "a");
        assert_eq!(frames[3]["type"], "subscribed");

        tokio::task::yield_now().await;
        store.apply(EventKind::Modified, pod("a", "p1"));
        store.apply(EventKind::Added, pod("a", "p4"));
        store.apply(EventKind::Added, pod("b", "p5"));
        tokio::time::sleep(Duration::from_millis(20)).await;

        let live = frames(&mut rx);
        assert_eq!(live.len(), 2);
        assert_eq!(live[0]["eventType"], "MODIFIED");
        assert_eq!(live[0]["resource"]["name"], "p1");
        assert_eq!(live[1]["eventType"], "ADDED");
        assert_eq!(live[1]["resource"]["name"], "p4");
    }

    /// spec.md §4.2: a lagged subscription is reset by re-snapshotting,
    /// not left permanently diverged from the Store.
    #[tokio::test]
    async fn lagged_subscription_resyncs_via_fresh_snapshot() {
        let store = Store::new(1);
        store.apply(EventKind::Added, pod("a", "p1"));

        let (tx, mut rx) = mpsc::channel(64);
        let mut session = Session::new(store.clone(), tx);
        session.subscribe(ResourceKind::Pod, Some("a".to_string()));
        frames(&mut rx);

        // No yield point: these overflow the capacity-1 bus before the
        // subscription's dedicated task can drain any of them, forcing
        // a `Lagged` event instead of a normal `Change`.
        for i in 0..5 {
            store.apply(EventKind::Added, pod("a", &format!("extra{i}")));
        }
        tokio::time::sleep(Duration::from_millis(20)).await;

        let resynced = frames(&mut rx);
        assert!(!resynced.is_empty());
        assert_eq!(resynced.last().unwrap()["type"], "initial_state_complete");
        let names: Vec<_> = resynced[..resynced.len() - 1].iter().map(|f| f["resource"]["name"].clone()).collect();
        assert!(names.iter().any(|n| n == "p1"));
    }

    #[tokio::test]
    async fn unsubscribe_stops_further_deltas() {
        let store = Store::default();
        let (tx, mut rx) = mpsc::channel(64);
        let mut session = Session::new(store.clone(), tx);
        session.subscribe(ResourceKind::Pod, None);
        frames(&mut rx);

        session.unsubscribe(ResourceKind::Pod, None);
        let unsub = frames(&mut rx);
        assert_eq!(unsub[0]["type"], "unsubscribed");

        tokio::task::yield_now().await;
        store.apply(EventKind::Added, pod("a", "p1"));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(frames(&mut rx).is_empty());
    }

    /// S4: a full outgoing queue is this session's slow-consumer
    /// signal; `handle_frame` reports it via `close_if_overflowed`
    /// rather than ever blocking the producer.
    #[tokio::test]
    async fn full_outgoing_queue_marks_session_overflowed() {
        let store = Store::default();
        for i in 0..8 {
            store.apply(EventKind::Added, pod("a", &format!("p{i}")));
        }
        let (tx, _rx) = mpsc::channel(4);
        let mut session = Session::new(store, tx);
        session.subscribe(ResourceKind::Pod, None);
        assert!(session.overflowed());
        assert!(matches!(session.close_if_overflowed(), Err(CloseReason::SlowConsumer)));
    }

    #[tokio::test]
    async fn malformed_frame_gets_error_response_and_stays_open() {
        let store = Store::default();
        let (tx, mut rx) = mpsc::channel(64);
        let mut session = Session::new(store, tx);
        let result = session.handle_frame("not json");
        assert!(result.is_ok());
        let sent = frames(&mut rx);
        assert_eq!(sent[0]["type"], "error");
    }
}
