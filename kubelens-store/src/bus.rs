use kubelens_core::StoreEvent;

/// What flows out of the fan-out bus for a single kind.
///
/// `Change` carries a normal store mutation. `InitialSyncComplete` is
/// the watcher's own batched-initial-delivery sentinel (spec.md §4.1
/// "Batched initial delivery"), distinct from the per-subscribe
/// snapshot-replay sentinel the session layer sends on its own -- this
/// one fires once per watcher re-list, for any session that happened
/// to be live-subscribed while the burst was in flight. `Lagged`
/// surfaces a dropped-events gap on the underlying broadcast channel
/// (spec.md §4.2 "Slow-consumer policy", GLOSSARY "Lagged subscription")
/// so the subscriber can recover by re-snapshotting.
#[derive(Debug, Clone)]
pub enum BusEvent {
    Change(StoreEvent),
    InitialSyncComplete { count: usize },
    Lagged { skipped: u64 },
}
