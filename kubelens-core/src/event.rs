use serde::{Deserialize, Serialize};

use crate::kind::ResourceKind;
use crate::record::NormalizedRecord;

/// The kind of change a store event represents.
///
/// `Initial` is synthetic: it marks records replayed from a snapshot at
/// subscribe time, semantically equivalent to `Added` but distinguishable
/// so clients can defer rendering until a burst completes (spec §3, §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventKind {
    Added,
    Modified,
    Deleted,
    Initial,
}

/// A single normalized change flowing from the watcher into the store,
/// and from the store out to subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreEvent {
    pub event_kind: EventKind,
    pub kind: ResourceKind,
    pub record: NormalizedRecord,
}

impl StoreEvent {
    pub fn new(event_kind: EventKind, record: NormalizedRecord) -> Self {
        Self { kind: record.kind(), event_kind, record }
    }
}
