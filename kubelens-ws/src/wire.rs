//! The WebSocket wire protocol (spec.md §4.3). Every frame is a JSON
//! object with a `type` field.

use serde::{Deserialize, Serialize};

use kubelens_core::{EventKind, NormalizedRecord, ResourceKind};

/// A frame received from a client.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundFrame {
    Subscribe {
        #[serde(rename = "resourceType")]
        resource_type: ResourceKind,
        #[serde(default)]
        namespace: Option<String>,
    },
    Unsubscribe {
        #[serde(rename = "resourceType")]
        resource_type: ResourceKind,
        #[serde(default)]
        namespace: Option<String>,
    },
    Ping {
        #[serde(default)]
        timestamp: Option<serde_json::Value>,
    },
    Pong {},
}

/// A frame sent to a client. `Resource`'s `event_type` reuses
/// `kubelens_core::EventKind`, whose wire form (`ADDED`, `MODIFIED`,
/// `DELETED`, `INITIAL`) is exactly the protocol's `eventType`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    Connection {
        status: &'static str,
    },
    Resource {
        #[serde(rename = "eventType")]
        event_type: EventKind,
        #[serde(rename = "resourceType")]
        resource_type: ResourceKind,
        resource: NormalizedRecord,
    },
    InitialStateComplete {
        #[serde(rename = "resourceType")]
        resource_type: ResourceKind,
        count: usize,
        namespace: String,
    },
    Subscribed {
        #[serde(rename = "resourceType")]
        resource_type: ResourceKind,
        namespace: String,
    },
    Unsubscribed {
        #[serde(rename = "resourceType")]
        resource_type: ResourceKind,
        namespace: String,
    },
    Ping {
        timestamp: Option<serde_json::Value>,
    },
    Pong {
        timestamp: Option<serde_json::Value>,
    },
    Error {
        message: String,
    },
    Warning {
        message: String,
    },
}

impl OutboundFrame {
    pub fn connected() -> Self {
        OutboundFrame::Connection { status: "connected" }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("OutboundFrame is always representable as JSON")
    }
}

/// The key a subscription is tracked under: a resource kind plus an
/// optional namespace. `None` means "all observable", bounded by the
/// watcher's global namespace-pattern filter (spec.md §4.3).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionKey {
    pub resource_type: ResourceKind,
    pub namespace: Option<String>,
}

/// Render the namespace half of a subscription key for outbound frames
/// (`"all"` when unset, spec.md §4.3's `initial_state_complete`/echo
/// fields).
pub fn namespace_label(namespace: &Option<String>) -> String {
    namespace.clone().unwrap_or_else(|| "all".to_string())
}
