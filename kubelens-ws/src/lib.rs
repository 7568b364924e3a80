//! The WebSocket session layer (spec.md §4.3): wire protocol types, the
//! per-client session state machine, the admission-limited session
//! manager, and the typed authentication hook.

mod authorizer;
mod manager;
mod session;
mod wire;

pub use authorizer::{AllowAll, SessionAuthorizer};
pub use manager::SessionManager;
pub use session::run as run_session;
pub use wire::{namespace_label, InboundFrame, OutboundFrame, SubscriptionKey};
