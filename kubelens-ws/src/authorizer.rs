//! A typed authentication hook at the session accept boundary
//! (SPEC_FULL.md supplemented feature; spec.md §9 Open Questions: "the
//! rewrite leaves authentication as a typed hook ... and does not
//! define policy"). `AllowAll` is the only policy this crate ships.

use async_trait::async_trait;
use axum::http::HeaderMap;

/// Invoked once per connection between HANDSHAKE and the `connection`
/// frame (spec.md §4.3). An `Err` rejects the session before any
/// subscription is accepted.
#[async_trait]
pub trait SessionAuthorizer: Send + Sync {
    async fn authorize(&self, headers: &HeaderMap) -> Result<(), String>;
}

/// The only implementation shipped: accepts every connection.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

#[async_trait]
impl SessionAuthorizer for AllowAll {
    async fn authorize(&self, _headers: &HeaderMap) -> Result<(), String> {
        Ok(())
    }
}
