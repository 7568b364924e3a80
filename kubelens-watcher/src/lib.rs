//! The per-kind watcher: list-then-watch, 410-Gone re-list with
//! reconciliation, exponential backoff, and the normalization rules
//! that turn raw API objects into `NormalizedRecord`s (spec.md §4.1).

mod normalize;
mod watcher;

pub use normalize::normalize;
pub use watcher::Watcher;
