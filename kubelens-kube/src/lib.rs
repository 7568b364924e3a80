//! The Kubernetes API facade: a typed seam (`KubeFacade`) the watcher
//! depends on, with a real implementation over `kube::Client` and a
//! static-fixture mock used for `kube.mode: mock` and tests.
//!
//! Grounded in spec.md §9's re-architecting note: the source's
//! runtime-typed client bag becomes one small trait here.

mod error;
mod facade;
mod mock;
mod raw;
mod real;

pub use error::Error;
pub use facade::{KubeFacade, PodMetrics};
pub use mock::{MockFacade, MockHandle};
pub use raw::{api_resource_for, ListOptions, ListResult, RawEvent, RawObject, WatchOptions};
pub use real::RealFacade;
