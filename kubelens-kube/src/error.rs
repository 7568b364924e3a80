use thiserror::Error;

/// Errors surfaced by the Kubernetes API facade.
///
/// The watcher (`kubelens-watcher`) is the only consumer; it classifies
/// every variant here into the taxonomy of spec.md §7 (transient
/// transport, resume-gone, or — for facade construction only — fatal
/// misconfiguration).
#[derive(Error, Debug)]
pub enum Error {
    #[error("list failed: {0}")]
    List(#[source] kube::Error),

    #[error("watch stream failed to start: {0}")]
    WatchStart(#[source] kube::Error),

    #[error("watch stream error: {0}")]
    WatchStream(#[source] kube::Error),

    /// HTTP 410 Gone: the resume cursor is too old, caller must re-list.
    #[error("resume cursor is gone (410), re-list required")]
    Gone,

    /// A transient transport fault with no underlying `kube::Error` to
    /// wrap (e.g. an idle stream close, or one synthesized by
    /// `MockFacade` for tests). Classified identically to `WatchStream`
    /// by the watcher: backoff and retry (spec.md §7).
    #[error("transient transport fault: {0}")]
    Transient(String),

    #[error("metrics read failed: {0}")]
    Metrics(#[source] kube::Error),

    #[error("no metrics recorded for {namespace}/{pod}")]
    MetricsNotFound { namespace: String, pod: String },

    #[error("failed to build kube client: {0}")]
    ClientBuild(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("unsupported kube mode for a real client facade")]
    UnsupportedMode,
}

impl Error {
    /// Whether this is the 410-Gone condition that the watcher state
    /// machine reacts to by clearing its cursor and re-listing.
    pub fn is_gone(&self) -> bool {
        matches!(self, Error::Gone)
    }
}
