use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The closed set of resource kinds kubelens mirrors.
///
/// New kinds are not meant to be added ad hoc — every kind needs a
/// normalization rule in `kubelens-watcher` and a wire string here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Namespace,
    Deployment,
    StatefulSet,
    Pod,
}

impl ResourceKind {
    /// All kinds, in a stable order used for iterating at startup.
    pub const ALL: [ResourceKind; 4] = [
        ResourceKind::Namespace,
        ResourceKind::Deployment,
        ResourceKind::StatefulSet,
        ResourceKind::Pod,
    ];

    /// Whether resources of this kind are cluster-scoped (no namespace).
    pub fn is_cluster_scoped(self) -> bool {
        matches!(self, ResourceKind::Namespace)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Namespace => "namespace",
            ResourceKind::Deployment => "deployment",
            ResourceKind::StatefulSet => "stateful_set",
            ResourceKind::Pod => "pod",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unrecognized resource kind {0:?}")]
pub struct UnknownKind(pub String);

impl FromStr for ResourceKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "namespace" | "namespaces" => Ok(ResourceKind::Namespace),
            "deployment" | "deployments" => Ok(ResourceKind::Deployment),
            "stateful_set" | "statefulset" | "stateful_sets" | "statefulsets" => {
                Ok(ResourceKind::StatefulSet)
            }
            "pod" | "pods" => Ok(ResourceKind::Pod),
            other => Err(UnknownKind(other.to_string())),
        }
    }
}
