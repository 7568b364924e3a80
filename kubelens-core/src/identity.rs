use std::fmt;

use serde::{Deserialize, Serialize};

use crate::kind::ResourceKind;

/// Stable identity of a resource: `(kind, namespace, name)`.
///
/// The server-assigned UID is deliberately not part of this type — the
/// store keys on identity, not UID, so a delete-then-recreate with the
/// same name collapses onto the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceIdentity {
    pub kind: ResourceKind,
    /// Empty for cluster-scoped kinds.
    pub namespace: String,
    pub name: String,
}

impl ResourceIdentity {
    pub fn new(kind: ResourceKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        let namespace = if kind.is_cluster_scoped() { String::new() } else { namespace.into() };
        Self { kind, namespace, name: name.into() }
    }
}

impl fmt::Display for ResourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}/{}", self.kind, self.name)
        } else {
            write!(f, "{}/{}/{}", self.kind, self.namespace, self.name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cluster_scoped_identity_drops_namespace() {
        let id = ResourceIdentity::new(ResourceKind::Namespace, "ignored", "prod");
        assert_eq!(id.namespace, "");
    }

    #[test]
    fn namespaced_identity_keeps_namespace() {
        let id = ResourceIdentity::new(ResourceKind::Pod, "apps", "web-0");
        assert_eq!(id.namespace, "apps");
        assert_eq!(id.to_string(), "pod/apps/web-0");
    }
}
