use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::ResourceIdentity;
use crate::kind::ResourceKind;
use crate::status::{NamespacePhase, PodStatus, WorkloadStatus};

/// Fields shared by every normalized record, regardless of kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommonFields {
    pub name: String,
    /// Empty for cluster-scoped kinds.
    pub namespace: String,
    pub labels: BTreeMap<String, String>,
    /// Opaque server-issued resource version.
    pub resource_version: String,
    pub creation_time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Replicas {
    pub desired: Option<i32>,
    pub ready: i32,
    pub available: i32,
    pub updated: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MainContainer {
    pub name: String,
    pub image: String,
    pub image_tag: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Container {
    pub name: String,
    pub image: String,
    pub image_tag: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnerReference {
    pub name: String,
    pub kind: String,
    pub uid: String,
}

/// An immutable, kind-discriminated normalized resource record.
///
/// Produced only by the watcher (`kubelens-watcher`) from a raw API
/// object; the store and sessions only ever hold or clone these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NormalizedRecord {
    Namespace {
        #[serde(flatten)]
        common: CommonFields,
        phase: NamespacePhase,
    },
    Deployment {
        #[serde(flatten)]
        common: CommonFields,
        replicas: Replicas,
        main_container: Option<MainContainer>,
        owner_references: Vec<OwnerReference>,
        status: WorkloadStatus,
    },
    StatefulSet {
        #[serde(flatten)]
        common: CommonFields,
        replicas: Replicas,
        main_container: Option<MainContainer>,
        owner_references: Vec<OwnerReference>,
        status: WorkloadStatus,
    },
    Pod {
        #[serde(flatten)]
        common: CommonFields,
        phase: String,
        containers: Vec<Container>,
        pod_ip: Option<String>,
        host_ip: Option<String>,
        started_at: Option<DateTime<Utc>>,
        owner_references: Vec<OwnerReference>,
        status: PodStatus,
    },
}

impl NormalizedRecord {
    pub fn kind(&self) -> ResourceKind {
        match self {
            NormalizedRecord::Namespace { .. } => ResourceKind::Namespace,
            NormalizedRecord::Deployment { .. } => ResourceKind::Deployment,
            NormalizedRecord::StatefulSet { .. } => ResourceKind::StatefulSet,
            NormalizedRecord::Pod { .. } => ResourceKind::Pod,
        }
    }

    pub fn common(&self) -> &CommonFields {
        match self {
            NormalizedRecord::Namespace { common, .. }
            | NormalizedRecord::Deployment { common, .. }
            | NormalizedRecord::StatefulSet { common, .. }
            | NormalizedRecord::Pod { common, .. } => common,
        }
    }

    pub fn identity(&self) -> ResourceIdentity {
        let common = self.common();
        ResourceIdentity::new(self.kind(), common.namespace.clone(), common.name.clone())
    }

    pub fn namespace(&self) -> &str {
        &self.common().namespace
    }

    pub fn resource_version(&self) -> &str {
        &self.common().resource_version
    }
}
