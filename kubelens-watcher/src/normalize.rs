//! Turns a raw API object into a `NormalizedRecord` (spec.md §4.1
//! "Normalization rules"). The only place in the crate that reaches
//! into `DynamicObject::data`'s untyped JSON.

use chrono::{DateTime, Utc};
use kube::core::ObjectMeta;

use kubelens_core::{
    image_tag, pod_status, workload_status, CommonFields, Container, MainContainer, NamespacePhase,
    NormalizedRecord, OwnerReference, Replicas, ResourceKind,
};
use kubelens_kube::RawObject;

pub fn normalize(kind: ResourceKind, raw: &RawObject) -> NormalizedRecord {
    let common = common_fields(&raw.metadata);
    match kind {
        ResourceKind::Namespace => normalize_namespace(common, &raw.data),
        ResourceKind::Deployment => normalize_deployment(common, raw),
        ResourceKind::StatefulSet => normalize_statefulset(common, raw),
        ResourceKind::Pod => normalize_pod(common, raw),
    }
}

fn common_fields(meta: &ObjectMeta) -> CommonFields {
    CommonFields {
        name: meta.name.clone().unwrap_or_default(),
        namespace: meta.namespace.clone().unwrap_or_default(),
        labels: meta.labels.clone().unwrap_or_default().into_iter().collect(),
        resource_version: meta.resource_version.clone().unwrap_or_default(),
        creation_time: meta.creation_timestamp.clone().map(|t| t.0).unwrap_or_else(Utc::now),
    }
}

fn owner_references(meta: &ObjectMeta) -> Vec<OwnerReference> {
    meta.owner_references
        .clone()
        .unwrap_or_default()
        .into_iter()
        .map(|o| OwnerReference { name: o.name, kind: o.kind, uid: o.uid })
        .collect()
}

fn normalize_namespace(common: CommonFields, data: &serde_json::Value) -> NormalizedRecord {
    let phase = data.pointer("/status/phase").and_then(|v| v.as_str()).unwrap_or("Unknown");
    let phase = match phase {
        "Active" => NamespacePhase::Active,
        "Terminating" => NamespacePhase::Terminating,
        _ => NamespacePhase::Unknown,
    };
    NormalizedRecord::Namespace { common, phase }
}

/// Desired/ready/available/updated replica counts and the main
/// container, extracted identically for deployments and stateful sets
/// (spec.md §4.1: "Stateful-set status uses the identical rule").
struct WorkloadParts {
    replicas: Replicas,
    main_container: Option<MainContainer>,
}

fn workload_parts(data: &serde_json::Value) -> WorkloadParts {
    let desired = data.pointer("/spec/replicas").and_then(|v| v.as_i64()).map(|v| v as i32);
    let ready = data.pointer("/status/readyReplicas").and_then(|v| v.as_i64()).unwrap_or(0) as i32;
    let available = data.pointer("/status/availableReplicas").and_then(|v| v.as_i64()).unwrap_or(0) as i32;
    let updated = data.pointer("/status/updatedReplicas").and_then(|v| v.as_i64()).unwrap_or(0) as i32;
    let main_container = data.pointer("/spec/template/spec/containers/0").and_then(|container| {
        let name = container.get("name")?.as_str()?.to_string();
        let image = container.get("image")?.as_str()?.to_string();
        Some(MainContainer { image_tag: image_tag(&image), name, image })
    });
    WorkloadParts { replicas: Replicas { desired, ready, available, updated }, main_container }
}

fn normalize_deployment(common: CommonFields, raw: &RawObject) -> NormalizedRecord {
    let owner_references = owner_references(&raw.metadata);
    let parts = workload_parts(&raw.data);
    let status = workload_status(parts.replicas.desired, parts.replicas.ready);
    NormalizedRecord::Deployment {
        common,
        replicas: parts.replicas,
        main_container: parts.main_container,
        owner_references,
        status,
    }
}

fn normalize_statefulset(common: CommonFields, raw: &RawObject) -> NormalizedRecord {
    let owner_references = owner_references(&raw.metadata);
    let parts = workload_parts(&raw.data);
    let status = workload_status(parts.replicas.desired, parts.replicas.ready);
    NormalizedRecord::StatefulSet {
        common,
        replicas: parts.replicas,
        main_container: parts.main_container,
        owner_references,
        status,
    }
}

fn normalize_pod(common: CommonFields, raw: &RawObject) -> NormalizedRecord {
    let owner_references = owner_references(&raw.metadata);
    let data = &raw.data;

    // Pods don't carry a real "Terminating" phase; it's synthesized
    // from `deletionTimestamp` the way the rest of the ecosystem does
    // (kubelens_core::pod_status documents the convention).
    let phase = if raw.metadata.deletion_timestamp.is_some() {
        "Terminating".to_string()
    } else {
        data.pointer("/status/phase").and_then(|v| v.as_str()).unwrap_or("Unknown").to_string()
    };
    let status = pod_status(&phase);

    let containers = data
        .pointer("/status/containerStatuses")
        .and_then(|v| v.as_array())
        .or_else(|| data.pointer("/spec/containers").and_then(|v| v.as_array()))
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| {
                    let name = entry.get("name")?.as_str()?.to_string();
                    let image = entry.get("image")?.as_str()?.to_string();
                    Some(Container { image_tag: image_tag(&image), name, image })
                })
                .collect()
        })
        .unwrap_or_default();

    let pod_ip = data.pointer("/status/podIP").and_then(|v| v.as_str()).map(str::to_string);
    let host_ip = data.pointer("/status/hostIP").and_then(|v| v.as_str()).map(str::to_string);
    let started_at = data
        .pointer("/status/startTime")
        .and_then(|v| v.as_str())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc));

    NormalizedRecord::Pod { common, phase, containers, pod_ip, host_ip, started_at, owner_references, status }
}
