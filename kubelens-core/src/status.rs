use serde::{Deserialize, Serialize};

/// Derived health of a `Deployment` or `StatefulSet`.
///
/// Always a pure function of the normalized record's replica counts —
/// never stored independently of them (invariant 3, spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkloadStatus {
    Healthy,
    Progressing,
    ScaledZero,
    Error,
}

/// Derive workload status per spec §4.1:
/// `desired == 0` -> scaled_zero; `desired` undefined -> error;
/// `ready == desired` -> healthy; otherwise progressing.
///
/// Stateful sets use the identical rule with `ready` standing in for
/// `available`, so both kinds call this one function.
pub fn workload_status(desired: Option<i32>, ready: i32) -> WorkloadStatus {
    match desired {
        None => WorkloadStatus::Error,
        Some(0) => WorkloadStatus::ScaledZero,
        Some(desired) if ready == desired => WorkloadStatus::Healthy,
        Some(_) => WorkloadStatus::Progressing,
    }
}

/// Derived pod status, distinct from the raw Kubernetes phase string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PodStatus {
    Running,
    Succeeded,
    Pending,
    Failed,
    Terminating,
    Error,
}

/// Raw Kubernetes pod phase, as returned by the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum PodPhase {
    Running,
    Succeeded,
    Pending,
    Failed,
    Unknown,
}

/// Lower-case the phase and map it to a `PodStatus`, per spec §4.1.
/// `terminating` wins whenever the lower-cased phase contains the
/// substring "terminating" (pods don't have a real Terminating phase;
/// it's synthesized by callers from `deletionTimestamp`).
pub fn pod_status(raw_phase: &str) -> PodStatus {
    let lowered = raw_phase.to_ascii_lowercase();
    if lowered.contains("terminating") {
        return PodStatus::Terminating;
    }
    match lowered.as_str() {
        "running" => PodStatus::Running,
        "succeeded" => PodStatus::Succeeded,
        "pending" => PodStatus::Pending,
        "failed" => PodStatus::Failed,
        _ => PodStatus::Error,
    }
}

/// Namespace lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum NamespacePhase {
    Active,
    Terminating,
    Unknown,
}

/// `image_tag` = suffix after the last colon in `image`, or `latest` if
/// none (spec.md §4.1).
pub fn image_tag(image: &str) -> String {
    match image.rsplit_once(':') {
        Some((_, tag)) => tag.to_string(),
        None => "latest".to_string(),
    }
}
