//! The deprecated HTTP snapshot surface (spec.md §6 "HTTP surface (out
//! of core)") plus the WebSocket upgrade endpoint. The snapshot routes
//! read exclusively from the `Store`, never the Kubernetes API, and log
//! a warning on every use per the supplemented feature in SPEC_FULL.md.

use std::str::FromStr;
use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;

use kubelens_core::ResourceKind;
use kubelens_ws::SessionManager;

use crate::state::AppState;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("unrecognized resource kind {0:?}")]
    UnknownKind(String),
    #[error("namespace {0:?} is not observable under the configured patterns")]
    NamespaceFiltered(String),
    #[error("metrics unavailable: {0}")]
    MetricsUnavailable(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::UnknownKind(_) | ApiError::NamespaceFiltered(_) => StatusCode::BAD_REQUEST,
            ApiError::MetricsUnavailable(_) => StatusCode::BAD_GATEWAY,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub fn router(state: AppState, sessions: Arc<SessionManager>) -> Router {
    Router::new()
        .route("/api/k8s/ws", get(ws_upgrade))
        .route("/api/k8s/:kind", get(list_kind))
        .route("/api/k8s/:kind/:namespace", get(list_kind_namespaced))
        .route("/api/k8s/pods/:namespace/:name/metrics", get(pod_metrics))
        .with_state((state, sessions))
}

async fn ws_upgrade(
    State((_, sessions)): State<(AppState, Arc<SessionManager>)>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| async move {
        sessions.accept(socket, headers);
    })
}

#[derive(Serialize)]
struct SnapshotResponse {
    #[serde(rename = "resourceType")]
    resource_type: String,
    namespace: String,
    items: Vec<kubelens_core::NormalizedRecord>,
}

async fn list_kind(
    State((state, _)): State<(AppState, Arc<SessionManager>)>,
    Path(kind): Path<String>,
) -> Result<Json<SnapshotResponse>, ApiError> {
    let kind = parse_kind(&kind)?;
    tracing::warn!(resource_type = %kind, route = "/api/k8s/:kind", "deprecated HTTP snapshot read, may lag the live stream");
    let items = state.store.snapshot(kind, None);
    Ok(Json(SnapshotResponse { resource_type: kind.to_string(), namespace: "all".to_string(), items }))
}

async fn list_kind_namespaced(
    State((state, _)): State<(AppState, Arc<SessionManager>)>,
    Path((kind, namespace)): Path<(String, String)>,
) -> Result<Json<SnapshotResponse>, ApiError> {
    let kind = parse_kind(&kind)?;
    if !state.namespace_filter.matches(&namespace) {
        return Err(ApiError::NamespaceFiltered(namespace));
    }
    tracing::warn!(resource_type = %kind, %namespace, route = "/api/k8s/:kind/:namespace", "deprecated HTTP snapshot read, may lag the live stream");
    let items = state.store.snapshot(kind, Some(&namespace));
    Ok(Json(SnapshotResponse { resource_type: kind.to_string(), namespace, items }))
}

async fn pod_metrics(
    State((state, _)): State<(AppState, Arc<SessionManager>)>,
    Path((namespace, name)): Path<(String, String)>,
) -> Result<Json<kubelens_kube::PodMetrics>, ApiError> {
    tracing::warn!(%namespace, pod = %name, route = "/api/k8s/pods/:namespace/:name/metrics", "on-demand metrics read outside the watch stream");
    let key = format!("pod_metrics:{namespace}/{name}");
    let facade = state.facade.clone();
    let namespace_owned = namespace.clone();
    let name_owned = name.clone();
    let metrics = state
        .metrics_cache
        .get_or_compute(&key, state.pod_metrics_ttl, move || async move {
            match facade.read_metrics(&namespace_owned, &name_owned).await {
                Ok(metrics) => Some(Arc::new(metrics)),
                Err(error) => {
                    tracing::warn!(%error, "metrics read failed");
                    None
                }
            }
        })
        .await;
    match metrics {
        Some(metrics) => Ok(Json((*metrics).clone())),
        None => Err(ApiError::MetricsUnavailable(format!("no metrics for {namespace}/{name}"))),
    }
}

fn parse_kind(raw: &str) -> Result<ResourceKind, ApiError> {
    ResourceKind::from_str(raw).map_err(|_| ApiError::UnknownKind(raw.to_string()))
}
