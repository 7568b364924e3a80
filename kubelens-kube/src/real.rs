use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use kube::api::{Api, ListParams};
use kube::core::{ErrorResponse, WatchEvent};
use kube::{Client, Config};
use kubelens_config::KubeMode;
use kubelens_core::ResourceKind;

use crate::error::Error;
use crate::facade::{KubeFacade, PodMetrics};
use crate::raw::{api_resource_for, ListOptions, ListResult, RawEvent, RawObject, WatchOptions};

/// `KubeFacade` backed by a real `kube::Client`, built according to
/// `kube.mode` (spec.md §6): `in_cluster` infers pod-service-account
/// config, `kubeconfig` reads `kube.kubeconfig_path`.
pub struct RealFacade {
    client: Client,
}

impl RealFacade {
    pub async fn build(mode: KubeMode, kubeconfig_path: Option<&str>) -> Result<Self, Error> {
        let config = match mode {
            KubeMode::InCluster => {
                Config::from_cluster_env().map_err(|e| Error::ClientBuild(Box::new(e)))?
            }
            KubeMode::Kubeconfig => {
                let path = kubeconfig_path.ok_or(Error::UnsupportedMode)?;
                let kubeconfig = kube::config::Kubeconfig::read_from(path)
                    .map_err(|e| Error::ClientBuild(Box::new(e)))?;
                Config::from_custom_kubeconfig(kubeconfig, &kube::config::KubeConfigOptions::default())
                    .await
                    .map_err(|e| Error::ClientBuild(Box::new(e)))?
            }
            KubeMode::Mock => return Err(Error::UnsupportedMode),
        };
        let client = Client::try_from(config).map_err(|e| Error::ClientBuild(Box::new(e)))?;
        Ok(Self { client })
    }

    fn api(&self, kind: ResourceKind, namespace: Option<&str>) -> Api<RawObject> {
        let resource = api_resource_for(kind);
        match namespace {
            Some(ns) if !ns.is_empty() => Api::namespaced_with(self.client.clone(), ns, &resource),
            _ => Api::all_with(self.client.clone(), &resource),
        }
    }

    fn list_params(label_selector: &Option<String>, field_selector: &Option<String>) -> ListParams {
        let mut lp = ListParams::default();
        if let Some(selector) = label_selector {
            lp = lp.labels(selector);
        }
        if let Some(selector) = field_selector {
            lp = lp.fields(selector);
        }
        lp
    }
}

#[async_trait]
impl KubeFacade for RealFacade {
    async fn list(&self, kind: ResourceKind, options: &ListOptions) -> Result<ListResult, Error> {
        let lp = Self::list_params(&options.label_selector, &options.field_selector);
        let list = self.api(kind, None).list(&lp).await.map_err(Error::List)?;
        let resource_version = list.metadata.resource_version.clone().unwrap_or_default();
        Ok(ListResult { items: list.items, resource_version })
    }

    fn watch(&self, kind: ResourceKind, options: WatchOptions) -> BoxStream<'static, Result<RawEvent, Error>> {
        let api = self.api(kind, None);
        let mut lp = Self::list_params(&options.label_selector, &options.field_selector);
        lp = lp.timeout(options.timeout_seconds);
        let resource_version = options.resource_version;

        async_stream::stream! {
            let stream = match api.watch(&lp, &resource_version).await {
                Ok(stream) => stream,
                Err(source) => {
                    yield Err(Error::WatchStart(source));
                    return;
                }
            };
            futures::pin_mut!(stream);
            while let Some(next) = stream.next().await {
                match next {
                    Ok(WatchEvent::Added(obj)) => yield Ok(RawEvent::Added(obj)),
                    Ok(WatchEvent::Modified(obj)) => yield Ok(RawEvent::Modified(obj)),
                    Ok(WatchEvent::Deleted(obj)) => yield Ok(RawEvent::Deleted(obj)),
                    Ok(WatchEvent::Bookmark(bookmark)) => {
                        yield Ok(RawEvent::Bookmark { resource_version: bookmark.metadata.resource_version });
                    }
                    Ok(WatchEvent::Error(ErrorResponse { code: 410, .. })) => {
                        yield Err(Error::Gone);
                        return;
                    }
                    Ok(WatchEvent::Error(err)) => {
                        yield Err(Error::WatchStream(kube::Error::Api(err)));
                    }
                    Err(source) => yield Err(Error::WatchStream(source)),
                }
            }
        }
        .boxed()
    }

    async fn read_metrics(&self, namespace: &str, pod: &str) -> Result<PodMetrics, Error> {
        let path = format!(
            "/apis/metrics.k8s.io/v1beta1/namespaces/{namespace}/pods/{pod}"
        );
        let request = http::Request::get(path)
            .body(Vec::new())
            .map_err(|e| Error::Metrics(kube::Error::HttpError(e)))?;
        let response: serde_json::Value =
            self.client.request(request).await.map_err(Error::Metrics)?;
        parse_pod_metrics(&response).ok_or_else(|| {
            Error::Metrics(kube::Error::Api(ErrorResponse {
                status: "Failure".into(),
                message: "malformed PodMetrics response".into(),
                reason: "Malformed".into(),
                code: 502,
            }))
        })
    }
}

fn parse_pod_metrics(value: &serde_json::Value) -> Option<PodMetrics> {
    let containers = value.get("containers")?.as_array()?;
    let mut cpu_millicores = 0u64;
    let mut memory_bytes = 0u64;
    for container in containers {
        let usage = container.get("usage")?;
        cpu_millicores += parse_cpu_quantity(usage.get("cpu")?.as_str()?);
        memory_bytes += parse_memory_quantity(usage.get("memory")?.as_str()?);
    }
    Some(PodMetrics { cpu_millicores, memory_bytes })
}

fn parse_cpu_quantity(raw: &str) -> u64 {
    if let Some(millis) = raw.strip_suffix('n') {
        return millis.parse::<u64>().unwrap_or(0) / 1_000_000;
    }
    if let Some(millis) = raw.strip_suffix('m') {
        return millis.parse().unwrap_or(0);
    }
    raw.parse::<f64>().map(|cores| (cores * 1000.0) as u64).unwrap_or(0)
}

fn parse_memory_quantity(raw: &str) -> u64 {
    const UNITS: &[(&str, u64)] =
        &[("Ki", 1024), ("Mi", 1024u64.pow(2)), ("Gi", 1024u64.pow(3)), ("Ti", 1024u64.pow(4))];
    for (suffix, multiplier) in UNITS {
        if let Some(stripped) = raw.strip_suffix(suffix) {
            return stripped.parse::<u64>().map(|n| n * multiplier).unwrap_or(0);
        }
    }
    raw.parse().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_cpu_in_nanocores() {
        assert_eq!(parse_cpu_quantity("250000000n"), 250);
    }

    #[test]
    fn parses_cpu_in_millicores() {
        assert_eq!(parse_cpu_quantity("500m"), 500);
    }

    #[test]
    fn parses_memory_in_kibibytes() {
        assert_eq!(parse_memory_quantity("1024Ki"), 1024 * 1024);
    }

    #[test]
    fn parses_pod_metrics_response() {
        let value = serde_json::json!({
            "containers": [
                {"usage": {"cpu": "100m", "memory": "64Mi"}},
                {"usage": {"cpu": "50m", "memory": "32Mi"}}
            ]
        });
        let metrics = parse_pod_metrics(&value).unwrap();
        assert_eq!(metrics.cpu_millicores, 150);
        assert_eq!(metrics.memory_bytes, 96 * 1024 * 1024);
    }
}
