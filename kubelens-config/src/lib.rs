//! Configuration record and loader for kubelens.
//!
//! A single YAML record, read from the path in `CONFIG_PATH`, with
//! `ENV:NAME[:default]` substitution applied to every string value
//! before deserialization (spec.md §6, S5). Namespace patterns are
//! compiled once here and reused by both the Store's ingest filter and
//! the deprecated HTTP list endpoints.

mod env_subst;
mod error;
mod filter;

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

pub use error::Error;
pub use filter::NamespaceFilter;

/// How the Kubernetes API facade is constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KubeMode {
    InCluster,
    Kubeconfig,
    Mock,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KubeConfig {
    pub mode: KubeMode,
    #[serde(default)]
    pub kubeconfig_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct DefaultConfig {
    #[serde(default)]
    pub namespace_patterns: Vec<String>,
}

fn default_cache_ttl() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_ttl", rename = "default_ttl")]
    pub default_ttl_seconds: u64,
    /// Per-key overrides, written in the record as `cache.ttl.<key>`.
    #[serde(default)]
    pub ttl: HashMap<String, u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { default_ttl_seconds: default_cache_ttl(), ttl: HashMap::new() }
    }
}

fn default_ping_interval() -> u64 {
    20
}
fn default_max_sessions() -> usize {
    100
}
fn default_queue_size() -> usize {
    256
}

#[derive(Debug, Clone, Deserialize)]
pub struct WsConfig {
    #[serde(default = "default_ping_interval", rename = "ping_interval_seconds")]
    pub ping_interval_seconds: u64,
    #[serde(default = "default_max_sessions", rename = "max_concurrent_sessions")]
    pub max_concurrent_sessions: usize,
    #[serde(default = "default_queue_size", rename = "outgoing_queue_size")]
    pub outgoing_queue_size: usize,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            ping_interval_seconds: default_ping_interval(),
            max_concurrent_sessions: default_max_sessions(),
            outgoing_queue_size: default_queue_size(),
        }
    }
}

fn default_list_timeout() -> u64 {
    300
}
fn default_retry_initial() -> u64 {
    1
}
fn default_retry_max() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_retry_initial", rename = "initial_seconds")]
    pub initial_seconds: u64,
    #[serde(default = "default_retry_max", rename = "max_seconds")]
    pub max_seconds: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { initial_seconds: default_retry_initial(), max_seconds: default_retry_max() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WatchConfig {
    #[serde(default = "default_list_timeout", rename = "list_timeout_seconds")]
    pub list_timeout_seconds: u64,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { list_timeout_seconds: default_list_timeout(), retry: RetryConfig::default() }
    }
}

/// The configuration record loaded at startup (spec.md §6).
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub listen_address: String,
    pub kube: KubeConfig,
    #[serde(default)]
    pub default: DefaultConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub ws: WsConfig,
    #[serde(default)]
    pub watch: WatchConfig,
}

impl Config {
    /// Parse a configuration record from its YAML text, substituting
    /// `ENV:NAME[:default]` markers from the process environment first.
    pub fn from_yaml_str(text: &str) -> Result<Self, Error> {
        let mut value: serde_yaml::Value = serde_yaml::from_str(text)?;
        env_subst::substitute(&mut value, &std::env::var);
        let config: Config = serde_yaml::from_value(value)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the configuration record from a file on disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        tracing::debug!(path = %path.display(), "loading configuration");
        let text = std::fs::read_to_string(path)
            .map_err(|source| Error::Read { path: path.display().to_string(), source })?;
        Self::from_yaml_str(&text)
    }

    /// Compile `default.namespace_patterns` into a reusable filter.
    pub fn namespace_filter(&self) -> Result<NamespaceFilter, Error> {
        NamespaceFilter::compile(&self.default.namespace_patterns)
    }

    /// Resolve the TTL for a cache key: the per-key override if present,
    /// otherwise `cache.default_ttl`.
    pub fn cache_ttl_seconds(&self, key: &str) -> u64 {
        self.cache.ttl.get(key).copied().unwrap_or(self.cache.default_ttl_seconds)
    }

    fn validate(&self) -> Result<(), Error> {
        if self.kube.mode == KubeMode::Kubeconfig && self.kube.kubeconfig_path.is_none() {
            return Err(Error::MissingKubeconfigPath);
        }
        self.namespace_filter()?;
        Ok(())
    }
}
