use thiserror::Error;

/// Errors that can occur while loading or validating the configuration
/// record. Every variant here is a fatal misconfiguration: spec §7
/// classifies these as the one error class that terminates the process.
#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to read configuration file {path}: {source}")]
    Read { path: String, source: std::io::Error },

    #[error("failed to parse configuration YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid namespace pattern {pattern:?}: {source}")]
    InvalidNamespacePattern { pattern: String, source: regex::Error },

    #[error("kube.kubeconfig_path is required when kube.mode is kubeconfig")]
    MissingKubeconfigPath,
}
