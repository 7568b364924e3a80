use std::path::PathBuf;

use clap::Parser;

/// Command-line flags. Both can also be supplied via the environment
/// variables named in spec.md §6 (`CONFIG_PATH`, `LOG_LEVEL`); the flag
/// wins when both are present.
#[derive(Debug, Parser)]
#[command(name = "kubelensd", version, about = "Live-view gateway between a Kubernetes API server and a browser dashboard")]
pub struct Args {
    /// Path to the YAML configuration record. Defaults to `CONFIG_PATH`.
    #[arg(long, env = "CONFIG_PATH")]
    pub config: PathBuf,

    /// Log filter directive passed to `tracing_subscriber::EnvFilter`.
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}
