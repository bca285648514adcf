use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "drover",
    version,
    about = "An interactive terminal dashboard for Nomad clusters."
)]
pub struct CliArgs {
    #[command(flatten)]
    pub session: SessionArgs,

    /// tracing filter (for example: info,debug,trace)
    #[arg(long, global = true, default_value = "info")]
    pub log_filter: String,

    /// Write logs to this file instead of discarding them in terminal mode
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

/// Cluster connection settings. Unset values fall back to the environment and
/// then to the config file.
#[derive(Debug, Clone, Default, Args)]
pub struct SessionArgs {
    /// Nomad API address, e.g. http://localhost:4646
    #[arg(long, global = true)]
    pub addr: Option<String>,

    /// Nomad ACL token (36 characters)
    #[arg(long, global = true)]
    pub token: Option<String>,

    /// Comma-separated event stream topics
    #[arg(long, global = true)]
    pub event_topics: Option<String>,

    /// Namespace for the event stream
    #[arg(long, global = true)]
    pub event_namespace: Option<String>,

    /// Refresh interval in seconds
    #[arg(long, global = true)]
    pub update: Option<String>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum CliCommand {
    /// Serve the dashboard to SSH clients
    Serve(ServeArgs),
}

#[derive(Debug, Clone, Default, Args)]
pub struct ServeArgs {
    /// Address to listen on
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(long)]
    pub port: Option<String>,

    /// Path to the server's private host key
    #[arg(long)]
    pub host_key_path: Option<PathBuf>,
}
