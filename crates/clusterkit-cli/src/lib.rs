//! clusterkit CLI library

pub mod commands;
pub mod config;
pub mod error;

pub use error::{Error, Result};

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use config::ClusterConfig;

/// clusterkit - render and apply cluster resources
#[derive(Parser, Debug)]
#[command(name = "clusterkit")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Cluster configuration file
    #[arg(short, long, global = true, env = "CLUSTERKIT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Kubeconfig for the target cluster
    #[arg(short, long, global = true)]
    pub kubeconfig: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Apply resources to the cluster
    Apply(commands::apply::ApplyArgs),
    /// Render resources to a directory
    Export(commands::export::ExportArgs),
    /// Print one rendered resource
    Render(commands::render::RenderArgs),
    /// List available resources or a platform's defaults
    List(commands::list::ListArgs),
}

/// Shared state for one command invocation
pub struct Context {
    /// Loaded cluster configuration
    pub config: ClusterConfig,
    /// `--kubeconfig` flag, if given
    pub kubeconfig: Option<PathBuf>,
    /// Cancelled on Ctrl-C
    pub cancel: CancellationToken,
}

impl Cli {
    /// Run the CLI command
    pub async fn run(self) -> Result<()> {
        let config = ClusterConfig::load(self.config.as_deref())?;

        let cancel = CancellationToken::new();
        let on_signal = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, stopping after the current attempt");
                on_signal.cancel();
            }
        });

        let ctx = Context {
            config,
            kubeconfig: self.kubeconfig,
            cancel,
        };

        match self.command {
            Commands::Apply(args) => commands::apply::run(args, &ctx).await,
            Commands::Export(args) => commands::export::run(args, &ctx),
            Commands::Render(args) => commands::render::run(args, &ctx).await,
            Commands::List(args) => commands::list::run(args, &ctx),
        }
    }
}
