//! Export command - render resources to `<dir>/<name>.yaml`

use std::path::PathBuf;

use clap::Args;
use tracing::info;

use crate::{Context, Result};

/// Render resources to a directory
#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Output directory (defaults to `export_dir` from the config file)
    #[arg(short, long)]
    pub dir: Option<PathBuf>,

    /// Resource names; file references are skipped
    pub names: Vec<String>,
}

pub fn run(args: ExportArgs, ctx: &Context) -> Result<()> {
    let config = &ctx.config;
    let set = config.resource_set(config.registry()?, &args.names)?;
    let dir = args.dir.unwrap_or_else(|| config.export_dir.clone());

    set.export(&dir)?;
    info!(dir = %dir.display(), resources = set.len(), "exported resources");
    Ok(())
}
