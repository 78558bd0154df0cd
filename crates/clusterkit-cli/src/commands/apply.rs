//! Apply command - reconcile resources against the cluster
//!
//! Usage: clusterkit apply [NAMES...]
//!
//! With no names, applies the configured resources or the platform
//! defaults. Every resource is attempted; the command fails if any of them
//! did not converge.

use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use clusterkit_kube::KubeClusterClient;
use clusterkit_resources::Applier;
use tracing::info;

use crate::{Context, Result};

/// Apply resources to the cluster
#[derive(Args, Debug)]
pub struct ApplyArgs {
    /// Resource names or file:// / http(s):// references
    pub names: Vec<String>,

    /// Attempts per resource (overrides the config file)
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Seconds between attempts (overrides the config file)
    #[arg(long)]
    pub delay_secs: Option<u64>,
}

pub async fn run(args: ApplyArgs, ctx: &Context) -> Result<()> {
    let config = &ctx.config;
    let set = config.resource_set(config.registry()?, &args.names)?;

    let mut policy = config.retry.policy();
    if let Some(attempts) = args.max_attempts {
        policy.max_attempts = attempts.max(1);
    }
    if let Some(secs) = args.delay_secs {
        policy.delay = Duration::from_secs(secs);
    }

    let kubeconfig = config.resolve_kubeconfig(ctx.kubeconfig.as_deref());
    let client = KubeClusterClient::connect(kubeconfig.as_deref())
        .await?
        .with_cancellation(ctx.cancel.clone());

    info!(
        cluster = %config.name,
        platform = %config.platform,
        resources = set.len(),
        "applying resources"
    );
    let total = set.len();
    let applier = Applier::new(set, Arc::new(client))
        .with_policy(policy)
        .with_cancellation(ctx.cancel.clone());
    applier.apply_all().await?;

    info!(resources = total, "all resources applied");
    Ok(())
}
