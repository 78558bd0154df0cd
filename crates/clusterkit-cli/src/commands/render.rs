//! Render command - print one resource as it would be applied

use std::path::PathBuf;

use clap::Args;

use crate::{Context, Result};

/// Print one rendered resource
#[derive(Args, Debug)]
pub struct RenderArgs {
    /// Resource name or file:// / http(s):// reference
    pub name: String,

    /// Write to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub async fn run(args: RenderArgs, ctx: &Context) -> Result<()> {
    let content = desired_content(&args.name, ctx).await?;
    match args.output {
        Some(path) => std::fs::write(&path, content)?,
        None => print!("{}", content),
    }
    Ok(())
}

async fn desired_content(name: &str, ctx: &Context) -> Result<String> {
    let config = &ctx.config;
    let set = config.resource_set(config.registry()?, &[name.to_string()])?;
    Ok(set.desired_content(name).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClusterConfig;
    use tokio_util::sync::CancellationToken;

    fn context(name: &str) -> Context {
        Context {
            config: ClusterConfig {
                name: name.to_string(),
                platform: "eks".to_string(),
                ..ClusterConfig::default()
            },
            kubeconfig: None,
            cancel: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn renders_embedded_templates_with_config_data() {
        let content = desired_content("open-policy-agent", &context("demo01"))
            .await
            .unwrap();
        assert!(content.contains("cluster: \"demo01\""));
        assert!(content.contains("platform: \"eks\""));
    }

    #[tokio::test]
    async fn unknown_names_are_rejected() {
        let err = desired_content("unknown-template", &context("demo01"))
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("unknown resource template"));
    }

    #[tokio::test]
    async fn writes_to_the_output_file() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("ebs.yaml");
        run(
            RenderArgs {
                name: "ebs-blockstore".to_string(),
                output: Some(output.clone()),
            },
            &context("demo01"),
        )
        .await
        .unwrap();
        let written = std::fs::read_to_string(output).unwrap();
        assert!(written.contains("provisioner: ebs.csi.aws.com"));
    }
}
