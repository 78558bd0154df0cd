//! List command - show available resources or a platform's defaults

use clap::Args;
use clusterkit_resources::{DefaultCatalog, ResourceRegistry};

use crate::{Context, Error, Result};

/// List available resources or a platform's defaults
#[derive(Args, Debug)]
pub struct ListArgs {
    /// Show the default resources for this platform, in apply order
    #[arg(short, long)]
    pub platform: Option<String>,
}

pub fn run(args: ListArgs, ctx: &Context) -> Result<()> {
    let registry = ctx.config.registry()?;
    for name in listing(&registry, &DefaultCatalog::builtin(), args.platform.as_deref())? {
        println!("{}", name);
    }
    Ok(())
}

fn listing(
    registry: &ResourceRegistry,
    catalog: &DefaultCatalog,
    platform: Option<&str>,
) -> Result<Vec<String>> {
    let Some(platform) = platform else {
        return Ok(registry.names().map(str::to_string).collect());
    };
    if !catalog.knows(platform) {
        let known: Vec<&str> = catalog.platforms().collect();
        return Err(Error::validation(format!(
            "unknown platform {:?}, expected one of: {}",
            platform,
            known.join(", ")
        )));
    }

    let mut names: Vec<String> = Vec::new();
    for name in catalog.defaults_for(&[platform]) {
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_registry_names_sorted() {
        let registry = ResourceRegistry::from_entries([("b", ""), ("a", "")]);
        let names = listing(&registry, &DefaultCatalog::builtin(), None).unwrap();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn lists_platform_defaults_in_apply_order() {
        let registry = ResourceRegistry::default();
        let names = listing(&registry, &DefaultCatalog::builtin(), Some("vsphere")).unwrap();
        assert_eq!(names, vec!["vsphere-volumes", "open-policy-agent"]);
    }

    #[test]
    fn unknown_platform_lists_the_known_ones() {
        let registry = ResourceRegistry::default();
        let err = listing(&registry, &DefaultCatalog::builtin(), Some("mainframe")).unwrap_err();
        let text = err.to_string();
        assert!(text.contains("\"mainframe\""));
        assert!(text.contains("eks"));
    }
}
