//! Resource sets
//!
//! An ordered list of resources to apply together plus the data bag their
//! templates are rendered with. Insertion order is apply order. Each
//! resource is either a registry template or a `file://`/`http(s)://`
//! reference whose content is applied verbatim.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use clusterkit_common::{Error, Result};
use clusterkit_kube::{is_reference, read_reference};
use tracing::{debug, error, warn};

use crate::catalog::DefaultCatalog;
use crate::errors::ApplyErrors;
use crate::registry::ResourceRegistry;
use crate::template::{Renderer, TemplateError};

/// Where a resource's content comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Rendered from the registry template of the same name
    Template,
    /// Read from a file or URL, never rendered
    Reference,
}

/// One named resource in a set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    /// Unique name within the set
    pub name: String,
    /// Content origin
    pub origin: Origin,
}

/// Ordered resources with their rendering data
pub struct ResourceSet {
    registry: Arc<ResourceRegistry>,
    catalog: DefaultCatalog,
    renderer: Renderer,
    resources: Vec<Resource>,
    data: BTreeMap<String, String>,
}

impl ResourceSet {
    /// Empty set backed by `registry` and the built-in catalog
    pub fn new(registry: Arc<ResourceRegistry>) -> Self {
        Self {
            registry,
            catalog: DefaultCatalog::builtin(),
            renderer: Renderer::new(),
            resources: Vec::new(),
            data: BTreeMap::new(),
        }
    }

    /// Add resources in order.
    ///
    /// Every name must be a file/URL reference or a registry template;
    /// otherwise nothing is added. Names already in the set are skipped.
    pub fn add_resources<I, S>(&mut self, names: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut pending = Vec::new();
        for name in names {
            let name = name.as_ref();
            let origin = if is_reference(name) {
                Origin::Reference
            } else if self.registry.contains(name) {
                Origin::Template
            } else {
                return Err(Error::UnknownResource {
                    name: name.to_string(),
                });
            };
            pending.push(Resource {
                name: name.to_string(),
                origin,
            });
        }

        for resource in pending {
            if self.contains(&resource.name) {
                debug!(resource = %resource.name, "resource already in set");
                continue;
            }
            debug!(resource = %resource.name, origin = ?resource.origin, "added resource");
            self.resources.push(resource);
        }
        Ok(())
    }

    /// Add the catalog defaults for `platforms` followed by the default bucket
    pub fn add_default_resources_for(&mut self, platforms: &[&str]) -> Result<()> {
        for platform in platforms {
            if !self.catalog.knows(platform) {
                warn!(platform = %platform, "no default resources for unknown platform");
            }
        }
        let names = self.catalog.defaults_for(platforms);
        self.add_resources(names)
    }

    /// Set one data value; later writes win
    pub fn add_data(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.data.insert(key.into(), value.into());
    }

    /// Merge `data` into the data bag; incoming values win
    pub fn append_data<I, K, V>(&mut self, data: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in data {
            self.add_data(k, v);
        }
    }

    /// Current data bag
    pub fn data(&self) -> &BTreeMap<String, String> {
        &self.data
    }

    /// Resource names in apply order
    pub fn names(&self) -> Vec<&str> {
        self.resources.iter().map(|r| r.name.as_str()).collect()
    }

    /// Resources in apply order
    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    /// Look up a resource by name
    pub fn get(&self, name: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.name == name)
    }

    /// Whether `name` is in the set
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Number of resources
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Render a resource, optionally saving the output to `export`.
    ///
    /// References are never rendered and yield empty content.
    pub fn render(&self, name: &str, export: Option<&Path>) -> Result<String> {
        let resource = self
            .get(name)
            .ok_or_else(|| TemplateError::NotFound(name.to_string()).into_error(name))?;
        match resource.origin {
            Origin::Reference => Ok(String::new()),
            Origin::Template => {
                let template = self
                    .registry
                    .lookup(name)
                    .ok_or_else(|| TemplateError::NotFound(name.to_string()).into_error(name))?;
                self.renderer
                    .render_to(name, template, &self.data, export)
                    .map_err(|e| e.into_error(name))
            }
        }
    }

    /// Desired manifest content for a resource: rendered for templates, read
    /// from disk or fetched for references.
    pub async fn desired_content(&self, name: &str) -> Result<String> {
        match self.get(name).map(|r| r.origin) {
            Some(Origin::Reference) => read_reference(name).await,
            _ => self.render(name, None),
        }
    }

    /// Render every template resource to `<dir>/<name>.yaml`.
    ///
    /// References are skipped. Render failures are collected; write
    /// failures are only logged.
    pub fn export(&self, dir: &Path) -> std::result::Result<(), ApplyErrors> {
        if let Err(e) = std::fs::create_dir_all(dir) {
            error!(dir = %dir.display(), error = %e, "failed to create export directory");
        }

        let mut errors = ApplyErrors::new("export");
        for resource in &self.resources {
            if resource.origin == Origin::Reference {
                debug!(resource = %resource.name, "skipping file reference on export");
                continue;
            }
            let path = dir.join(format!("{}.yaml", resource.name));
            if let Err(e) = self.render(&resource.name, Some(&path)) {
                error!(resource = %resource.name, error = %e, "failed exporting resource");
                errors.add(resource.name.clone(), e);
            }
        }

        if !errors.is_empty() {
            error!("{}", errors);
        }
        errors.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Arc<ResourceRegistry> {
        Arc::new(ResourceRegistry::from_entries([
            ("open-policy-agent", "cluster: {{.clusterName}}\n"),
            ("ebs-blockstore", "provisioner: kubernetes.io/aws-ebs\n"),
            ("needs-data", "value: {{ missing }}\n"),
        ]))
    }

    #[test]
    fn unknown_names_add_nothing() {
        let mut set = ResourceSet::new(registry());
        let err = set
            .add_resources(["open-policy-agent", "unknown-template"])
            .unwrap_err();
        assert!(matches!(err, Error::UnknownResource { ref name } if name == "unknown-template"));
        assert!(set.is_empty());
    }

    #[test]
    fn references_are_accepted_without_registry_entries() {
        let mut set = ResourceSet::new(registry());
        set.add_resources(["file:///tmp/manifest.yaml", "https://example.com/a.yaml"])
            .unwrap();
        assert_eq!(set.get("file:///tmp/manifest.yaml").unwrap().origin, Origin::Reference);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn preserves_insertion_order_and_skips_duplicates() {
        let mut set = ResourceSet::new(registry());
        set.add_resources(["ebs-blockstore", "open-policy-agent", "ebs-blockstore"])
            .unwrap();
        assert_eq!(set.names(), vec!["ebs-blockstore", "open-policy-agent"]);
    }

    #[test]
    fn platform_defaults_come_before_the_default_bucket() {
        let mut set = ResourceSet::new(registry());
        set.add_default_resources_for(&["aws"]).unwrap();
        assert_eq!(set.names(), vec!["ebs-blockstore", "open-policy-agent"]);
    }

    #[test]
    fn later_data_wins() {
        let mut set = ResourceSet::new(registry());
        set.add_data("clusterName", "first");
        set.append_data([("clusterName", "demo01"), ("platform", "aws")]);
        assert_eq!(set.data()["clusterName"], "demo01");
        assert_eq!(set.data()["platform"], "aws");
    }

    #[test]
    fn renders_templates_with_the_data_bag() {
        let mut set = ResourceSet::new(registry());
        set.add_resources(["open-policy-agent"]).unwrap();
        set.add_data("clusterName", "demo01");
        assert_eq!(set.render("open-policy-agent", None).unwrap(), "cluster: demo01\n");
    }

    #[test]
    fn render_without_required_key_is_a_render_error() {
        let mut set = ResourceSet::new(registry());
        set.add_resources(["open-policy-agent"]).unwrap();
        let err = set.render("open-policy-agent", None).unwrap_err();
        assert!(matches!(err, Error::Render { .. }));
    }

    #[test]
    fn references_render_to_empty_content() {
        let mut set = ResourceSet::new(registry());
        set.add_resources(["file:///tmp/manifest.yaml"]).unwrap();
        assert_eq!(set.render("file:///tmp/manifest.yaml", None).unwrap(), "");
    }

    #[test]
    fn rendering_a_name_outside_the_set_fails() {
        let set = ResourceSet::new(registry());
        assert!(set.render("open-policy-agent", None).is_err());
    }

    #[tokio::test]
    async fn desired_content_reads_references_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.yaml");
        std::fs::write(&path, "data:\n  x: '{{ x }}'\n").unwrap();
        let reference = format!("file://{}", path.display());

        let mut set = ResourceSet::new(registry());
        set.add_resources([reference.as_str()]).unwrap();

        let content = set.desired_content(&reference).await.unwrap();
        assert_eq!(content, "data:\n  x: '{{ x }}'\n");
    }

    #[test]
    fn export_writes_templates_and_collects_failures() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("manifests");

        let mut set = ResourceSet::new(registry());
        set.add_resources([
            "open-policy-agent",
            "needs-data",
            "file:///tmp/manifest.yaml",
        ])
        .unwrap();
        set.add_data("clusterName", "demo01");

        let errors = set.export(&out).unwrap_err();
        assert_eq!(errors.resources().collect::<Vec<_>>(), vec!["needs-data"]);
        assert_eq!(
            std::fs::read_to_string(out.join("open-policy-agent.yaml")).unwrap(),
            "cluster: demo01\n"
        );
        assert!(!out.join("needs-data.yaml").exists());
        assert_eq!(std::fs::read_dir(&out).unwrap().count(), 1);
    }
}
