//! Resource registry: resource name to template text.
//!
//! Built once at start-up (from the templates embedded at build time, or from
//! a directory) and read-only afterwards. Share it with `Arc`.

use std::collections::BTreeMap;
use std::path::Path;

use clusterkit_common::{Error, Result};
use tracing::debug;

include!(concat!(env!("OUT_DIR"), "/embedded_templates.rs"));

const EXCLUDED_SUFFIXES: &[&str] = &[".new", ".not-ready"];

/// Immutable mapping from resource name to template text
#[derive(Debug, Clone, Default)]
pub struct ResourceRegistry {
    templates: BTreeMap<String, String>,
}

impl ResourceRegistry {
    /// Registry of the templates compiled into this binary
    pub fn embedded() -> Self {
        Self {
            templates: EMBEDDED_TEMPLATES
                .iter()
                .map(|(name, text)| (name.to_string(), text.to_string()))
                .collect(),
        }
    }

    /// Registry from explicit `(name, template)` pairs
    pub fn from_entries<I, N, T>(entries: I) -> Self
    where
        I: IntoIterator<Item = (N, T)>,
        N: Into<String>,
        T: Into<String>,
    {
        Self {
            templates: entries
                .into_iter()
                .map(|(n, t)| (n.into(), t.into()))
                .collect(),
        }
    }

    /// Load every template file in `dir`.
    ///
    /// The resource name is the kebab-cased file stem (`open_policy_agent.yaml`
    /// becomes `open-policy-agent`). Files ending in `.new` or `.not-ready` are
    /// skipped; two files mapping to the same name are an error.
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let mut templates = BTreeMap::new();
        let mut origins: BTreeMap<String, String> = BTreeMap::new();

        let entries = std::fs::read_dir(dir).map_err(|e| Error::io(dir, e))?;
        for entry in entries {
            let path = entry.map_err(|e| Error::io(dir, e))?.path();
            if !path.is_file() {
                continue;
            }
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if EXCLUDED_SUFFIXES.iter().any(|s| file_name.ends_with(s)) {
                debug!(file = %file_name, "skipping excluded template");
                continue;
            }
            let Some(name) = resource_name(file_name) else {
                continue;
            };
            if let Some(other) = origins.get(&name) {
                return Err(Error::internal_with_context(
                    "registry",
                    format!(
                        "{} and {} both map to resource {:?}; rename or exclude one of them",
                        other, file_name, name
                    ),
                ));
            }

            let text = std::fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;
            debug!(resource = %name, file = %file_name, "loaded template");
            origins.insert(name.clone(), file_name.to_string());
            templates.insert(name, text);
        }

        Ok(Self { templates })
    }

    /// Template text for `name`
    pub fn lookup(&self, name: &str) -> Option<&str> {
        self.templates.get(name).map(String::as_str)
    }

    /// Whether `name` is registered
    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    /// Registered names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    /// Number of registered templates
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

fn resource_name(file_name: &str) -> Option<String> {
    let stem = file_name.split('.').next()?;
    if stem.is_empty() {
        return None;
    }
    Some(stem.replace('_', "-").to_lowercase())
}
