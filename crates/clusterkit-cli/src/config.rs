//! Cluster configuration file.
//!
//! A YAML document describing the cluster whose resources are managed:
//!
//! ```yaml
//! name: demo01
//! platform: eks
//! certs_path: ./certs
//! resources: [aws-auth, file:///srv/manifests/extra.yaml]
//! data:
//!   nodeInstanceRoleArn: arn:aws:iam::123456789012:role/nodes
//!   replicas: 3
//! retry:
//!   max_attempts: 6
//!   delay_secs: 10
//! ```
//!
//! Every field is optional. Scalar `data` values reach templates as their
//! YAML text; lists and maps as JSON. The kubeconfig resolution chain (highest
//! priority first):
//! 1. Explicit `--kubeconfig` flag
//! 2. `CLUSTERKIT_KUBECONFIG` environment variable
//! 3. `kubeconfig` from this file
//! 4. Fall back to kube defaults (`KUBECONFIG` env / `~/.kube/config` / in-cluster)

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clusterkit_common::retry::{RetryPolicy, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY};
use clusterkit_resources::{ResourceRegistry, ResourceSet};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Error, Result};

const CLUSTERKIT_KUBECONFIG_ENV: &str = "CLUSTERKIT_KUBECONFIG";

/// Retry settings for applying one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Attempts per resource, including the first
    pub max_attempts: u32,
    /// Seconds between attempts
    pub delay_secs: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay_secs: DEFAULT_RETRY_DELAY.as_secs(),
        }
    }
}

impl RetrySettings {
    /// Fixed-delay policy from these settings
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(self.max_attempts, Duration::from_secs(self.delay_secs))
    }
}

/// Cluster configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Cluster name, exposed to templates as `clusterName`
    pub name: String,
    /// Platform, exposed as `platform`; selects the default resources
    pub platform: String,
    /// Directory of `<platform>/<name>.{crt,key}` files, exposed as `certsPath`
    pub certs_path: PathBuf,
    /// Kubeconfig for the target cluster
    pub kubeconfig: Option<PathBuf>,
    /// Resources to apply; the platform defaults when absent
    pub resources: Option<Vec<String>>,
    /// Extra template data; overrides the injected keys
    pub data: BTreeMap<String, serde_yaml::Value>,
    /// Directory `export` writes to
    pub export_dir: PathBuf,
    /// Load templates from this directory instead of the embedded ones
    pub templates_dir: Option<PathBuf>,
    /// Retry settings
    pub retry: RetrySettings,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            name: "clusterkit".to_string(),
            platform: "raw".to_string(),
            certs_path: PathBuf::from("certs"),
            kubeconfig: None,
            resources: None,
            data: BTreeMap::new(),
            export_dir: PathBuf::from("manifests"),
            templates_dir: None,
            retry: RetrySettings::default(),
        }
    }
}

impl ClusterConfig {
    /// Load from `path`, or defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            debug!("no config file given, using defaults");
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::config(path, format!("failed to read: {}", e)))?;
        Self::parse(path, &text)
    }

    fn parse(path: &Path, text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self =
            serde_yaml::from_str(text).map_err(|e| Error::config(path, e.to_string()))?;
        if config.retry.max_attempts == 0 {
            return Err(Error::config(path, "retry.max_attempts must be at least 1"));
        }
        config
            .user_data()
            .map_err(|e| Error::config(path, e.to_string()))?;
        Ok(config)
    }

    /// Data injected into every resource set before user data
    pub fn base_data(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("clusterName".to_string(), self.name.clone()),
            ("platform".to_string(), self.platform.clone()),
            (
                "certsPath".to_string(),
                self.certs_path.to_string_lossy().into_owned(),
            ),
        ])
    }

    /// User `data` as template strings
    pub fn user_data(&self) -> Result<BTreeMap<String, String>> {
        self.data
            .iter()
            .map(|(key, value)| Ok((key.clone(), data_string(key, value)?)))
            .collect()
    }

    /// Templates directory if configured, else the embedded templates
    pub fn registry(&self) -> Result<Arc<ResourceRegistry>> {
        let registry = match &self.templates_dir {
            Some(dir) => ResourceRegistry::from_dir(dir)?,
            None => ResourceRegistry::embedded(),
        };
        debug!(templates = registry.len(), "resource registry ready");
        Ok(Arc::new(registry))
    }

    /// Resource set for `names`, falling back to the configured resources
    /// and then to the platform defaults.
    pub fn resource_set(
        &self,
        registry: Arc<ResourceRegistry>,
        names: &[String],
    ) -> Result<ResourceSet> {
        let mut set = ResourceSet::new(registry);
        if !names.is_empty() {
            set.add_resources(names)?;
        } else if let Some(resources) = &self.resources {
            set.add_resources(resources)?;
        } else {
            set.add_default_resources_for(&[self.platform.as_str()])?;
        }
        set.append_data(self.base_data());
        set.append_data(self.user_data()?);
        Ok(set)
    }

    /// Kubeconfig to use, or `None` for kube defaults
    pub fn resolve_kubeconfig(&self, explicit: Option<&Path>) -> Option<PathBuf> {
        resolve_kubeconfig(
            explicit,
            std::env::var(CLUSTERKIT_KUBECONFIG_ENV).ok().as_deref(),
            self.kubeconfig.as_deref(),
        )
    }
}

fn data_string(key: &str, value: &serde_yaml::Value) -> Result<String> {
    use serde_yaml::Value;

    Ok(match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Tagged(tagged) => data_string(key, &tagged.value)?,
        other => serde_json::to_string(other)
            .map_err(|e| Error::validation(format!("data.{}: {}", key, e)))?,
    })
}

fn resolve_kubeconfig(
    explicit: Option<&Path>,
    env: Option<&str>,
    configured: Option<&Path>,
) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Some(path) = env.filter(|p| !p.is_empty()) {
        return Some(PathBuf::from(path));
    }
    configured.map(Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn registry() -> Arc<ResourceRegistry> {
        Arc::new(ResourceRegistry::from_entries([
            ("ebs-blockstore", "a: 1\n"),
            ("open-policy-agent", "b: 2\n"),
            ("aws-auth", "c: 3\n"),
        ]))
    }

    #[test]
    fn parses_a_full_config() {
        let text = r#"
name: demo01
platform: aws
certs_path: /etc/clusterkit/certs
resources: [aws-auth]
data:
  clusterName: override
  region: us-west-2
retry:
  max_attempts: 3
  delay_secs: 1
"#;
        let config = ClusterConfig::parse(Path::new("cluster.yaml"), text).unwrap();
        assert_eq!(config.name, "demo01");
        assert_eq!(config.retry.policy(), RetryPolicy::fixed(3, Duration::from_secs(1)));
        assert_eq!(config.export_dir, PathBuf::from("manifests"));
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config = ClusterConfig::parse(Path::new("cluster.yaml"), "\n").unwrap();
        assert_eq!(config.platform, "raw");
        assert_eq!(config.retry, RetrySettings::default());
    }

    #[test]
    fn zero_attempts_are_rejected() {
        let err = ClusterConfig::parse(Path::new("c.yaml"), "retry:\n  max_attempts: 0\n")
            .unwrap_err();
        assert!(err.to_string().contains("max_attempts"));
    }

    #[test]
    fn unreadable_config_names_the_path() {
        let err = ClusterConfig::load(Some(Path::new("/nonexistent/cluster.yaml"))).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/cluster.yaml"));
    }

    #[test]
    fn user_data_overrides_injected_keys() {
        let mut config = ClusterConfig {
            name: "demo01".to_string(),
            platform: "aws".to_string(),
            ..ClusterConfig::default()
        };
        config
            .data
            .insert("platform".to_string(), serde_yaml::Value::from("custom"));

        let set = config.resource_set(registry(), &[]).unwrap();
        assert_eq!(set.data()["clusterName"], "demo01");
        assert_eq!(set.data()["platform"], "custom");
        assert_eq!(set.data()["certsPath"], "certs");
    }

    #[test]
    fn resources_fall_back_to_platform_defaults() {
        let config = ClusterConfig {
            platform: "aws".to_string(),
            ..ClusterConfig::default()
        };
        let set = config.resource_set(registry(), &[]).unwrap();
        assert_eq!(set.names(), vec!["ebs-blockstore", "open-policy-agent"]);
    }

    #[test]
    fn explicit_names_win_over_configured_resources() {
        let config = ClusterConfig {
            resources: Some(vec!["aws-auth".to_string()]),
            ..ClusterConfig::default()
        };
        let set = config
            .resource_set(registry(), &["open-policy-agent".to_string()])
            .unwrap();
        assert_eq!(set.names(), vec!["open-policy-agent"]);

        let set = config.resource_set(registry(), &[]).unwrap();
        assert_eq!(set.names(), vec!["aws-auth"]);
    }

    #[test]
    fn non_string_data_values_are_stringified() {
        let text = r#"
data:
  replicas: 3
  ratio: 0.5
  enabled: true
  empty:
  zones: [a, b]
  shares:
    - efs_id: fs-1
"#;
        let config = ClusterConfig::parse(Path::new("cluster.yaml"), text).unwrap();
        let data = config.user_data().unwrap();
        assert_eq!(data["replicas"], "3");
        assert_eq!(data["ratio"], "0.5");
        assert_eq!(data["enabled"], "true");
        assert_eq!(data["empty"], "");
        assert_eq!(data["zones"], r#"["a","b"]"#);
        assert_eq!(data["shares"], r#"[{"efs_id":"fs-1"}]"#);

        let set = config.resource_set(registry(), &["aws-auth".to_string()]).unwrap();
        assert_eq!(set.data()["replicas"], "3");
    }

    #[test]
    fn map_with_non_string_keys_is_rejected() {
        let err = ClusterConfig::parse(Path::new("c.yaml"), "data:\n  odd:\n    [1, 2]: x\n")
            .unwrap_err();
        assert!(err.to_string().contains("data.odd"));
    }

    #[rstest]
    #[case(Some("/flag"), Some("/env"), Some("/file"), Some("/flag"))]
    #[case(None, Some("/env"), Some("/file"), Some("/env"))]
    #[case(None, Some(""), Some("/file"), Some("/file"))]
    #[case(None, None, Some("/file"), Some("/file"))]
    #[case(None, None, None, None)]
    fn kubeconfig_resolution_order(
        #[case] explicit: Option<&str>,
        #[case] env: Option<&str>,
        #[case] configured: Option<&str>,
        #[case] expected: Option<&str>,
    ) {
        let resolved = resolve_kubeconfig(
            explicit.map(Path::new),
            env,
            configured.map(Path::new),
        );
        assert_eq!(resolved, expected.map(PathBuf::from));
    }
}
