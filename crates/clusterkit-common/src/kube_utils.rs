//! Kubernetes client construction and API resource helpers using kube-rs

use std::path::Path;
use std::time::Duration;

use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::core::GroupVersionKind;
use kube::discovery::{ApiCapabilities, ApiResource, Discovery, Scope};
use kube::{Client, Config};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::retry::RetryPolicy;
use crate::Error;

/// Default connection timeout for kube clients
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default read timeout for kube clients
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Create a kube client and return it with the namespace of the active context.
///
/// With `kubeconfig` set the file is loaded explicitly; otherwise the
/// standard inference chain applies (`KUBECONFIG`, `~/.kube/config`,
/// in-cluster service account).
pub async fn create_client(kubeconfig: Option<&Path>) -> Result<(Client, String), Error> {
    create_client_with_timeout(kubeconfig, DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT).await
}

/// Create a kube client with custom timeouts
pub async fn create_client_with_timeout(
    kubeconfig: Option<&Path>,
    connect_timeout: Duration,
    read_timeout: Duration,
) -> Result<(Client, String), Error> {
    let mut config = match kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                Error::internal_with_context(
                    "create_client",
                    format!("failed to read kubeconfig {}: {}", path.display(), e),
                )
            })?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| {
                    Error::internal_with_context(
                        "create_client",
                        format!("failed to load kubeconfig: {}", e),
                    )
                })?
        }
        None => Config::infer().await.map_err(|e| {
            Error::internal_with_context("create_client", format!("failed to infer config: {}", e))
        })?,
    };
    config.connect_timeout = Some(connect_timeout);
    config.read_timeout = Some(read_timeout);
    let namespace = config.default_namespace.clone();

    let client = Client::try_from(config).map_err(|e| {
        Error::internal_with_context("create_client", format!("failed to create client: {}", e))
    })?;
    Ok((client, namespace))
}

/// Parse apiVersion into (group, version)
///
/// # Examples
/// ```
/// use clusterkit_common::kube_utils::parse_api_version;
///
/// let (group, version) = parse_api_version("apps/v1");
/// assert_eq!(group, "apps");
/// assert_eq!(version, "v1");
///
/// let (group, version) = parse_api_version("v1");
/// assert_eq!(group, "");
/// assert_eq!(version, "v1");
/// ```
pub fn parse_api_version(api_version: &str) -> (String, String) {
    match api_version.split_once('/') {
        Some((group, version)) => (group.to_string(), version.to_string()),
        None => (String::new(), api_version.to_string()),
    }
}

/// Group/version/kind from a document's `apiVersion` and `kind`
pub fn gvk_of(api_version: &str, kind: &str) -> GroupVersionKind {
    let (group, version) = parse_api_version(api_version);
    GroupVersionKind::gvk(&group, &version, kind)
}

/// Render a GVK the way it appears in manifests (`apps/v1/Deployment`, `v1/Secret`)
pub fn display_gvk(gvk: &GroupVersionKind) -> String {
    if gvk.group.is_empty() {
        format!("{}/{}", gvk.version, gvk.kind)
    } else {
        format!("{}/{}/{}", gvk.group, gvk.version, gvk.kind)
    }
}

const IRREGULAR_PLURALS: &[(&str, &str)] = &[
    ("endpoints", "endpoints"),
    ("podsecuritypolicy", "podsecuritypolicies"),
    ("networkpolicy", "networkpolicies"),
    ("priorityclass", "priorityclasses"),
    ("storageclass", "storageclasses"),
    ("ingressclass", "ingressclasses"),
];

/// Pluralize a Kubernetes resource kind
///
/// Used only when discovery is unavailable; the API server's own plural
/// always wins when known.
pub fn pluralize_kind(kind: &str) -> String {
    let lower = kind.to_lowercase();

    if let Some((_, plural)) = IRREGULAR_PLURALS.iter().find(|(s, _)| *s == lower) {
        return (*plural).to_string();
    }

    if lower.ends_with('s') || lower.ends_with("ch") || lower.ends_with("sh") {
        format!("{}es", lower)
    } else if lower.ends_with('y') && !lower.ends_with("ay") && !lower.ends_with("ey") {
        format!("{}ies", &lower[..lower.len() - 1])
    } else {
        format!("{}s", lower)
    }
}

/// Build an ApiResource from a known apiVersion and kind without discovery.
pub fn build_api_resource(api_version: &str, kind: &str) -> ApiResource {
    let (group, version) = parse_api_version(api_version);
    ApiResource {
        group,
        version,
        kind: kind.to_string(),
        api_version: api_version.to_string(),
        plural: pluralize_kind(kind),
    }
}

/// Run full API discovery, retrying while the API server settles.
///
/// Uses a short exponential policy since discovery enumerates every API
/// group and a freshly started API server may still be registering them.
pub async fn run_discovery(client: &Client, cancel: &CancellationToken) -> Result<Discovery, Error> {
    let policy = RetryPolicy {
        max_attempts: 5,
        delay: Duration::from_secs(1),
        backoff: crate::retry::Backoff::Exponential {
            multiplier: 2.0,
            max_delay: Duration::from_secs(10),
        },
    };
    policy
        .run("api-discovery", cancel, || {
            let client = client.clone();
            async move {
                Discovery::new(client)
                    .run()
                    .await
                    .map_err(|e| Error::internal_with_context("api-discovery", e.to_string()))
            }
        })
        .await
}

/// Look up a GVK in discovery results.
///
/// Returns the API resource with the server's plural and whether it is
/// namespaced, or `None` when the server does not serve that GVK.
pub fn find_in_discovery(
    discovery: &Discovery,
    gvk: &GroupVersionKind,
) -> Option<(ApiResource, bool)> {
    let (ar, caps): (ApiResource, ApiCapabilities) = discovery.resolve_gvk(gvk)?;
    let namespaced = matches!(caps.scope, Scope::Namespaced);
    debug!(
        gvk = %display_gvk(gvk),
        plural = %ar.plural,
        namespaced,
        "resolved kind via discovery"
    );
    Some((ar, namespaced))
}
