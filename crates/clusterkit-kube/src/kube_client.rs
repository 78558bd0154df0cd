//! kube-rs implementation of [`ClusterClient`]

use std::path::Path;

use async_trait::async_trait;
use clusterkit_common::kube_utils::{create_client, display_gvk, find_in_discovery, run_discovery};
use clusterkit_common::{Error, Result, FIELD_MANAGER};
use kube::api::{Api, DynamicObject, Patch, PatchParams, PostParams};
use kube::core::GroupVersionKind;
use kube::discovery::Discovery;
use kube::Client;
use serde_json::Value;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::client::{ClusterClient, ResolvedKind};
use crate::handle::ObjectHandle;
use crate::patch::{ObjectPatch, PatchStrategy};

/// Cluster client backed by a kube-rs [`Client`].
///
/// API discovery runs lazily on the first resolve and again whenever a kind
/// is missing from the cached results, so kinds registered by earlier
/// resources (CRDs) become resolvable without restarting.
pub struct KubeClusterClient {
    client: Client,
    namespace: String,
    discovery: RwLock<Option<Discovery>>,
    cancel: CancellationToken,
}

impl KubeClusterClient {
    /// Wrap an existing client
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            discovery: RwLock::new(None),
            cancel: CancellationToken::new(),
        }
    }

    /// Connect using the given kubeconfig, or the default inference chain
    pub async fn connect(kubeconfig: Option<&Path>) -> Result<Self> {
        let (client, namespace) = create_client(kubeconfig).await?;
        info!(namespace = %namespace, "connected to cluster");
        Ok(Self::new(client, namespace))
    }

    /// Abort discovery retries when `cancel` fires
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    fn api(&self, handle: &ObjectHandle) -> Api<DynamicObject> {
        match &handle.namespace {
            Some(ns) if handle.namespaced => {
                Api::namespaced_with(self.client.clone(), ns, &handle.api_resource)
            }
            _ => Api::all_with(self.client.clone(), &handle.api_resource),
        }
    }

    async fn cached(&self, gvk: &GroupVersionKind) -> Option<ResolvedKind> {
        let guard = self.discovery.read().await;
        let discovery = guard.as_ref()?;
        find_in_discovery(discovery, gvk).map(|(api_resource, namespaced)| ResolvedKind {
            api_resource,
            namespaced,
        })
    }
}

fn to_value(object: DynamicObject, handle: &ObjectHandle) -> Result<Value> {
    serde_json::to_value(object).map_err(|e| {
        Error::serialization_for_kind(handle.gvk.kind.clone(), format!("{}: {}", handle, e))
    })
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    fn default_namespace(&self) -> String {
        self.namespace.clone()
    }

    async fn resolve(&self, gvk: &GroupVersionKind) -> Result<ResolvedKind> {
        if let Some(resolved) = self.cached(gvk).await {
            return Ok(resolved);
        }

        debug!(gvk = %display_gvk(gvk), "kind not in cached discovery, refreshing");
        let fresh = run_discovery(&self.client, &self.cancel).await?;
        let resolved = find_in_discovery(&fresh, gvk);
        *self.discovery.write().await = Some(fresh);

        resolved
            .map(|(api_resource, namespaced)| ResolvedKind {
                api_resource,
                namespaced,
            })
            .ok_or_else(|| {
                Error::internal_with_context(
                    "resolve",
                    format!("{} is not served by the cluster", display_gvk(gvk)),
                )
            })
    }

    async fn get(&self, handle: &ObjectHandle) -> Result<Value> {
        let object = self
            .api(handle)
            .get(&handle.name)
            .await
            .map_err(|e| Error::from_kube(e, handle.reference()))?;
        to_value(object, handle)
    }

    async fn create(&self, handle: &ObjectHandle) -> Result<Value> {
        let object: DynamicObject = serde_json::from_value(handle.data().clone()).map_err(|e| {
            Error::serialization_for_kind(handle.gvk.kind.clone(), format!("{}: {}", handle, e))
        })?;
        let params = PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };
        let created = self
            .api(handle)
            .create(&params, &object)
            .await
            .map_err(|e| Error::from_kube(e, handle.reference()))?;
        info!(object = %handle, "created");
        to_value(created, handle)
    }

    async fn patch(&self, handle: &ObjectHandle, patch: &ObjectPatch) -> Result<Value> {
        let params = PatchParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };
        let body = match patch.strategy {
            PatchStrategy::StrategicMerge => Patch::Strategic(&patch.body),
            PatchStrategy::JsonMerge => Patch::Merge(&patch.body),
        };
        let patched = self
            .api(handle)
            .patch(&handle.name, &params, &body)
            .await
            .map_err(|e| Error::from_kube(e, handle.reference()))?;
        info!(object = %handle, strategy = ?patch.strategy, "patched");
        to_value(patched, handle)
    }
}
