//! Cluster client seam and the operations built on it.
//!
//! [`ClusterClient`] is the minimal surface a cluster must offer: resolve a
//! kind, and get, create or patch one object. Everything else (parsing
//! manifest content into handles, existence checks, create-or-patch) is
//! written once against the trait so tests can substitute a mock or an
//! in-memory cluster.

use std::path::Path;

use async_trait::async_trait;
use clusterkit_common::kube_utils::{display_gvk, gvk_of};
use clusterkit_common::yaml::parse_documents;
use clusterkit_common::{Error, Result};
use kube::core::GroupVersionKind;
use kube::discovery::ApiResource;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info};

#[cfg(test)]
use mockall::automock;

use crate::handle::{ClusterObject, ObjectHandle};
use crate::patch::{compute_patch, desired_document, with_last_applied, ObjectPatch};
use crate::scheme;
use crate::source::read_reference;

/// How the cluster serves a kind
#[derive(Clone, Debug)]
pub struct ResolvedKind {
    /// API resource (with the server's plural)
    pub api_resource: ApiResource,
    /// Whether objects of this kind live in a namespace
    pub namespaced: bool,
}

/// Trait abstracting the cluster API
///
/// The kube-rs implementation is [`crate::KubeClusterClient`].
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Namespace applied to namespaced objects that do not declare one
    fn default_namespace(&self) -> String;

    /// Resolve how the cluster serves `gvk`
    async fn resolve(&self, gvk: &GroupVersionKind) -> Result<ResolvedKind>;

    /// Fetch the live object. Returns [`Error::NotFound`] when it does not exist.
    async fn get(&self, handle: &ObjectHandle) -> Result<Value>;

    /// Create the object from the handle's document, returning the server's view
    async fn create(&self, handle: &ObjectHandle) -> Result<Value>;

    /// Patch the live object, returning the server's view
    async fn patch(&self, handle: &ObjectHandle, patch: &ObjectPatch) -> Result<Value>;
}

/// Parse manifest content into object handles.
///
/// A stream that is not valid YAML/JSON fails as a whole. Otherwise every
/// document yields its own result in stream order, so one bad object does
/// not hide the others.
///
/// With `unstructured` set, kinds without a compiled-in schema are carried
/// as [`ClusterObject::Unstructured`]; without it they are per-object errors.
pub async fn result_for_content(
    client: &dyn ClusterClient,
    source: &str,
    content: &str,
    unstructured: bool,
) -> Result<Vec<Result<ObjectHandle>>> {
    let documents = parse_documents(content).map_err(|e| match e {
        Error::Serialization { message, .. } => Error::Serialization {
            message: format!("{}: {}", source, message),
            kind: None,
        },
        other => other,
    })?;

    let documents = flatten_lists(documents);
    let namespace = client.default_namespace();
    let mut results = Vec::with_capacity(documents.len());
    for document in documents {
        results.push(to_handle(client, source, document, &namespace, unstructured).await);
    }
    Ok(results)
}

/// Expand `kind: *List` documents into their items, keeping stream order.
fn flatten_lists(documents: Vec<Value>) -> Vec<Value> {
    let mut flat = Vec::with_capacity(documents.len());
    for mut document in documents {
        let is_list = document
            .get("kind")
            .and_then(Value::as_str)
            .is_some_and(|kind| kind.ends_with("List"));
        match document.get_mut("items").map(Value::take) {
            Some(Value::Array(items)) if is_list => flat.extend(flatten_lists(items)),
            Some(items) => {
                document["items"] = items;
                flat.push(document);
            }
            None => flat.push(document),
        }
    }
    flat
}

/// Parse a manifest file into object handles
pub async fn result_for_file(
    client: &dyn ClusterClient,
    path: &Path,
    unstructured: bool,
) -> Result<Vec<Result<ObjectHandle>>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Error::io(path, e))?;
    result_for_content(client, &path.display().to_string(), &content, unstructured).await
}

/// Parse manifest content read from `reader` into object handles
pub async fn result_for_reader<R>(
    client: &dyn ClusterClient,
    source: &str,
    mut reader: R,
    unstructured: bool,
) -> Result<Vec<Result<ObjectHandle>>>
where
    R: AsyncRead + Unpin + Send,
{
    let mut content = String::new();
    reader
        .read_to_string(&mut content)
        .await
        .map_err(|e| Error::io(source, e))?;
    result_for_content(client, source, &content, unstructured).await
}

/// Parse the manifest behind a `file://` or `http(s)://` reference
pub async fn result_for_reference(
    client: &dyn ClusterClient,
    reference: &str,
    unstructured: bool,
) -> Result<Vec<Result<ObjectHandle>>> {
    let content = read_reference(reference).await?;
    result_for_content(client, reference, &content, unstructured).await
}

async fn to_handle(
    client: &dyn ClusterClient,
    source: &str,
    mut document: Value,
    default_namespace: &str,
    unstructured: bool,
) -> Result<ObjectHandle> {
    let api_version = string_field(&document, "/apiVersion", source)?;
    let kind = string_field(&document, "/kind", source)?;
    let name = string_field(&document, "/metadata/name", source)?;
    let gvk = gvk_of(&api_version, &kind);

    let resolved = client.resolve(&gvk).await?;

    let namespace = if resolved.namespaced {
        let ns = document
            .pointer("/metadata/namespace")
            .and_then(Value::as_str)
            .filter(|ns| !ns.is_empty())
            .unwrap_or(default_namespace)
            .to_string();
        document["metadata"]["namespace"] = Value::String(ns.clone());
        Some(ns)
    } else {
        if let Some(meta) = document.get_mut("metadata").and_then(Value::as_object_mut) {
            meta.remove("namespace");
        }
        None
    };

    let object = match scheme::lookup(&gvk.group, &gvk.kind) {
        Some(registered) => ClusterObject::Typed {
            kind: registered,
            data: document,
        },
        None if unstructured => ClusterObject::Unstructured(document),
        None => {
            return Err(Error::Conversion {
                gvk: display_gvk(&gvk),
                message: "kind is not registered; parse it as unstructured".to_string(),
            })
        }
    };

    Ok(ObjectHandle {
        source: source.to_string(),
        gvk,
        api_resource: resolved.api_resource,
        namespaced: resolved.namespaced,
        namespace,
        name,
        object,
    })
}

fn string_field(document: &Value, pointer: &str, source: &str) -> Result<String> {
    document
        .pointer(pointer)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            Error::serialization(format!(
                "object in {} is missing {}",
                source,
                pointer.trim_start_matches('/').replace('/', ".")
            ))
        })
}

/// Split per-object results into handles, or fail with every per-object error.
pub fn collect_handles(
    source: &str,
    results: Vec<Result<ObjectHandle>>,
) -> Result<Vec<ObjectHandle>> {
    let mut handles = Vec::with_capacity(results.len());
    let mut errors = Vec::new();
    for result in results {
        match result {
            Ok(handle) => handles.push(handle),
            Err(e) => errors.push(e),
        }
    }
    if errors.is_empty() {
        Ok(handles)
    } else {
        Err(Error::Objects {
            source_name: source.to_string(),
            errors,
        })
    }
}

/// Create the object and refresh the handle from the server's response
pub async fn create(client: &dyn ClusterClient, handle: &mut ObjectHandle) -> Result<()> {
    let (document, _) = desired_document(&handle.object, &handle.gvk)?;
    let mut to_create = handle.clone();
    to_create.refresh(with_last_applied(&document));
    let server = client.create(&to_create).await?;
    handle.refresh(server);
    Ok(())
}

/// Patch the object and refresh the handle from the server's response
pub async fn patch(
    client: &dyn ClusterClient,
    handle: &mut ObjectHandle,
    patch: &ObjectPatch,
) -> Result<()> {
    let server = client.patch(handle, patch).await?;
    handle.refresh(server);
    Ok(())
}

/// Whether the object exists. Not-found is `Ok(false)`; any other failure is an error.
pub async fn exists(client: &dyn ClusterClient, handle: &ObjectHandle) -> Result<bool> {
    match client.get(handle).await {
        Ok(_) => Ok(true),
        Err(e) if e.is_not_found() => Ok(false),
        Err(e) => Err(e),
    }
}

/// Outcome of a single create-or-patch
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Object did not exist and was created
    Created,
    /// Object existed and was patched
    Patched,
    /// Object already matched; nothing was written
    Unchanged,
}

/// Create the object if missing, otherwise patch it if it drifted.
pub async fn create_or_patch(
    client: &dyn ClusterClient,
    handle: &mut ObjectHandle,
) -> Result<WriteOutcome> {
    let current = match client.get(handle).await {
        Ok(current) => current,
        Err(e) if e.is_not_found() => {
            debug!(object = %handle, "object not found, creating");
            create(client, handle).await?;
            return Ok(WriteOutcome::Created);
        }
        Err(e) => return Err(e),
    };

    match compute_patch(&handle.object, &handle.gvk, &current)? {
        None => {
            debug!(object = %handle, "object already converged");
            Ok(WriteOutcome::Unchanged)
        }
        Some(p) => {
            debug!(object = %handle, strategy = ?p.strategy, "patching object");
            patch(client, handle, &p).await?;
            Ok(WriteOutcome::Patched)
        }
    }
}

#[derive(Clone, Copy)]
enum ContentWrite {
    Create,
    Update,
    Apply,
}

async fn write_objects(
    client: &dyn ClusterClient,
    source: &str,
    content: &str,
    mode: ContentWrite,
) -> Result<()> {
    let results = result_for_content(client, source, content, true).await?;
    let mut errors = Vec::new();
    for result in results {
        let outcome = match result {
            Ok(mut handle) => write_object(client, &mut handle, mode).await,
            Err(e) => Err(e),
        };
        if let Err(e) = outcome {
            errors.push(e);
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(Error::Objects {
            source_name: source.to_string(),
            errors,
        })
    }
}

async fn write_object(
    client: &dyn ClusterClient,
    handle: &mut ObjectHandle,
    mode: ContentWrite,
) -> Result<()> {
    match mode {
        ContentWrite::Create => create(client, handle).await,
        ContentWrite::Update => {
            let current = client.get(handle).await?;
            if let Some(p) = compute_patch(&handle.object, &handle.gvk, &current)? {
                patch(client, handle, &p).await?;
            }
            Ok(())
        }
        ContentWrite::Apply => create_or_patch(client, handle).await.map(|_| ()),
    }
}

/// Create every object in `content`; existing objects are a conflict.
pub async fn create_content(client: &dyn ClusterClient, source: &str, content: &str) -> Result<()> {
    write_objects(client, source, content, ContentWrite::Create).await
}

/// Patch every object in `content`; missing objects are not-found errors.
pub async fn update_content(client: &dyn ClusterClient, source: &str, content: &str) -> Result<()> {
    write_objects(client, source, content, ContentWrite::Update).await
}

/// Create or patch every object in `content`, visiting all objects even
/// when some fail.
pub async fn apply_content(client: &dyn ClusterClient, source: &str, content: &str) -> Result<()> {
    write_objects(client, source, content, ContentWrite::Apply).await
}

/// Create the namespace if it does not exist; a concurrent create is success.
pub async fn ensure_namespace(client: &dyn ClusterClient, name: &str) -> Result<()> {
    let manifest = serde_json::json!({
        "apiVersion": "v1",
        "kind": "Namespace",
        "metadata": {"name": name, "labels": {"name": name}},
    })
    .to_string();
    let results = result_for_content(client, "namespace", &manifest, false).await?;
    for mut handle in collect_handles("namespace", results)? {
        if exists(client, &handle).await? {
            debug!(namespace = %name, "namespace already exists");
            continue;
        }
        match create(client, &mut handle).await {
            Ok(()) => info!(namespace = %name, "created namespace"),
            Err(Error::Conflict { .. }) => debug!(namespace = %name, "namespace created concurrently"),
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
