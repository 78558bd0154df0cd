//! Addressable cluster objects

use std::fmt;

use kube::core::GroupVersionKind;
use kube::discovery::ApiResource;
use serde_json::Value;

use crate::scheme::RegisteredKind;

/// The object carried by a handle, tagged by whether its kind has a
/// compiled-in schema.
#[derive(Debug, Clone)]
pub enum ClusterObject {
    /// Kind is registered; strategic merge metadata is available
    Typed {
        /// Registered kind metadata
        kind: &'static RegisteredKind,
        /// The document
        data: Value,
    },
    /// Kind is unknown to this build (custom resources, removed APIs)
    Unstructured(Value),
}

impl ClusterObject {
    /// The underlying document
    pub fn data(&self) -> &Value {
        match self {
            ClusterObject::Typed { data, .. } => data,
            ClusterObject::Unstructured(data) => data,
        }
    }

    fn data_mut(&mut self) -> &mut Value {
        match self {
            ClusterObject::Typed { data, .. } => data,
            ClusterObject::Unstructured(data) => data,
        }
    }

    /// Registered kind metadata, if any
    pub fn registered(&self) -> Option<&'static RegisteredKind> {
        match self {
            ClusterObject::Typed { kind, .. } => Some(kind),
            ClusterObject::Unstructured(_) => None,
        }
    }
}

/// One object parsed from manifest content, resolved against the cluster.
///
/// Holds the desired document until a create or patch refreshes it with the
/// server's response.
#[derive(Debug, Clone)]
pub struct ObjectHandle {
    /// Where the object came from (resource name, file path or URL)
    pub source: String,
    /// Group/version/kind declared by the document
    pub gvk: GroupVersionKind,
    /// API resource used to address the object
    pub api_resource: ApiResource,
    /// Whether the kind is namespace scoped
    pub namespaced: bool,
    /// Effective namespace for namespaced kinds
    pub namespace: Option<String>,
    /// Object name
    pub name: String,
    /// The object itself
    pub object: ClusterObject,
}

impl ObjectHandle {
    /// The document currently held by the handle
    pub fn data(&self) -> &Value {
        self.object.data()
    }

    /// Replace the held document with the server's view after a write
    pub fn refresh(&mut self, server: Value) {
        *self.object.data_mut() = server;
    }

    /// `Kind namespace/name` or `Kind name` for cluster-scoped objects
    pub fn reference(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{} {}/{}", self.gvk.kind, ns, self.name),
            None => write!(f, "{} {}", self.gvk.kind, self.name),
        }
    }
}
