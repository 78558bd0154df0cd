//! Kinds with compiled-in schemas.
//!
//! A kind is registered when k8s-openapi ships a typed struct for it. Registered
//! kinds are patched with a strategic merge that uses the list merge keys
//! declared here; everything else falls back to an RFC 7386 JSON merge patch.

use k8s_openapi::api::admissionregistration::v1::{
    MutatingWebhookConfiguration, ValidatingWebhookConfiguration,
};
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::core::v1::{
    ConfigMap, Endpoints, LimitRange, Namespace, PersistentVolume, PersistentVolumeClaim, Pod,
    ResourceQuota, Secret, Service, ServiceAccount,
};
use k8s_openapi::api::networking::v1::{Ingress, NetworkPolicy};
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding};
use k8s_openapi::api::scheduling::v1::PriorityClass;
use k8s_openapi::api::storage::v1::{CSIDriver, StorageClass};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::core::GroupVersionKind;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// How a list field is combined during a strategic merge
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListStrategy {
    /// The desired list replaces the live one
    Replace,
    /// Elements are matched by the named key and merged field by field
    MergeByKey(&'static str),
    /// Scalar elements are unioned; removals use a delete directive
    MergePrimitives,
}

/// Metadata for a kind with a compiled-in schema
#[derive(Debug)]
pub struct RegisteredKind {
    /// API group ("" for core)
    pub group: &'static str,
    /// The only version this build understands
    pub version: &'static str,
    /// Kind name
    pub kind: &'static str,
    normalize: fn(&Value) -> Result<Value, serde_json::Error>,
    lists: &'static [(&'static str, ListStrategy)],
}

/// Why a document could not be converted to its registered type
#[derive(Debug, Clone, PartialEq)]
pub enum ConversionError {
    /// The document's version is not the registered one
    NotRegistered(String),
    /// The document does not fit the registered schema
    Invalid(String),
}

impl std::fmt::Display for ConversionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConversionError::NotRegistered(msg) | ConversionError::Invalid(msg) => {
                write!(f, "{}", msg)
            }
        }
    }
}

fn normalize<K: DeserializeOwned + Serialize>(doc: &Value) -> Result<Value, serde_json::Error> {
    serde_json::to_value(K::deserialize(doc)?)
}

impl RegisteredKind {
    /// Convert `doc`, declared as `gvk`, through the registered type.
    ///
    /// The result is the document as the typed struct serializes it, so
    /// values the API server also normalizes (quantities such as `cpu: 1`)
    /// compare equal to what the server returns.
    pub fn convert(&self, gvk: &GroupVersionKind, doc: &Value) -> Result<Value, ConversionError> {
        if gvk.version != self.version {
            return Err(ConversionError::NotRegistered(format!(
                "{} is registered at version {}, not {}",
                self.kind, self.version, gvk.version
            )));
        }
        (self.normalize)(doc).map_err(|e| ConversionError::Invalid(e.to_string()))
    }

    /// List strategy for the field at `path` (object keys from the document root).
    ///
    /// The most specific matching rule wins; unmatched lists are replaced.
    pub fn list_strategy(&self, path: &[String]) -> ListStrategy {
        COMMON_LISTS
            .iter()
            .chain(self.lists.iter())
            .filter(|(pattern, _)| path_matches(path, pattern))
            .max_by_key(|(pattern, _)| pattern.split('.').count())
            .map_or(ListStrategy::Replace, |(_, strategy)| *strategy)
    }
}

fn path_matches(path: &[String], pattern: &str) -> bool {
    let segments: Vec<&str> = pattern.split('.').collect();
    if segments.len() > path.len() {
        return false;
    }
    path[path.len() - segments.len()..]
        .iter()
        .zip(segments)
        .all(|(have, want)| have == want)
}

const COMMON_LISTS: &[(&str, ListStrategy)] = &[
    ("metadata.finalizers", ListStrategy::MergePrimitives),
    ("metadata.ownerReferences", ListStrategy::MergeByKey("uid")),
];

const POD_SPEC_LISTS: &[(&str, ListStrategy)] = &[
    ("containers", ListStrategy::MergeByKey("name")),
    ("initContainers", ListStrategy::MergeByKey("name")),
    ("ephemeralContainers", ListStrategy::MergeByKey("name")),
    ("containers.ports", ListStrategy::MergeByKey("containerPort")),
    ("initContainers.ports", ListStrategy::MergeByKey("containerPort")),
    ("env", ListStrategy::MergeByKey("name")),
    ("volumeMounts", ListStrategy::MergeByKey("mountPath")),
    ("volumeDevices", ListStrategy::MergeByKey("devicePath")),
    ("volumes", ListStrategy::MergeByKey("name")),
    ("imagePullSecrets", ListStrategy::MergeByKey("name")),
    ("hostAliases", ListStrategy::MergeByKey("ip")),
];

const SERVICE_LISTS: &[(&str, ListStrategy)] =
    &[("spec.ports", ListStrategy::MergeByKey("port"))];

const WEBHOOK_LISTS: &[(&str, ListStrategy)] = &[("webhooks", ListStrategy::MergeByKey("name"))];

const NO_LISTS: &[(&str, ListStrategy)] = &[];

macro_rules! registered {
    ($ty:ty, $lists:expr) => {
        RegisteredKind {
            group: <$ty as k8s_openapi::Resource>::GROUP,
            version: <$ty as k8s_openapi::Resource>::VERSION,
            kind: <$ty as k8s_openapi::Resource>::KIND,
            normalize: normalize::<$ty>,
            lists: $lists,
        }
    };
}

static KINDS: &[RegisteredKind] = &[
    registered!(Namespace, NO_LISTS),
    registered!(ConfigMap, NO_LISTS),
    registered!(Secret, NO_LISTS),
    registered!(Service, SERVICE_LISTS),
    registered!(ServiceAccount, NO_LISTS),
    registered!(Endpoints, NO_LISTS),
    registered!(Pod, POD_SPEC_LISTS),
    registered!(PersistentVolume, NO_LISTS),
    registered!(PersistentVolumeClaim, NO_LISTS),
    registered!(ResourceQuota, NO_LISTS),
    registered!(LimitRange, NO_LISTS),
    registered!(Deployment, POD_SPEC_LISTS),
    registered!(DaemonSet, POD_SPEC_LISTS),
    registered!(StatefulSet, POD_SPEC_LISTS),
    registered!(ReplicaSet, POD_SPEC_LISTS),
    registered!(Job, POD_SPEC_LISTS),
    registered!(CronJob, POD_SPEC_LISTS),
    registered!(Role, NO_LISTS),
    registered!(RoleBinding, NO_LISTS),
    registered!(ClusterRole, NO_LISTS),
    registered!(ClusterRoleBinding, NO_LISTS),
    registered!(StorageClass, NO_LISTS),
    registered!(CSIDriver, NO_LISTS),
    registered!(PriorityClass, NO_LISTS),
    registered!(NetworkPolicy, NO_LISTS),
    registered!(Ingress, NO_LISTS),
    registered!(PodDisruptionBudget, NO_LISTS),
    registered!(HorizontalPodAutoscaler, NO_LISTS),
    registered!(MutatingWebhookConfiguration, WEBHOOK_LISTS),
    registered!(ValidatingWebhookConfiguration, WEBHOOK_LISTS),
    registered!(CustomResourceDefinition, NO_LISTS),
];

/// Find the registered kind for a group and kind name, ignoring version.
pub fn lookup(group: &str, kind: &str) -> Option<&'static RegisteredKind> {
    KINDS.iter().find(|k| k.group == group && k.kind == kind)
}
