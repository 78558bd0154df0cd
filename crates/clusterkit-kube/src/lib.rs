//! Cluster access for clusterkit
//!
//! Turns manifest content into addressable [`ObjectHandle`]s, reads and
//! writes them through the [`ClusterClient`] seam, and computes the patch
//! needed to converge a live object to its desired state.

#![deny(missing_docs)]

pub mod client;
pub mod handle;
pub mod kube_client;
pub mod patch;
pub mod scheme;
pub mod source;

pub use client::{
    apply_content, collect_handles, create, create_content, create_or_patch, ensure_namespace,
    exists, patch, result_for_content, result_for_file, result_for_reader, result_for_reference,
    update_content, ClusterClient, ResolvedKind, WriteOutcome,
};
pub use handle::{ClusterObject, ObjectHandle};
pub use kube_client::KubeClusterClient;
pub use patch::{compute_patch, ObjectPatch, PatchStrategy};
pub use scheme::RegisteredKind;
pub use source::{is_reference, read_reference};
