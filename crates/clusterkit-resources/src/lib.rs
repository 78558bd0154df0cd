//! Cluster resources for clusterkit
//!
//! Named manifest templates ([`ResourceRegistry`]), the per-platform
//! defaults ([`DefaultCatalog`]), ordered [`ResourceSet`]s with their
//! rendering data, and the [`Applier`] that reconciles a set against a
//! cluster.

#![deny(missing_docs)]

pub mod apply;
pub mod catalog;
pub mod errors;
pub mod registry;
pub mod set;
pub mod status;
pub mod template;

pub use apply::{Applier, ApplyReport};
pub use catalog::{DefaultCatalog, DEFAULT_BUCKET};
pub use errors::{ApplyErrors, ResourceFailure};
pub use registry::ResourceRegistry;
pub use set::{Origin, Resource, ResourceSet};
pub use status::{StatusNotifier, StillWorking, TaskAction, TracingNotifier};
pub use template::{Renderer, TemplateError};
