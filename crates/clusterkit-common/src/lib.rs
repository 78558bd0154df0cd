//! Common types for clusterkit: errors, retry policy, YAML parsing and
//! kube client construction

#![deny(missing_docs)]

pub mod error;
pub mod kube_utils;
pub mod retry;
pub mod yaml;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Field manager name sent with every create and patch request
pub const FIELD_MANAGER: &str = "clusterkit";

/// Annotation holding the last desired document applied by clusterkit.
///
/// Used as the "original" side of three-way patch computation so fields
/// added by the API server are never deleted.
pub const LAST_APPLIED_ANNOTATION: &str = "clusterkit.io/last-applied";
