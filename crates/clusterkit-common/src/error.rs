//! Error types for clusterkit
//!
//! Errors carry the object or resource they refer to so a failed apply can
//! be attributed without re-running it. The variants follow the failure
//! classes the reconcile loop distinguishes: not-found drives the
//! create-versus-patch branch, transient failures are retried, and
//! deterministic failures (serialization, conversion, rendering, unknown
//! resource names) are surfaced immediately.

use std::path::PathBuf;

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for clusterkit operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error that is neither a not-found nor a conflict
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// The object does not exist on the cluster
    #[error("{object} not found")]
    NotFound {
        /// Human readable object reference (e.g. `Deployment kube-system/opa`)
        object: String,
    },

    /// Optimistic concurrency conflict or "already exists" race
    #[error("conflict on {object}: {message}")]
    Conflict {
        /// Human readable object reference
        object: String,
        /// Message returned by the API server
        message: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The resource kind being serialized (if known)
        kind: Option<String>,
    },

    /// The desired object could not be converted to its registered type
    #[error("converting {gvk}: {message}")]
    Conversion {
        /// Group/version/kind of the object
        gvk: String,
        /// Description of what failed
        message: String,
    },

    /// Template rendering failed (missing variable, syntax error, helper failure)
    #[error("failed rendering resource {resource}: {message}")]
    Render {
        /// Name of the resource being rendered
        resource: String,
        /// Description of what failed
        message: String,
    },

    /// A resource name is neither a known template nor a file/URL reference
    #[error("unknown resource template with name {name:?}. If it is a file, use the prefix 'file://', 'http://' or 'https://'")]
    UnknownResource {
        /// The unrecognized name
        name: String,
    },

    /// Local filesystem error
    #[error("io error on {}: {source}", path.display())]
    Io {
        /// Path that was being read or written
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Fetching a remote manifest failed
    #[error("fetching {url}: {message}")]
    Fetch {
        /// URL being fetched
        url: String,
        /// Description of what failed
        message: String,
    },

    /// The object was written but a follow-up read could not observe it
    #[error("{object} applied but not found on the cluster")]
    NotObservable {
        /// Human readable object reference
        object: String,
    },

    /// One or more objects of a multi-object manifest failed
    #[error("{} object(s) from {source_name} failed: {}", errors.len(), join_errors(errors))]
    Objects {
        /// The resource or file the objects were read from
        source_name: String,
        /// Every per-object failure, in stream order
        errors: Vec<Error>,
    },

    /// The operation was cancelled by the caller
    #[error("{operation} cancelled")]
    Cancelled {
        /// Name of the cancelled operation
        operation: String,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g. "create_client", "discovery")
        context: String,
    },
}

fn join_errors(errors: &[Error]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl Error {
    /// Map a kube-rs error for the given object into the clusterkit taxonomy.
    ///
    /// 404 becomes [`Error::NotFound`], 409 becomes [`Error::Conflict`];
    /// everything else stays a [`Error::Kube`].
    pub fn from_kube(source: kube::Error, object: impl Into<String>) -> Self {
        match &source {
            kube::Error::Api(ae) if ae.code == 404 => Self::NotFound {
                object: object.into(),
            },
            kube::Error::Api(ae) if ae.code == 409 => Self::Conflict {
                object: object.into(),
                message: ae.message.clone(),
            },
            _ => Self::Kube { source },
        }
    }

    /// Create a not-found error for the given object reference
    pub fn not_found(object: impl Into<String>) -> Self {
        Self::NotFound {
            object: object.into(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: None,
        }
    }

    /// Create a serialization error with resource kind context
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Create a render error for the named resource
    pub fn render(resource: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Render {
            resource: resource.into(),
            message: msg.into(),
        }
    }

    /// Create an I/O error for the given path
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: UNKNOWN_CONTEXT.to_string(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Returns true if this is a not-found condition
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    /// Check if this error is retryable
    ///
    /// Serialization, conversion, render and naming errors are local and
    /// never retried. Every Kubernetes client error is retried, including
    /// API rejections: admission webhooks and CRDs that are still being
    /// installed answer 4xx until they settle.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { .. } => true,
            Error::NotFound { .. } => true,
            Error::Conflict { .. } => true,
            Error::Serialization { .. } => false,
            Error::Conversion { .. } => false,
            Error::Render { .. } => false,
            Error::UnknownResource { .. } => false,
            Error::Io { .. } => true,
            Error::Fetch { .. } => true,
            Error::NotObservable { .. } => true,
            Error::Objects { errors, .. } => errors.iter().any(Error::is_retryable),
            Error::Cancelled { .. } => false,
            Error::Internal { .. } => true,
        }
    }

    /// Get the context if this error has one
    pub fn context(&self) -> Option<&str> {
        match self {
            Error::Internal { context, .. } => Some(context),
            _ => None,
        }
    }
}
