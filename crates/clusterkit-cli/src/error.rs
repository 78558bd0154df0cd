//! Error types for the CLI

use std::path::PathBuf;

use clusterkit_resources::ApplyErrors;

/// CLI Result type
pub type Result<T> = std::result::Result<T, Error>;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Cluster or reconcile failure from the core crates
    #[error(transparent)]
    Cluster(#[from] clusterkit_common::Error),

    /// One or more resources failed to apply or render
    #[error("{0}")]
    Resources(#[from] ApplyErrors),

    /// Local filesystem failure
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file could not be read or parsed
    #[error("invalid config {path}: {message}")]
    Config { path: PathBuf, message: String },

    /// Invalid input outside the config file
    #[error("validation error: {message}")]
    Validation { message: String },
}

impl Error {
    /// Config error for `path`
    pub fn config(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Error::Config {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_name_the_file() {
        let err = Error::config("cluster.yaml", "bad indent");
        assert_eq!(err.to_string(), "invalid config cluster.yaml: bad indent");
    }

    #[test]
    fn core_errors_display_unchanged() {
        let core = clusterkit_common::Error::internal("boom");
        let expected = core.to_string();
        assert_eq!(Error::from(core).to_string(), expected);
    }
}
