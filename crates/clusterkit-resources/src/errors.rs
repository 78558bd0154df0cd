//! Per-resource failure aggregation

use std::fmt;

use clusterkit_common::Error;

/// One resource that failed, with its cause
#[derive(Debug)]
pub struct ResourceFailure {
    /// Resource name
    pub resource: String,
    /// Final error for the resource
    pub error: Error,
}

/// Failures collected while processing a resource set.
///
/// Displays as a header naming the operation followed by one tab-indented
/// `name: cause` line per failed resource.
#[derive(Debug)]
pub struct ApplyErrors {
    operation: &'static str,
    failures: Vec<ResourceFailure>,
}

impl ApplyErrors {
    /// Empty collection for the named operation ("apply", "export")
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            failures: Vec::new(),
        }
    }

    /// Record a failure
    pub fn add(&mut self, resource: impl Into<String>, error: Error) {
        self.failures.push(ResourceFailure {
            resource: resource.into(),
            error,
        });
    }

    /// Whether nothing failed
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// Recorded failures in the order they happened
    pub fn failures(&self) -> &[ResourceFailure] {
        &self.failures
    }

    /// Names of the failed resources
    pub fn resources(&self) -> impl Iterator<Item = &str> {
        self.failures.iter().map(|f| f.resource.as_str())
    }

    /// `Ok(())` when empty, otherwise `Err(self)`
    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ApplyErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to {} the following resources:", self.operation)?;
        for failure in &self.failures {
            write!(f, "\n\t{}: {}", failure.resource, failure.error)?;
        }
        Ok(())
    }
}

impl std::error::Error for ApplyErrors {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_each_failure_on_its_own_indented_line() {
        let mut errors = ApplyErrors::new("apply");
        errors.add("rook-operator", Error::internal("connection refused"));
        errors.add(
            "aws-auth",
            Error::render("aws-auth", "undefined value"),
        );

        let text = errors.to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "failed to apply the following resources:");
        assert!(lines[1].starts_with("\trook-operator: "));
        assert!(lines[2].starts_with("\taws-auth: "));
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn empty_collection_is_ok() {
        assert!(ApplyErrors::new("export").into_result().is_ok());
    }

    #[test]
    fn keeps_failures_in_order() {
        let mut errors = ApplyErrors::new("export");
        errors.add("b", Error::internal("x"));
        errors.add("a", Error::internal("y"));
        assert_eq!(errors.resources().collect::<Vec<_>>(), vec!["b", "a"]);
        assert!(errors.into_result().is_err());
    }
}
