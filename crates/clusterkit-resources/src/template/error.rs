//! Template error types

use std::fmt;

use clusterkit_common::Error;

/// Errors that can occur while rendering a resource template
#[derive(Debug)]
pub enum TemplateError {
    /// Template syntax, undefined variable or helper failure
    Render(minijinja::Error),
    /// The resource is not part of the set being rendered
    NotFound(String),
}

impl TemplateError {
    /// Attach the resource name and convert into the crate-wide error
    pub fn into_error(self, resource: &str) -> Error {
        match self {
            Self::Render(e) => Error::render(resource, render_message(&e)),
            Self::NotFound(name) => Error::UnknownResource { name },
        }
    }
}

/// Error text with the chain of helper failures appended
fn render_message(err: &minijinja::Error) -> String {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

impl fmt::Display for TemplateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Render(e) => write!(f, "template render error: {}", e),
            Self::NotFound(name) => write!(f, "not found resource named {:?}", name),
        }
    }
}

impl std::error::Error for TemplateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Render(e) => Some(e),
            Self::NotFound(_) => None,
        }
    }
}

impl From<minijinja::Error> for TemplateError {
    fn from(err: minijinja::Error) -> Self {
        Self::Render(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_errors_become_non_retryable_render_errors() {
        let err = TemplateError::from(minijinja::Error::new(
            minijinja::ErrorKind::UndefinedError,
            "undefined value",
        ));
        let err = err.into_error("open-policy-agent");
        assert!(matches!(err, Error::Render { ref resource, .. } if resource == "open-policy-agent"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn not_found_display_names_the_resource() {
        let err = TemplateError::NotFound("ghost".to_string());
        assert!(err.to_string().contains("\"ghost\""));
    }
}
