//! Error types for the Infisical provider.

use thiserror::Error;

use crate::client::ApiError;
use crate::schema::Diagnostic;

/// Errors that can occur while handling a provider operation.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The requested resource was not found.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// A validation error occurred.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A configuration error occurred.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The configured authentication strategy cannot perform this operation.
    #[error("Unsupported authentication method: {0}")]
    Capability(String),

    /// The requested resource type is unknown.
    #[error("Unknown resource type: {0}")]
    UnknownResource(String),

    /// The Infisical API rejected a call.
    #[error("{context}: {source}")]
    Api {
        /// Which operation on which resource failed.
        context: String,
        /// The underlying client error.
        #[source]
        source: ApiError,
    },

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Operation not implemented.
    #[error("Unimplemented: {0}")]
    Unimplemented(String),

    /// Invalid request from the host.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ProviderError {
    /// Wrap an API error with the operation and resource it came from.
    pub fn api(context: impl Into<String>, source: ApiError) -> Self {
        Self::Api {
            context: context.into(),
            source,
        }
    }

    /// Get the error message as a string.
    pub fn message(&self) -> &str {
        match self {
            Self::NotFound(msg) => msg,
            Self::Validation(msg) => msg,
            Self::Configuration(msg) => msg,
            Self::Capability(msg) => msg,
            Self::UnknownResource(msg) => msg,
            Self::Api { context, .. } => context,
            Self::Serialization(_err) => "serialization error (see Debug output)",
            Self::Unimplemented(msg) => msg,
            Self::InvalidRequest(msg) => msg,
        }
    }

    /// Whether this error wraps the API's not-found sentinel.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Api { source, .. } => source.is_not_found(),
            _ => false,
        }
    }
}

impl From<ProviderError> for Diagnostic {
    fn from(err: ProviderError) -> Self {
        let summary = match &err {
            ProviderError::Api { .. } => "Infisical API error",
            ProviderError::Validation(_) => "Invalid configuration",
            ProviderError::Capability(_) => "Unsupported authentication method",
            ProviderError::Configuration(_) => "Provider not configured",
            ProviderError::NotFound(_) => "Resource not found",
            _ => "Provider error",
        };
        Diagnostic::error(summary).with_detail(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::DiagnosticSeverity;

    #[test]
    fn test_error_display() {
        let err = ProviderError::NotFound("identity-123".to_string());
        assert_eq!(format!("{}", err), "Resource not found: identity-123");

        let err = ProviderError::Validation("invalid input".to_string());
        assert_eq!(format!("{}", err), "Validation error: invalid input");

        let err = ProviderError::UnknownResource("infisical_secret".to_string());
        assert_eq!(format!("{}", err), "Unknown resource type: infisical_secret");
    }

    #[test]
    fn test_api_error_keeps_context() {
        let err = ProviderError::api(
            "Error creating group",
            ApiError::Status {
                status: 400,
                message: "slug already taken".to_string(),
            },
        );
        assert_eq!(err.message(), "Error creating group");
        let rendered = err.to_string();
        assert!(rendered.starts_with("Error creating group: "));
        assert!(rendered.contains("slug already taken"));
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_not_found_detection() {
        assert!(ProviderError::NotFound("x".to_string()).is_not_found());
        assert!(ProviderError::api("Error reading", ApiError::NotFound("x".to_string()))
            .is_not_found());
        assert!(!ProviderError::Validation("x".to_string()).is_not_found());
    }

    #[test]
    fn test_message_method() {
        let err = ProviderError::Capability("only machine identities".to_string());
        assert_eq!(err.message(), "only machine identities");

        let err = ProviderError::Configuration("invalid config".to_string());
        assert_eq!(err.message(), "invalid config");

        let err = ProviderError::InvalidRequest("bad request".to_string());
        assert_eq!(err.message(), "bad request");
    }

    #[test]
    fn test_into_diagnostic() {
        let diagnostic: Diagnostic =
            ProviderError::Validation("Must have at least one permanent role".to_string()).into();
        assert_eq!(diagnostic.severity, DiagnosticSeverity::Error);
        assert_eq!(diagnostic.summary, "Invalid configuration");
        assert_eq!(
            diagnostic.detail.as_deref(),
            Some("Validation error: Must have at least one permanent role")
        );
    }
}
