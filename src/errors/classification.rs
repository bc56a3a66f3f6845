use super::types::AgentError;

#[derive(Debug, Clone)]
pub struct ErrorClassification {
    pub error_type: &'static str,
    pub retryable: bool,
}

impl AgentError {
    /// Classify this error to determine its type and whether it can be retried.
    pub fn classify(&self) -> ErrorClassification {
        match self {
            // Retryable errors
            AgentError::Network(_) => ErrorClassification {
                error_type: "NetworkError",
                retryable: true,
            },
            AgentError::RateLimit(_) => ErrorClassification {
                error_type: "RateLimitError",
                retryable: true,
            },
            AgentError::Timeout(_) => ErrorClassification {
                error_type: "TimeoutError",
                retryable: true,
            },
            AgentError::LLMApi(_) => ErrorClassification {
                error_type: "LLMApiError",
                retryable: true,
            },
            AgentError::AgentUnavailable(_) => ErrorClassification {
                error_type: "AgentUnavailableError",
                retryable: true,
            },
            AgentError::AgentProcessing { retryable, .. } => ErrorClassification {
                error_type: "AgentProcessingError",
                retryable: *retryable,
            },
            AgentError::QueueFull(_) => ErrorClassification {
                error_type: "QueueFullError",
                retryable: true,
            },

            // Non-retryable errors
            AgentError::ConfigValidation(_) => ErrorClassification {
                error_type: "ConfigValidationError",
                retryable: false,
            },
            AgentError::UnknownAgentType(_) => ErrorClassification {
                error_type: "UnknownAgentTypeError",
                retryable: false,
            },
            AgentError::UnknownAgent(_) => ErrorClassification {
                error_type: "UnknownAgentError",
                retryable: false,
            },
            AgentError::UnknownTask(_) => ErrorClassification {
                error_type: "UnknownTaskError",
                retryable: false,
            },
            AgentError::UnknownCapability(_) => ErrorClassification {
                error_type: "UnknownCapabilityError",
                retryable: false,
            },
            AgentError::InvalidInput(_) => ErrorClassification {
                error_type: "InvalidInputError",
                retryable: false,
            },
            AgentError::InvalidRequest(_) => ErrorClassification {
                error_type: "InvalidRequestError",
                retryable: false,
            },
            AgentError::Authentication(_) => ErrorClassification {
                error_type: "AuthenticationError",
                retryable: false,
            },
            AgentError::Config(_) => ErrorClassification {
                error_type: "ConfigError",
                retryable: false,
            },
            AgentError::Prompt(_) => ErrorClassification {
                error_type: "PromptError",
                retryable: false,
            },
            AgentError::Shutdown => ErrorClassification {
                error_type: "ShutdownError",
                retryable: false,
            },
            AgentError::RetryExhausted { .. } => ErrorClassification {
                error_type: "RetryExhaustedError",
                retryable: false,
            },
            AgentError::Json(_) => ErrorClassification {
                error_type: "JsonError",
                retryable: false,
            },
            AgentError::Yaml(_) => ErrorClassification {
                error_type: "YamlError",
                retryable: false,
            },

            // Default: retryable
            AgentError::Storage(_) => ErrorClassification {
                error_type: "StorageError",
                retryable: true,
            },
            AgentError::Io(_) => ErrorClassification {
                error_type: "IoError",
                retryable: true,
            },
            AgentError::Database(_) => ErrorClassification {
                error_type: "DatabaseError",
                retryable: true,
            },
            AgentError::Internal(_) => ErrorClassification {
                error_type: "InternalError",
                retryable: true,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_error_retryable() {
        let class = AgentError::Network("connection refused".into()).classify();
        assert!(class.retryable);
        assert_eq!(class.error_type, "NetworkError");
    }

    #[test]
    fn test_rate_limit_is_retryable() {
        assert!(AgentError::RateLimit("too many requests".into()).classify().retryable);
    }

    #[test]
    fn test_config_validation_not_retryable() {
        let class = AgentError::ConfigValidation("missing llm_client".into()).classify();
        assert!(!class.retryable);
        assert_eq!(class.error_type, "ConfigValidationError");
    }

    #[test]
    fn test_invalid_input_not_retryable() {
        assert!(!AgentError::InvalidInput("no hash".into()).classify().retryable);
    }

    #[test]
    fn test_bad_request_not_retryable() {
        assert!(!AgentError::InvalidRequest("400".into()).classify().retryable);
    }

    #[test]
    fn test_processing_error_follows_flag() {
        let retryable = AgentError::AgentProcessing { message: "x".into(), retryable: true };
        let permanent = AgentError::AgentProcessing { message: "x".into(), retryable: false };
        assert!(retryable.classify().retryable);
        assert!(!permanent.classify().retryable);
    }

    #[test]
    fn test_unknown_capability_not_retryable() {
        assert!(!AgentError::UnknownCapability("commit_analysis".into()).classify().retryable);
    }
}
