use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Config validation failed: {0}")]
    ConfigValidation(String),

    #[error("Unknown agent type: {0}")]
    UnknownAgentType(String),

    #[error("Agent not found: {0}")]
    UnknownAgent(String),

    #[error("Task not found: {0}")]
    UnknownTask(String),

    #[error("No agent advertises capability: {0}")]
    UnknownCapability(String),

    #[error("Agent unavailable: {0}")]
    AgentUnavailable(String),

    #[error("Agent processing failed: {message}")]
    AgentProcessing { message: String, retryable: bool },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{operation} failed after {attempts} attempts: {source}")]
    RetryExhausted {
        operation: String,
        attempts: u32,
        #[source]
        source: Box<AgentError>,
    },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Task queue is full (capacity {0})")]
    QueueFull(usize),

    #[error("Manager is shut down")]
    Shutdown,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limited: {0}")]
    RateLimit(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("LLM API error: {0}")]
    LLMApi(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Prompt error: {0}")]
    Prompt(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AgentError {
    /// Wrap a failure raised inside an agent's `process`, keeping the
    /// retryability of the underlying cause.
    pub fn processing(cause: AgentError) -> Self {
        if let AgentError::AgentProcessing { .. } = cause {
            return cause;
        }
        let retryable = cause.classify().retryable;
        AgentError::AgentProcessing {
            message: cause.to_string(),
            retryable,
        }
    }

    /// Innermost error for a `RetryExhausted` chain, or `self`.
    pub fn root_cause(&self) -> &AgentError {
        match self {
            AgentError::RetryExhausted { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_processing_keeps_validation_non_retryable() {
        let err = AgentError::processing(AgentError::InvalidInput("missing hash".into()));
        match err {
            AgentError::AgentProcessing { message, retryable } => {
                assert!(message.contains("missing hash"));
                assert!(!retryable);
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn test_processing_does_not_double_wrap() {
        let inner = AgentError::AgentProcessing { message: "boom".into(), retryable: true };
        let err = AgentError::processing(inner);
        assert_eq!(err.to_string(), "Agent processing failed: boom");
    }

    #[test]
    fn test_root_cause_unwraps_retry_exhausted() {
        let err = AgentError::RetryExhausted {
            operation: "analysis".into(),
            attempts: 4,
            source: Box::new(AgentError::Network("reset".into())),
        };
        assert!(matches!(err.root_cause(), AgentError::Network(_)));
        assert!(err.to_string().contains("after 4 attempts"));
    }
}
