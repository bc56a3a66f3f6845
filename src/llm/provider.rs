use async_trait::async_trait;
use crate::errors::AgentError;
use super::types::{CompletionOptions, LLMResponse};

/// External completion service used by the built-in agents.
///
/// Implementations must signal transient failures (`Network`, `RateLimit`,
/// `Timeout`, `LLMApi`) separately from permanent ones (`InvalidRequest`,
/// `Authentication`) so callers can decide whether to retry.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    async fn complete(
        &self,
        prompt: &str,
        system: Option<&str>,
        options: &CompletionOptions,
    ) -> Result<LLMResponse, AgentError>;

    /// Provider name for logging
    fn provider_name(&self) -> &str;

    /// Model identifier
    fn model_name(&self) -> &str;

    /// Cheap reachability probe used by agent health checks.
    async fn health_check(&self) -> bool {
        true
    }
}
