use crate::errors::AgentError;
use super::openai::OpenAIProvider;
use super::provider::LLMProvider;

/// Build a completion client. `name` is the client name agents refer to
/// through their `llm_client` config key.
pub fn create_provider(
    name: &str,
    provider: &str,
    api_key: &str,
    model: Option<&str>,
    base_url: Option<&str>,
) -> Result<Box<dyn LLMProvider>, AgentError> {
    match provider {
        "openai" => match base_url {
            Some(url) => Ok(Box::new(OpenAIProvider::with_base_url(name, api_key, model, url))),
            None => Ok(Box::new(OpenAIProvider::new(name, api_key, model))),
        },
        "local" => {
            let url = base_url.unwrap_or("http://localhost:11434/v1");
            Ok(Box::new(OpenAIProvider::with_base_url(name, api_key, model, url)))
        }
        "openai_compatible" => {
            let url = base_url.ok_or_else(|| {
                AgentError::Config(format!("LLM client '{}' needs a base_url for openai_compatible", name))
            })?;
            Ok(Box::new(OpenAIProvider::with_base_url(name, api_key, model, url)))
        }
        _ => Err(AgentError::Config(format!("Unknown LLM provider: {}", provider))),
    }
}
