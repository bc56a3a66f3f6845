use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::agents::{JsonMap, ManagerConfig};
use crate::cache::CacheConfig;
use crate::errors::AgentError;
use crate::pipeline::PipelineConfig;
use super::credentials::redact_secret;

/// Top-level `gitmentor.yaml`.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GitMentorConfig {
    pub manager: ManagerConfig,
    pub pipeline: PipelineConfig,
    pub cache: CacheConfig,
    pub llm: LLMConfig,
    pub agents: Vec<AgentSpec>,
    pub storage: StorageConfig,
    /// Directory of `<template>.txt` files overriding the built-in prompts.
    pub prompts_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct LLMConfig {
    pub clients: Vec<LLMClientConfig>,
}

impl LLMConfig {
    pub fn client(&self, name: &str) -> Option<&LLMClientConfig> {
        self.clients.iter().find(|c| c.name == name)
    }
}

#[derive(Clone, Deserialize, Serialize)]
pub struct LLMClientConfig {
    pub name: String,
    #[serde(default = "default_provider")]
    pub provider: String,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}

fn default_provider() -> String {
    "openai".to_string()
}

impl std::fmt::Debug for LLMClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LLMClientConfig")
            .field("name", &self.name)
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_deref().map(redact_secret))
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// One agent instance to create at startup.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AgentSpec {
    pub id: String,
    #[serde(rename = "type")]
    pub agent_type: String,
    #[serde(default)]
    pub config: JsonMap,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite file; decided submissions stay in memory when unset.
    pub database: Option<PathBuf>,
}

impl GitMentorConfig {
    /// Cross-section checks that serde cannot express.
    pub fn validate(&self) -> Result<(), AgentError> {
        self.manager.validate()?;
        self.pipeline.validate()?;

        if self.cache.enabled && self.cache.max_size == 0 {
            return Err(AgentError::Config("cache.max_size must be positive when the cache is enabled".into()));
        }

        let mut clients = HashSet::new();
        for client in &self.llm.clients {
            if client.name.trim().is_empty() {
                return Err(AgentError::Config("llm client names must not be empty".into()));
            }
            if !clients.insert(client.name.as_str()) {
                return Err(AgentError::Config(format!("Duplicate llm client: {}", client.name)));
            }
        }

        let mut ids = HashSet::new();
        for agent in &self.agents {
            if agent.id.trim().is_empty() {
                return Err(AgentError::Config("agent ids must not be empty".into()));
            }
            if !ids.insert(agent.id.as_str()) {
                return Err(AgentError::Config(format!("Duplicate agent id: {}", agent.id)));
            }
            if let Some(client) = agent.config.get("llm_client").and_then(|v| v.as_str()) {
                if !clients.contains(client) {
                    return Err(AgentError::Config(format!(
                        "Agent '{}' refers to unknown llm client '{}'",
                        agent.id, client
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
manager:
  workers: 4
pipeline:
  approval_threshold: 0.8
llm:
  clients:
    - name: primary
      model: gpt-4o-mini
      api_key: sk-test-123456
agents:
  - id: analyzer-1
    type: analyzer
    config:
      llm_client: primary
      prompt_template: git_commit_analyzer
  - id: reviewer-1
    type: reviewer
    config:
      llm_client: primary
      prompt_template: quality_reviewer
"#;

    #[test]
    fn test_parse_sample_config() {
        let config: GitMentorConfig = serde_yaml::from_str(SAMPLE).unwrap();
        assert_eq!(config.manager.workers, 4);
        assert_eq!(config.manager.queue_capacity, 100);
        assert_eq!(config.pipeline.approval_threshold, 0.8);
        assert_eq!(config.llm.clients[0].provider, "openai");
        assert_eq!(config.agents[1].agent_type, "reviewer");
        assert!(config.cache.enabled);
        assert!(config.storage.database.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_config_is_valid() {
        let config = GitMentorConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_duplicate_agent_ids_rejected() {
        let mut config: GitMentorConfig = serde_yaml::from_str(SAMPLE).unwrap();
        config.agents[1].id = "analyzer-1".into();
        assert!(config.validate().unwrap_err().to_string().contains("Duplicate agent id"));
    }

    #[test]
    fn test_unknown_llm_client_rejected() {
        let mut config: GitMentorConfig = serde_yaml::from_str(SAMPLE).unwrap();
        config.llm.clients[0].name = "other".into();
        assert!(config.validate().unwrap_err().to_string().contains("unknown llm client"));
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let config: GitMentorConfig = serde_yaml::from_str(SAMPLE).unwrap();
        let rendered = format!("{:?}", config.llm.clients[0]);
        assert!(!rendered.contains("sk-test-123456"));
    }
}
