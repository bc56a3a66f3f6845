use std::path::Path;

use tracing::{debug, warn};

use crate::errors::AgentError;
use super::credentials::resolve_api_key;
use super::schema::CONFIG_SCHEMA;
use super::types::GitMentorConfig;

const MAX_CONFIG_BYTES: u64 = 1_048_576;

pub async fn parse_config(path: &Path) -> Result<GitMentorConfig, AgentError> {
    if !path.exists() {
        return Err(AgentError::Config(format!("Config file not found: {}", path.display())));
    }

    let metadata = tokio::fs::metadata(path).await?;
    if metadata.len() > MAX_CONFIG_BYTES {
        return Err(AgentError::Config("Config file exceeds 1MB limit".into()));
    }

    let content = tokio::fs::read_to_string(path).await?;
    let config = parse_config_str(&content)?;
    debug!(path = %path.display(), agents = config.agents.len(), "Config loaded");
    Ok(config)
}

/// Parse, schema-check, resolve API keys and validate a YAML document.
pub fn parse_config_str(content: &str) -> Result<GitMentorConfig, AgentError> {
    let yaml: serde_yaml::Value = serde_yaml::from_str(content)?;
    // An empty document means all defaults.
    let yaml = match yaml {
        serde_yaml::Value::Null => serde_yaml::Value::Mapping(Default::default()),
        other => other,
    };

    validate_schema(&yaml)?;

    let mut config: GitMentorConfig = serde_yaml::from_value(yaml)?;
    resolve_client_keys(&mut config);
    config.validate()?;
    Ok(config)
}

fn validate_schema(yaml: &serde_yaml::Value) -> Result<(), AgentError> {
    let json_value = serde_json::to_value(yaml)
        .map_err(|e| AgentError::Config(format!("Config conversion error: {}", e)))?;

    let compiled = jsonschema::JSONSchema::compile(&CONFIG_SCHEMA)
        .map_err(|e| AgentError::Config(format!("Schema compilation error: {}", e)))?;

    if let Err(errors) = compiled.validate(&json_value) {
        let messages: Vec<String> = errors
            .map(|e| format!("{} at {}", e, e.instance_path))
            .collect();
        return Err(AgentError::Config(format!("Invalid config: {}", messages.join("; "))));
    }
    Ok(())
}

fn resolve_client_keys(config: &mut GitMentorConfig) {
    for client in &mut config.llm.clients {
        client.api_key = resolve_api_key(client.api_key.as_deref());
        if client.api_key.is_none() && client.provider != "local" {
            warn!(client = %client.name, "No API key configured for LLM client");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = parse_config_str("").unwrap();
        assert_eq!(config.manager.workers, 2);
        assert_eq!(config.pipeline.approval_threshold, 0.85);
    }

    #[test]
    fn test_schema_rejects_bad_threshold() {
        let err = parse_config_str("pipeline:\n  approval_threshold: 1.5\n").unwrap_err();
        assert!(err.to_string().contains("Invalid config"));
    }

    #[test]
    fn test_schema_rejects_agent_without_type() {
        let err = parse_config_str("agents:\n  - id: a1\n").unwrap_err();
        assert!(matches!(err, AgentError::Config(_)));
    }

    #[test]
    fn test_env_reference_in_api_key() {
        std::env::set_var("TEST_GITMENTOR_PARSER_KEY", "sk-from-env");
        let config = parse_config_str(
            "llm:\n  clients:\n    - name: primary\n      api_key: $TEST_GITMENTOR_PARSER_KEY\n",
        )
        .unwrap();
        std::env::remove_var("TEST_GITMENTOR_PARSER_KEY");
        assert_eq!(config.llm.clients[0].api_key.as_deref(), Some("sk-from-env"));
    }

    #[tokio::test]
    async fn test_parse_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "manager:\n  workers: 3\ncache:\n  enabled: false").unwrap();
        let config = parse_config(file.path()).await.unwrap();
        assert_eq!(config.manager.workers, 3);
        assert!(!config.cache.enabled);
    }

    #[tokio::test]
    async fn test_missing_file() {
        let err = parse_config(Path::new("/nonexistent/gitmentor.yaml")).await.unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
