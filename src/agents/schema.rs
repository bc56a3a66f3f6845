use serde_json::{json, Value};
use std::sync::LazyLock;

use crate::errors::AgentError;
use super::types::JsonMap;

fn common_properties() -> Value {
    json!({
        "llm_client": { "type": "string", "minLength": 1 },
        "prompt_template": { "type": "string", "minLength": 1 },
        "version": { "type": ["string", "number"] },
        "timeout": { "type": "number", "exclusiveMinimum": 0, "maximum": 86400 },
        "max_tokens": { "type": "integer", "minimum": 1 },
        "temperature": { "type": "number", "minimum": 0, "maximum": 2 },
        "system_prompt": { "type": "string" }
    })
}

pub static ANALYZER_CONFIG_SCHEMA: LazyLock<Value> = LazyLock::new(|| {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "required": ["llm_client", "prompt_template"],
        "properties": common_properties()
    })
});

pub static REVIEWER_CONFIG_SCHEMA: LazyLock<Value> = LazyLock::new(|| {
    let mut properties = common_properties();
    if let Value::Object(props) = &mut properties {
        props.insert(
            "approval_threshold".into(),
            json!({ "type": "number", "minimum": 0, "maximum": 1 }),
        );
        props.insert(
            "dimension_weights".into(),
            json!({
                "type": "object",
                "properties": {
                    "accuracy": { "type": "number", "minimum": 0 },
                    "completeness": { "type": "number", "minimum": 0 },
                    "consistency": { "type": "number", "minimum": 0 },
                    "clarity": { "type": "number", "minimum": 0 }
                },
                "additionalProperties": false
            }),
        );
    }
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "required": ["llm_client", "prompt_template"],
        "properties": properties
    })
});

/// Structural check of an agent config map. All violations are reported in one error.
pub fn validate_against(schema: &Value, agent_type: &str, config: &JsonMap) -> Result<(), AgentError> {
    let compiled = jsonschema::JSONSchema::compile(schema)
        .map_err(|e| AgentError::Internal(format!("Schema compilation error: {}", e)))?;

    let instance = Value::Object(config.clone());
    let messages: Vec<String> = match compiled.validate(&instance) {
        Ok(()) => return Ok(()),
        Err(errors) => errors
            .map(|e| {
                let path = e.instance_path.to_string();
                if path.is_empty() {
                    e.to_string()
                } else {
                    format!("{} at {}", e, path)
                }
            })
            .collect(),
    };

    Err(AgentError::ConfigValidation(format!(
        "{} config invalid: {}",
        agent_type,
        messages.join("; ")
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(v: Value) -> JsonMap {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_analyzer_schema_requires_fields() {
        let ok = map(json!({"llm_client": "openai", "prompt_template": "git_commit_analyzer"}));
        assert!(validate_against(&ANALYZER_CONFIG_SCHEMA, "analyzer", &ok).is_ok());

        let missing = map(json!({"llm_client": "openai"}));
        let err = validate_against(&ANALYZER_CONFIG_SCHEMA, "analyzer", &missing).unwrap_err();
        assert!(matches!(err, AgentError::ConfigValidation(ref m) if m.contains("prompt_template")));
    }

    #[test]
    fn test_reviewer_threshold_range() {
        let bad = map(json!({
            "llm_client": "openai",
            "prompt_template": "quality_reviewer",
            "approval_threshold": 1.5
        }));
        assert!(validate_against(&REVIEWER_CONFIG_SCHEMA, "reviewer", &bad).is_err());
    }

    #[test]
    fn test_reviewer_rejects_unknown_dimension() {
        let bad = map(json!({
            "llm_client": "openai",
            "prompt_template": "quality_reviewer",
            "dimension_weights": {"vibes": 0.5}
        }));
        assert!(validate_against(&REVIEWER_CONFIG_SCHEMA, "reviewer", &bad).is_err());
    }

    #[test]
    fn test_timeout_must_be_positive() {
        let bad = map(json!({"llm_client": "a", "prompt_template": "b", "timeout": 0}));
        assert!(validate_against(&ANALYZER_CONFIG_SCHEMA, "analyzer", &bad).is_err());

        let huge = map(json!({"llm_client": "a", "prompt_template": "b", "timeout": 1e20}));
        assert!(validate_against(&ANALYZER_CONFIG_SCHEMA, "analyzer", &huge).is_err());
    }
}
