use serde_json::{json, Value};
use std::sync::LazyLock;

/// Structural schema for `gitmentor.yaml`. Per-agent config maps are checked
/// separately by each agent type.
pub static CONFIG_SCHEMA: LazyLock<Value> = LazyLock::new(|| {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "properties": {
            "manager": {
                "type": "object",
                "properties": {
                    "workers": { "type": "integer", "minimum": 1 },
                    "queue_capacity": { "type": "integer", "minimum": 1 },
                    "poll_interval_ms": { "type": "integer", "minimum": 1 },
                    "error_backoff_ms": { "type": "integer", "minimum": 0 }
                }
            },
            "pipeline": {
                "type": "object",
                "properties": {
                    "approval_threshold": { "type": "number", "minimum": 0, "maximum": 1 },
                    "producer_capability": { "type": "string", "minLength": 1 },
                    "reviewer_capability": { "type": "string", "minLength": 1 },
                    "result_retention_hours": { "type": "integer", "minimum": 0 },
                    "retry_policy": {
                        "type": "object",
                        "properties": {
                            "max_retries": { "type": "integer", "minimum": 0 },
                            "base_delay_secs": { "type": "number", "exclusiveMinimum": 0 },
                            "max_delay_secs": { "type": "number", "exclusiveMinimum": 0, "maximum": 86400 },
                            "exponential_base": { "type": "number", "minimum": 1 },
                            "jitter": { "type": "number", "minimum": 0, "maximum": 1 }
                        }
                    }
                }
            },
            "cache": {
                "type": "object",
                "properties": {
                    "enabled": { "type": "boolean" },
                    "max_size": { "type": "integer", "minimum": 0 },
                    "default_ttl_secs": { "type": "integer", "minimum": 0 },
                    "analysis_ttl_secs": { "type": "integer", "minimum": 0 }
                }
            },
            "llm": {
                "type": "object",
                "properties": {
                    "clients": { "type": "array", "items": { "$ref": "#/$defs/client" } }
                }
            },
            "agents": { "type": "array", "items": { "$ref": "#/$defs/agent" } },
            "storage": {
                "type": "object",
                "properties": {
                    "database": { "type": ["string", "null"] }
                }
            },
            "prompts_dir": { "type": ["string", "null"] }
        },
        "$defs": {
            "client": {
                "type": "object",
                "required": ["name"],
                "properties": {
                    "name": { "type": "string", "minLength": 1 },
                    "provider": { "type": "string", "enum": ["openai", "local", "openai_compatible"] },
                    "model": { "type": "string" },
                    "api_key": { "type": "string" },
                    "base_url": { "type": "string" }
                }
            },
            "agent": {
                "type": "object",
                "required": ["id", "type"],
                "properties": {
                    "id": { "type": "string", "minLength": 1 },
                    "type": { "type": "string", "minLength": 1 },
                    "config": { "type": "object" }
                }
            }
        }
    })
});
