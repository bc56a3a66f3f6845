use serde::{Deserialize, Serialize};

use crate::agents::JsonMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMResponse {
    pub content: String,
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    pub model: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionOptions {
    pub max_tokens: u32,
    pub temperature: f64,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self { max_tokens: 1000, temperature: 0.3 }
    }
}

impl CompletionOptions {
    /// Read `max_tokens` / `temperature` from an agent config, falling back to the given defaults.
    pub fn from_config(config: &JsonMap, default_max_tokens: u32, default_temperature: f64) -> Self {
        Self {
            max_tokens: config
                .get("max_tokens")
                .and_then(|v| v.as_u64())
                .map(|v| v as u32)
                .unwrap_or(default_max_tokens),
            temperature: config
                .get("temperature")
                .and_then(|v| v.as_f64())
                .unwrap_or(default_temperature),
        }
    }
}
