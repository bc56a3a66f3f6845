use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::AgentError;

pub type JsonMap = Map<String, Value>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentInput {
    pub task_id: String,
    pub data: JsonMap,
    pub context: JsonMap,
    pub metadata: JsonMap,
}

impl AgentInput {
    pub fn new(task_id: impl Into<String>, data: JsonMap) -> Self {
        Self {
            task_id: task_id.into(),
            data,
            context: JsonMap::new(),
            metadata: JsonMap::new(),
        }
    }

    pub fn with_context(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.context.insert(key.to_string(), value.into());
        self
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStatus {
    Success,
    Error,
}

/// Result of one agent invocation.
///
/// `status == Error` always comes with an `error_message` and zero confidence;
/// build error outputs through [`AgentOutput::failure`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentOutput {
    pub task_id: String,
    pub result: JsonMap,
    pub confidence: f64,
    pub processing_time: f64,
    pub metadata: JsonMap,
    pub status: OutputStatus,
    pub error_message: Option<String>,
}

impl AgentOutput {
    pub fn success(task_id: impl Into<String>, result: JsonMap, confidence: f64) -> Self {
        Self {
            task_id: task_id.into(),
            result,
            confidence: confidence.clamp(0.0, 1.0),
            processing_time: 0.0,
            metadata: JsonMap::new(),
            status: OutputStatus::Success,
            error_message: None,
        }
    }

    pub fn failure(task_id: impl Into<String>, message: impl Into<String>, processing_time: f64) -> Self {
        let mut metadata = JsonMap::new();
        metadata.insert("error".to_string(), Value::Bool(true));
        Self {
            task_id: task_id.into(),
            result: JsonMap::new(),
            confidence: 0.0,
            processing_time,
            metadata,
            status: OutputStatus::Error,
            error_message: Some(message.into()),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == OutputStatus::Success
    }

    /// Turn an error-flavored output back into an `AgentError`, so callers
    /// that retry on failure can tell transient from permanent causes.
    pub fn into_result(self) -> Result<AgentOutput, AgentError> {
        if self.is_success() {
            return Ok(self);
        }
        let retryable = self
            .metadata
            .get("retryable")
            .and_then(Value::as_bool)
            .unwrap_or(true);
        Err(AgentError::AgentProcessing {
            message: self.error_message.unwrap_or_else(|| "agent returned an error".to_string()),
            retryable,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Idle,
    Processing,
    Error,
    Stopped,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Processing => "processing",
            Self::Error => "error",
            Self::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentMetrics {
    pub total_tasks: u64,
    pub successful_tasks: u64,
    pub failed_tasks: u64,
    pub total_processing_time: f64,
    pub average_confidence: f64,
}

impl AgentMetrics {
    pub fn record(&mut self, output: &AgentOutput) {
        self.total_tasks += 1;
        if output.is_success() {
            self.successful_tasks += 1;
            let n = self.successful_tasks as f64;
            self.average_confidence = (self.average_confidence * (n - 1.0) + output.confidence) / n;
        } else {
            self.failed_tasks += 1;
        }
        self.total_processing_time += output.processing_time;
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_tasks == 0 {
            return 0.0;
        }
        self.successful_tasks as f64 / self.total_tasks as f64
    }

    pub fn average_processing_time(&self) -> f64 {
        if self.total_tasks == 0 {
            return 0.0;
        }
        self.total_processing_time / self.total_tasks as f64
    }
}

/// Point-in-time view of one agent, as returned by `get_status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStatusReport {
    pub agent_id: String,
    pub agent_type: String,
    pub status: AgentStatus,
    pub capabilities: Vec<String>,
    pub total_tasks: u64,
    pub success_rate: f64,
    pub average_processing_time: f64,
    pub average_confidence: f64,
    pub config_version: String,
}
