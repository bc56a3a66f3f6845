use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agents::JsonMap;
use crate::errors::{AgentError, RetryPolicy};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStatus {
    Pending,
    Analyzing,
    Reviewing,
    Approved,
    Rejected,
    Error,
}

impl ProcessStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Analyzing => "analyzing",
            Self::Reviewing => "reviewing",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected | Self::Error)
    }

    /// Only failed or rejected submissions may be resubmitted.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Rejected | Self::Error)
    }
}

impl std::fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProcessStatus {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "analyzing" => Ok(Self::Analyzing),
            "reviewing" => Ok(Self::Reviewing),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "error" => Ok(Self::Error),
            other => Err(AgentError::InvalidInput(format!("Unknown process status: {}", other))),
        }
    }
}

/// One submission tracked by the quality controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessResult {
    pub task_id: String,
    pub status: ProcessStatus,
    pub input_payload: JsonMap,
    pub produce_result: Option<JsonMap>,
    pub review_result: Option<JsonMap>,
    pub error_message: Option<String>,
    /// Set when the storage sink failed; the terminal status is kept.
    pub storage_error: Option<String>,
    pub retry_count: u32,
    pub retried_from: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ProcessResult {
    pub fn new(task_id: impl Into<String>, input_payload: JsonMap) -> Self {
        Self {
            task_id: task_id.into(),
            status: ProcessStatus::Pending,
            input_payload,
            produce_result: None,
            review_result: None,
            error_message: None,
            storage_error: None,
            retry_count: 0,
            retried_from: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn latency_secs(&self) -> Option<f64> {
        self.completed_at
            .map(|done| (done - self.created_at).num_milliseconds() as f64 / 1000.0)
    }

    pub fn overall_score(&self) -> Option<f64> {
        self.review_result.as_ref()?.get("overall_score")?.as_f64()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub approval_threshold: f64,
    pub producer_capability: String,
    pub reviewer_capability: String,
    pub retry_policy: RetryPolicy,
    /// Age after which finished submissions may be purged.
    pub result_retention_hours: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            approval_threshold: 0.85,
            producer_capability: "commit_analysis".to_string(),
            reviewer_capability: "quality_assessment".to_string(),
            retry_policy: RetryPolicy::default(),
            result_retention_hours: 24,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), AgentError> {
        if !(0.0..=1.0).contains(&self.approval_threshold) {
            return Err(AgentError::Config(format!(
                "pipeline.approval_threshold must be within [0, 1], got {}",
                self.approval_threshold
            )));
        }
        if self.producer_capability.is_empty() || self.reviewer_capability.is_empty() {
            return Err(AgentError::Config("pipeline capabilities must not be empty".into()));
        }
        self.retry_policy.validate()
    }
}
