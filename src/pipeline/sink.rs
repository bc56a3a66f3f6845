use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agents::extract::str_field;
use crate::agents::JsonMap;
use crate::errors::AgentError;

/// Final artifact of a decided submission, handed to a [`StorageSink`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub task_id: String,
    pub commit_hash: String,
    pub approved: bool,
    pub overall_score: f64,
    pub payload: JsonMap,
    pub analysis: JsonMap,
    pub review: JsonMap,
    pub created_at: DateTime<Utc>,
}

impl AnalysisRecord {
    pub fn new(task_id: &str, payload: &JsonMap, analysis: &JsonMap, review: &JsonMap, approved: bool) -> Self {
        Self {
            task_id: task_id.to_string(),
            commit_hash: str_field(payload, "hash").to_string(),
            approved,
            overall_score: review.get("overall_score").and_then(|v| v.as_f64()).unwrap_or(0.0),
            payload: payload.clone(),
            analysis: analysis.clone(),
            review: review.clone(),
            created_at: Utc::now(),
        }
    }
}

/// Destination for decided submissions. A failure here is reported on the
/// submission but never changes its decision.
#[async_trait]
pub trait StorageSink: Send + Sync {
    async fn store_approved(&self, record: &AnalysisRecord) -> Result<(), AgentError>;
    async fn store_rejected(&self, record: &AnalysisRecord) -> Result<(), AgentError>;
}

/// In-process sink, used when no database is configured.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    records: Mutex<Vec<AnalysisRecord>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn approved(&self) -> Vec<AnalysisRecord> {
        self.filtered(true)
    }

    pub fn rejected(&self) -> Vec<AnalysisRecord> {
        self.filtered(false)
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn filtered(&self, approved: bool) -> Vec<AnalysisRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|r| r.approved == approved)
            .cloned()
            .collect()
    }

    fn push(&self, record: &AnalysisRecord) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
    }
}

#[async_trait]
impl StorageSink for MemoryStorage {
    async fn store_approved(&self, record: &AnalysisRecord) -> Result<(), AgentError> {
        self.push(record);
        Ok(())
    }

    async fn store_rejected(&self, record: &AnalysisRecord) -> Result<(), AgentError> {
        self.push(record);
        Ok(())
    }
}
