use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::FutureExt;
use serde_json::{json, Value};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::agents::{AgentInput, AgentManager, AgentOutput, JsonMap, ManagedAgent};
use crate::cache::AnalysisCache;
use crate::errors::AgentError;
use crate::utils::truncation::truncate_error;
use super::metrics::{compute_statistics, compute_trends, PipelineStatistics, QualityTrends};
use super::sink::{AnalysisRecord, StorageSink};
use super::state::{PipelineConfig, ProcessResult, ProcessStatus};

/// Drives submissions through analysis, review and the approval decision.
///
/// Submissions are owned here; the agent manager, the cache and the storage
/// sink are shared collaborators.
pub struct QualityController {
    config: PipelineConfig,
    manager: Arc<AgentManager>,
    sink: Arc<dyn StorageSink>,
    cache: Option<Arc<AnalysisCache>>,
    results: RwLock<HashMap<String, ProcessResult>>,
    in_flight: DashMap<String, Arc<Mutex<()>>>,
}

impl QualityController {
    pub fn new(config: PipelineConfig, manager: Arc<AgentManager>, sink: Arc<dyn StorageSink>) -> Self {
        Self {
            config,
            manager,
            sink,
            cache: None,
            results: RwLock::new(HashMap::new()),
            in_flight: DashMap::new(),
        }
    }

    pub fn with_cache(mut self, cache: Arc<AnalysisCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn cache(&self) -> Option<&Arc<AnalysisCache>> {
        self.cache.as_ref()
    }

    /// Register a submission and drive it on a background task.
    /// Returns the new task id immediately.
    pub async fn submit(self: &Arc<Self>, payload: JsonMap) -> String {
        let task_id = self.register(ProcessResult::new(new_task_id(), payload.clone())).await;
        let controller = Arc::clone(self);
        let id = task_id.clone();
        tokio::spawn(async move {
            let driven = AssertUnwindSafe(controller.drive(&id, payload)).catch_unwind().await;
            if driven.is_err() {
                error!(task_id = %id, "Submission panicked");
                controller
                    .update(&id, |r| {
                        r.status = ProcessStatus::Error;
                        r.error_message = Some("submission panicked".to_string());
                        r.completed_at = Some(Utc::now());
                    })
                    .await;
            }
        });
        task_id
    }

    /// Run one submission to its terminal state.
    pub async fn process(&self, payload: JsonMap) -> ProcessResult {
        let task_id = self.register(ProcessResult::new(new_task_id(), payload.clone())).await;
        self.drive(&task_id, payload).await
    }

    /// Resubmit a rejected or failed submission as a brand-new one.
    pub async fn retry(&self, task_id: &str) -> Result<ProcessResult, AgentError> {
        let previous = self
            .get_result(task_id)
            .await
            .ok_or_else(|| AgentError::UnknownTask(task_id.to_string()))?;

        if !previous.status.is_retryable() {
            return Err(AgentError::InvalidInput(format!(
                "Task {} is {} and cannot be retried",
                task_id, previous.status
            )));
        }

        let mut fresh = ProcessResult::new(new_task_id(), previous.input_payload.clone());
        fresh.retry_count = previous.retry_count + 1;
        fresh.retried_from = Some(previous.task_id.clone());
        info!(task_id = %fresh.task_id, retried_from = %task_id, retry_count = fresh.retry_count, "Retrying submission");

        let new_id = self.register(fresh).await;
        Ok(self.drive(&new_id, previous.input_payload).await)
    }

    pub async fn get_result(&self, task_id: &str) -> Option<ProcessResult> {
        self.results.read().await.get(task_id).cloned()
    }

    /// Submissions oldest first, optionally restricted to one status.
    pub async fn list_results(&self, status: Option<ProcessStatus>) -> Vec<ProcessResult> {
        let mut results: Vec<ProcessResult> = self
            .results
            .read()
            .await
            .values()
            .filter(|r| status.map_or(true, |s| r.status == s))
            .cloned()
            .collect();
        results.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        results
    }

    pub async fn get_statistics(&self) -> PipelineStatistics {
        compute_statistics(self.results.read().await.values())
    }

    pub async fn quality_trends(&self, window: Duration) -> QualityTrends {
        compute_trends(self.results.read().await.values(), cutoff(window))
    }

    /// Drop finished submissions created more than `max_age` ago. Submissions
    /// still in flight are kept.
    pub async fn cleanup_old_results(&self, max_age: Duration) -> usize {
        let oldest_kept = cutoff(max_age);
        let mut results = self.results.write().await;
        let before = results.len();
        results.retain(|_, r| !(r.status.is_terminal() && r.created_at <= oldest_kept));
        let removed = before - results.len();
        if removed > 0 {
            info!(removed, "Cleaned up old submissions");
        }
        removed
    }

    /// `cleanup_old_results` with the configured retention window.
    pub async fn cleanup_expired_results(&self) -> usize {
        self.cleanup_old_results(Duration::from_secs(self.config.result_retention_hours * 3600))
            .await
    }

    async fn register(&self, result: ProcessResult) -> String {
        let task_id = result.task_id.clone();
        self.results.write().await.insert(task_id.clone(), result);
        debug!(task_id = %task_id, "Submission registered");
        task_id
    }

    async fn update<F: FnOnce(&mut ProcessResult)>(&self, task_id: &str, f: F) -> Option<ProcessResult> {
        let mut results = self.results.write().await;
        let result = results.get_mut(task_id)?;
        f(result);
        Some(result.clone())
    }

    async fn drive(&self, task_id: &str, payload: JsonMap) -> ProcessResult {
        info!(task_id, "Processing submission");
        let outcome = self.run_stages(task_id, &payload).await;

        let final_state = match outcome {
            Ok((status, produce, review)) => {
                let record = AnalysisRecord::new(
                    task_id,
                    &payload,
                    &produce.result,
                    &review.result,
                    status == ProcessStatus::Approved,
                );
                let stored = match status {
                    ProcessStatus::Approved => self.sink.store_approved(&record).await,
                    _ => self.sink.store_rejected(&record).await,
                };
                let storage_error = stored.err().map(|e| {
                    warn!(task_id, error = %e, "Failed to store decided submission");
                    e.to_string()
                });

                info!(
                    task_id,
                    status = %status,
                    overall_score = record.overall_score,
                    "Submission decided"
                );
                self.update(task_id, |r| {
                    r.status = status;
                    r.storage_error = storage_error;
                    r.completed_at = Some(Utc::now());
                })
                .await
            }
            Err(e) => {
                error!(task_id, error = %e, "Submission failed");
                self.update(task_id, |r| {
                    r.status = ProcessStatus::Error;
                    r.error_message = Some(truncate_error(&e.to_string()));
                    r.completed_at = Some(Utc::now());
                })
                .await
            }
        };

        // Only missing when a cleanup raced the run.
        final_state.unwrap_or_else(|| {
            let mut orphan = ProcessResult::new(task_id, payload);
            orphan.status = ProcessStatus::Error;
            orphan.error_message = Some("submission was purged while running".to_string());
            orphan.completed_at = Some(Utc::now());
            orphan
        })
    }

    async fn run_stages(
        &self,
        task_id: &str,
        payload: &JsonMap,
    ) -> Result<(ProcessStatus, AgentOutput, AgentOutput), AgentError> {
        // Produce
        self.update(task_id, |r| r.status = ProcessStatus::Analyzing).await;
        let producer = self.manager.select_agent(&self.config.producer_capability)?;
        let produce_input = AgentInput::new(task_id, payload.clone()).with_context("phase", "analysis");
        let produce_key = AnalysisCache::analysis_key(&Value::Object(payload.clone()), &producer.config_version());
        let produce = self.run_stage("analysis", &producer, produce_input, produce_key).await?;

        let produce_result = produce.result.clone();
        self.update(task_id, |r| {
            r.produce_result = Some(produce_result);
            r.status = ProcessStatus::Reviewing;
        })
        .await;

        // Review
        let reviewer = self.manager.select_agent(&self.config.reviewer_capability)?;
        let mut review_data = JsonMap::new();
        review_data.insert("original_commit".into(), Value::Object(payload.clone()));
        review_data.insert("analysis_result".into(), Value::Object(produce.result.clone()));
        let review_input = AgentInput::new(task_id, review_data)
            .with_context("phase", "review")
            .with_metadata("analysis_agent_id", producer.id())
            .with_metadata("analysis_config_version", producer.config_version());
        let review_key =
            AnalysisCache::review_key(&Value::Object(produce.result.clone()), &reviewer.config_version());
        let review = self.run_stage("review", &reviewer, review_input, review_key).await?;

        let review_result = review.result.clone();
        self.update(task_id, |r| r.review_result = Some(review_result)).await;

        Ok((self.decide(&review.result), produce, review))
    }

    /// Approved iff the reviewer approved and the score clears the pipeline threshold.
    pub fn decide(&self, review: &JsonMap) -> ProcessStatus {
        let approved = review.get("approved").and_then(Value::as_bool).unwrap_or(false);
        let score = review.get("overall_score").and_then(Value::as_f64).unwrap_or(0.0);
        if approved && score >= self.config.approval_threshold {
            ProcessStatus::Approved
        } else {
            ProcessStatus::Rejected
        }
    }

    /// Run one stage under the retry policy, consulting the cache first.
    /// Concurrent stages with the same key wait for each other so the agent
    /// runs at most once per key.
    async fn run_stage(
        &self,
        stage: &str,
        agent: &Arc<ManagedAgent>,
        input: AgentInput,
        key: String,
    ) -> Result<AgentOutput, AgentError> {
        let Some(cache) = &self.cache else {
            return self.invoke(stage, agent, input).await;
        };

        let gate = self.in_flight.entry(key.clone()).or_default().clone();
        let outcome = {
            let _guard = gate.lock().await;
            match cache.get(&key) {
                Some(mut cached) => {
                    debug!(task_id = %input.task_id, stage, "Stage served from cache");
                    cached.task_id = input.task_id.clone();
                    cached.metadata.insert("cache_hit".into(), json!(true));
                    Ok(cached)
                }
                None => {
                    let result = self.invoke(stage, agent, input).await;
                    if let Ok(output) = &result {
                        cache.put(&key, output);
                    }
                    result
                }
            }
        };
        drop(gate);
        self.in_flight.remove_if(&key, |_, g| Arc::strong_count(g) == 1);
        outcome
    }

    async fn invoke(&self, stage: &str, agent: &Arc<ManagedAgent>, input: AgentInput) -> Result<AgentOutput, AgentError> {
        let operation = format!("{} by {}", stage, agent.id());
        self.config
            .retry_policy
            .execute(&operation, || {
                let agent = Arc::clone(agent);
                let input = input.clone();
                async move { agent.execute(input).await.into_result() }
            })
            .await
    }
}

impl std::fmt::Debug for QualityController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QualityController")
            .field("config", &self.config)
            .field("cache", &self.cache.is_some())
            .finish()
    }
}

fn new_task_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn cutoff(age: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(age)
        .ok()
        .and_then(|age| Utc::now().checked_sub_signed(age))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
