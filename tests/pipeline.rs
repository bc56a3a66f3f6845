use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use gitmentor::agents::{
    Agent, AgentInput, AgentManager, AgentOutput, AgentRegistry, AgentServices, JsonMap, ManagerConfig,
};
use gitmentor::cache::{AnalysisCache, CacheConfig};
use gitmentor::errors::{AgentError, RetryPolicy};
use gitmentor::llm::{CompletionOptions, LLMProvider, LLMResponse};
use gitmentor::pipeline::{
    AnalysisRecord, MemoryStorage, PipelineConfig, ProcessStatus, QualityController, StorageSink,
};
use gitmentor::prompts::PromptLibrary;

fn obj(value: Value) -> JsonMap {
    value.as_object().cloned().unwrap()
}

fn commit(hash: &str) -> JsonMap {
    obj(json!({
        "hash": hash,
        "message": "fix: handle empty diffs in the change parser",
        "author_name": "Dev",
        "author_email": "dev@example.com",
        "commit_date": "2024-05-01T10:00:00Z",
        "files_changed": 2
    }))
}

/// Producer stub counting its invocations.
struct StubProducer {
    calls: Arc<AtomicUsize>,
    fail: bool,
    reject_input: bool,
    delay: Duration,
}

#[async_trait]
impl Agent for StubProducer {
    fn agent_type(&self) -> &str {
        "stub-producer"
    }
    fn validate_config(&self, _config: &JsonMap) -> Result<(), AgentError> {
        Ok(())
    }
    fn capabilities(&self) -> Vec<String> {
        vec!["commit_analysis".into()]
    }
    async fn process(&self, input: &AgentInput, _config: &JsonMap) -> Result<AgentOutput, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        if self.reject_input {
            return Err(AgentError::InvalidInput("commit has no message".into()));
        }
        if self.fail {
            return Err(AgentError::Network("provider unreachable".into()));
        }
        let result = obj(json!({
            "summary": format!("Analysis of {}", input.data.get("hash").and_then(Value::as_str).unwrap_or("?")),
            "category": "bugfix",
            "confidence_score": 0.8
        }));
        Ok(AgentOutput::success(&input.task_id, result, 0.8))
    }
}

struct StubReviewer {
    approved: bool,
    score: f64,
    fail: bool,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Agent for StubReviewer {
    fn agent_type(&self) -> &str {
        "stub-reviewer"
    }
    fn validate_config(&self, _config: &JsonMap) -> Result<(), AgentError> {
        Ok(())
    }
    fn capabilities(&self) -> Vec<String> {
        vec!["quality_assessment".into()]
    }
    async fn process(&self, input: &AgentInput, _config: &JsonMap) -> Result<AgentOutput, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(input.data.contains_key("original_commit"));
        assert!(input.data.contains_key("analysis_result"));
        if self.fail {
            return Err(AgentError::RateLimit("reviewer throttled".into()));
        }
        let result = obj(json!({
            "approved": self.approved,
            "overall_score": self.score,
            "dimension_scores": {"accuracy": self.score, "clarity": self.score}
        }));
        Ok(AgentOutput::success(&input.task_id, result, self.score))
    }
}

struct Harness {
    controller: QualityController,
    producer_calls: Arc<AtomicUsize>,
    reviewer_calls: Arc<AtomicUsize>,
}

struct Setup {
    producer_fails: bool,
    producer_rejects_input: bool,
    reviewer_fails: bool,
    producer_delay: Duration,
    approved: bool,
    score: f64,
    threshold: f64,
    max_retries: u32,
    cache: bool,
    sink: Arc<dyn StorageSink>,
}

impl Default for Setup {
    fn default() -> Self {
        Self {
            producer_fails: false,
            producer_rejects_input: false,
            reviewer_fails: false,
            producer_delay: Duration::ZERO,
            approved: true,
            score: 0.9,
            threshold: 0.85,
            max_retries: 0,
            cache: false,
            sink: Arc::new(MemoryStorage::new()),
        }
    }
}

fn harness(setup: Setup) -> Harness {
    let producer_calls = Arc::new(AtomicUsize::new(0));
    let reviewer_calls = Arc::new(AtomicUsize::new(0));

    let mut registry = AgentRegistry::new();
    let (calls, fail, reject_input, delay) = (
        producer_calls.clone(),
        setup.producer_fails,
        setup.producer_rejects_input,
        setup.producer_delay,
    );
    registry.register(
        "stub-producer",
        Arc::new(move || {
            Box::new(StubProducer { calls: calls.clone(), fail, reject_input, delay }) as Box<dyn Agent>
        }),
    );
    let (calls, approved, score, fail) = (reviewer_calls.clone(), setup.approved, setup.score, setup.reviewer_fails);
    registry.register(
        "stub-reviewer",
        Arc::new(move || Box::new(StubReviewer { approved, score, fail, calls: calls.clone() }) as Box<dyn Agent>),
    );

    let manager = AgentManager::new(ManagerConfig::default(), registry);
    manager.create_agent("producer-1", "stub-producer", obj(json!({"version": "1.0"}))).unwrap();
    manager.create_agent("reviewer-1", "stub-reviewer", obj(json!({"version": "1.0"}))).unwrap();

    let config = PipelineConfig {
        approval_threshold: setup.threshold,
        retry_policy: RetryPolicy::new(setup.max_retries, Duration::from_millis(10), Duration::from_millis(50), 2.0),
        ..Default::default()
    };
    let mut controller = QualityController::new(config, Arc::new(manager), setup.sink);
    if setup.cache {
        controller = controller.with_cache(Arc::new(AnalysisCache::new(&CacheConfig::default())));
    }

    Harness { controller, producer_calls, reviewer_calls }
}

#[tokio::test]
async fn test_approved_end_to_end() {
    let storage = Arc::new(MemoryStorage::new());
    let h = harness(Setup { sink: storage.clone(), ..Default::default() });

    let result = h.controller.process(commit("abc123")).await;
    assert_eq!(result.status, ProcessStatus::Approved);
    assert_eq!(result.produce_result.as_ref().unwrap()["category"], "bugfix");
    assert_eq!(result.overall_score(), Some(0.9));
    assert!(result.error_message.is_none());
    assert!(result.completed_at.unwrap() >= result.created_at);

    let stored = storage.approved();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].commit_hash, "abc123");
    assert_eq!(stored[0].task_id, result.task_id);
    assert!(storage.rejected().is_empty());
}

#[tokio::test]
async fn test_threshold_decisions() {
    for (approved, score, expected) in [
        (true, 0.90, ProcessStatus::Approved),
        (true, 0.80, ProcessStatus::Rejected),
        (false, 0.95, ProcessStatus::Rejected),
    ] {
        let h = harness(Setup { approved, score, ..Default::default() });
        let result = h.controller.process(commit("abc")).await;
        assert_eq!(result.status, expected, "approved={} score={}", approved, score);
        assert!(result.review_result.is_some());
    }
}

#[tokio::test(start_paused = true)]
async fn test_failing_producer_ends_in_error_after_retries() {
    let h = harness(Setup { producer_fails: true, max_retries: 2, ..Default::default() });

    let result = h.controller.process(commit("abc")).await;
    assert_eq!(result.status, ProcessStatus::Error);
    assert!(result.review_result.is_none());
    assert!(result.produce_result.is_none());
    let message = result.error_message.unwrap();
    assert!(message.contains("provider unreachable"), "{}", message);
    assert_eq!(h.producer_calls.load(Ordering::SeqCst), 3);
    assert_eq!(h.reviewer_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_failing_reviewer_keeps_analysis_and_skips_storage() {
    let storage = Arc::new(MemoryStorage::new());
    let h = harness(Setup { reviewer_fails: true, max_retries: 2, sink: storage.clone(), ..Default::default() });

    let result = h.controller.process(commit("abc")).await;
    assert_eq!(result.status, ProcessStatus::Error);
    assert_eq!(result.produce_result.as_ref().unwrap()["category"], "bugfix");
    assert!(result.review_result.is_none());
    assert!(result.error_message.unwrap().contains("reviewer throttled"));
    assert_eq!(h.producer_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.reviewer_calls.load(Ordering::SeqCst), 3);
    assert!(storage.approved().is_empty());
    assert!(storage.rejected().is_empty());
}

#[tokio::test]
async fn test_invalid_input_fails_without_retrying() {
    let h = harness(Setup { producer_rejects_input: true, max_retries: 3, ..Default::default() });

    let result = h.controller.process(commit("abc")).await;
    assert_eq!(result.status, ProcessStatus::Error);
    assert!(result.produce_result.is_none());
    assert!(result.error_message.unwrap().contains("commit has no message"));
    assert_eq!(h.producer_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.reviewer_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_retry_creates_linked_submission() {
    let h = harness(Setup { approved: false, ..Default::default() });
    let rejected = h.controller.process(commit("abc")).await;
    assert_eq!(rejected.status, ProcessStatus::Rejected);

    let retried = h.controller.retry(&rejected.task_id).await.unwrap();
    assert_eq!(retried.retried_from.as_deref(), Some(rejected.task_id.as_str()));
    assert_eq!(retried.retry_count, 1);
    assert_eq!(retried.input_payload, rejected.input_payload);
    assert_eq!(h.controller.list_results(None).await.len(), 2);
    assert_eq!(h.controller.list_results(Some(ProcessStatus::Rejected)).await.len(), 2);
}

struct BrokenSink;

#[async_trait]
impl StorageSink for BrokenSink {
    async fn store_approved(&self, _record: &AnalysisRecord) -> Result<(), AgentError> {
        Err(AgentError::Storage("disk full".into()))
    }
    async fn store_rejected(&self, _record: &AnalysisRecord) -> Result<(), AgentError> {
        Err(AgentError::Storage("disk full".into()))
    }
}

#[tokio::test]
async fn test_storage_failure_keeps_decision() {
    let h = harness(Setup { sink: Arc::new(BrokenSink), ..Default::default() });
    let result = h.controller.process(commit("abc")).await;
    assert_eq!(result.status, ProcessStatus::Approved);
    assert!(result.storage_error.unwrap().contains("disk full"));
    assert!(result.error_message.is_none());
}

#[tokio::test]
async fn test_cache_short_circuits_repeat_commits() {
    let h = harness(Setup { cache: true, ..Default::default() });
    let first = h.controller.process(commit("abc")).await;
    let second = h.controller.process(commit("abc")).await;
    h.controller.process(commit("def")).await;

    assert_eq!(first.status, ProcessStatus::Approved);
    assert_eq!(second.status, ProcessStatus::Approved);
    assert_eq!(first.produce_result, second.produce_result);
    assert_eq!(h.producer_calls.load(Ordering::SeqCst), 2);
    assert_eq!(h.reviewer_calls.load(Ordering::SeqCst), 2);
    assert!(h.controller.cache().unwrap().stats().hits >= 2);
}

#[tokio::test]
async fn test_concurrent_identical_commits_compute_once() {
    let h = harness(Setup { cache: true, producer_delay: Duration::from_millis(50), ..Default::default() });
    let (a, b, c) = tokio::join!(
        h.controller.process(commit("same")),
        h.controller.process(commit("same")),
        h.controller.process(commit("same")),
    );
    for result in [&a, &b, &c] {
        assert_eq!(result.status, ProcessStatus::Approved);
    }
    assert_eq!(h.producer_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.reviewer_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_submit_runs_in_background() {
    let h = harness(Setup::default());
    let controller = Arc::new(h.controller);
    let task_id = controller.submit(commit("abc")).await;

    let mut status = ProcessStatus::Pending;
    for _ in 0..100 {
        status = controller.get_result(&task_id).await.unwrap().status;
        if status.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(status, ProcessStatus::Approved);

    let stats = controller.get_statistics().await;
    assert_eq!(stats.total_tasks, 1);
    assert_eq!(stats.approval_rate, 1.0);
    let trends = controller.quality_trends(Duration::from_secs(3600)).await;
    assert_eq!(trends.sample_count, 1);
    assert_eq!(trends.average_quality_score, 0.9);
}

/// Completion client replying with a fixed JSON document.
struct CannedLLM(&'static str);

#[async_trait]
impl LLMProvider for CannedLLM {
    async fn complete(&self, _: &str, _: Option<&str>, _: &CompletionOptions) -> Result<LLMResponse, AgentError> {
        Ok(LLMResponse {
            content: self.0.to_string(),
            input_tokens: None,
            output_tokens: None,
            model: "canned".into(),
        })
    }
    fn provider_name(&self) -> &str {
        "canned"
    }
    fn model_name(&self) -> &str {
        "canned"
    }
}

#[tokio::test]
async fn test_builtin_agents_end_to_end() {
    let services = AgentServices::new(PromptLibrary::builtin())
        .with_provider(
            "analysis-llm",
            Arc::new(CannedLLM(
                r#"Here you go: {"summary": "Handle empty diffs", "category": "fix", "impact_level": "low",
                "description": "Guards the parser against empty diffs", "confidence_score": 0.8}"#,
            )),
        )
        .with_provider(
            "review-llm",
            Arc::new(CannedLLM(
                r#"```json
{"dimension_scores": {"accuracy": 0.95, "completeness": 0.9, "consistency": 0.9, "clarity": 0.9},
 "feedback": "Accurate and clear.", "suggestions": []}
```"#,
            )),
        );
    let manager = AgentManager::new(ManagerConfig::default(), AgentRegistry::with_builtin(Arc::new(services)));
    manager
        .create_agent("analyzer-1", "analyzer", obj(json!({"llm_client": "analysis-llm", "prompt_template": "git_commit_analyzer"})))
        .unwrap();
    manager
        .create_agent("reviewer-1", "reviewer", obj(json!({"llm_client": "review-llm", "prompt_template": "quality_reviewer"})))
        .unwrap();

    let storage = Arc::new(MemoryStorage::new());
    let controller = QualityController::new(PipelineConfig::default(), Arc::new(manager), storage.clone());
    let result = controller.process(commit("0123abcd")).await;

    assert_eq!(result.status, ProcessStatus::Approved, "{:?}", result.error_message);
    let analysis = result.produce_result.as_ref().unwrap();
    assert_eq!(analysis["category"], "bugfix");
    let review = result.review_result.as_ref().unwrap();
    assert_eq!(review["approved"], true);
    assert!(review["overall_score"].as_f64().unwrap() >= 0.85);
    assert_eq!(storage.approved().len(), 1);
}

struct PanickingProducer;

#[async_trait]
impl Agent for PanickingProducer {
    fn agent_type(&self) -> &str {
        "panicking-producer"
    }
    fn validate_config(&self, _config: &JsonMap) -> Result<(), AgentError> {
        Ok(())
    }
    fn capabilities(&self) -> Vec<String> {
        vec!["commit_analysis".into()]
    }
    async fn process(&self, _input: &AgentInput, _config: &JsonMap) -> Result<AgentOutput, AgentError> {
        panic!("analysis blew up")
    }
}

#[tokio::test]
async fn test_panicking_producer_reaches_error() {
    let mut registry = AgentRegistry::new();
    registry.register("panicking-producer", Arc::new(|| Box::new(PanickingProducer) as Box<dyn Agent>));
    let manager = AgentManager::new(ManagerConfig::default(), registry);
    manager.create_agent("producer-1", "panicking-producer", JsonMap::new()).unwrap();

    let config = PipelineConfig { retry_policy: RetryPolicy::no_retry(), ..Default::default() };
    let controller = Arc::new(QualityController::new(config, Arc::new(manager), Arc::new(MemoryStorage::new())));
    let task_id = controller.submit(commit("abc")).await;

    let mut result = None;
    for _ in 0..100 {
        let current = controller.get_result(&task_id).await.unwrap();
        if current.status.is_terminal() {
            result = Some(current);
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let result = result.expect("submission should finish");
    assert_eq!(result.status, ProcessStatus::Error);
    assert!(result.error_message.unwrap().contains("analysis blew up"));
}
