use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::FutureExt;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::errors::AgentError;
use super::types::{AgentInput, AgentMetrics, AgentOutput, AgentStatus, AgentStatusReport, JsonMap};

/// Capability contract every pluggable agent implements.
///
/// Implementations hold no lifecycle state; status, metrics and the active
/// config live in the [`ManagedAgent`] wrapping them.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Registry tag this agent was built from (e.g. `analyzer`).
    fn agent_type(&self) -> &str;

    /// Fail with `AgentError::ConfigValidation` when `config` is unusable.
    fn validate_config(&self, config: &JsonMap) -> Result<(), AgentError>;

    fn capabilities(&self) -> Vec<String>;

    async fn process(&self, input: &AgentInput, config: &JsonMap) -> Result<AgentOutput, AgentError>;

    /// Agent-specific health probe, consulted only while the agent is not in `Error`.
    async fn health_check(&self, _config: &JsonMap) -> bool {
        true
    }

    /// Hook run after a reloaded config has been swapped in. A failure rolls the swap back.
    async fn apply_config(&self, _config: &JsonMap) -> Result<(), AgentError> {
        Ok(())
    }
}

#[derive(Debug)]
struct AgentState {
    status: AgentStatus,
    metrics: AgentMetrics,
}

/// A live agent instance: the behaviour plus its status machine, metrics and config.
///
/// Executions against one instance are serialized by `exec_lock`, so status and
/// metric updates for a single invocation are never interleaved with another.
pub struct ManagedAgent {
    id: String,
    seq: u64,
    behavior: Box<dyn Agent>,
    config: RwLock<JsonMap>,
    state: Mutex<AgentState>,
    exec_lock: tokio::sync::Mutex<()>,
}

impl ManagedAgent {
    pub fn new(id: impl Into<String>, seq: u64, behavior: Box<dyn Agent>, config: JsonMap) -> Self {
        Self {
            id: id.into(),
            seq,
            behavior,
            config: RwLock::new(config),
            state: Mutex::new(AgentState {
                status: AgentStatus::Idle,
                metrics: AgentMetrics::default(),
            }),
            exec_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Registration order within the owning manager.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn agent_type(&self) -> &str {
        self.behavior.agent_type()
    }

    pub fn capabilities(&self) -> Vec<String> {
        self.behavior.capabilities()
    }

    pub fn has_capability(&self, tag: &str) -> bool {
        self.capabilities().iter().any(|c| c == tag)
    }

    pub fn status(&self) -> AgentStatus {
        self.state().status
    }

    pub fn metrics(&self) -> AgentMetrics {
        self.state().metrics.clone()
    }

    pub fn config(&self) -> JsonMap {
        self.config.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn config_version(&self) -> String {
        match self.config.read().unwrap_or_else(PoisonError::into_inner).get("version") {
            Some(Value::String(v)) => v.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => "unknown".to_string(),
        }
    }

    pub(crate) fn mark_stopped(&self) {
        self.state().status = AgentStatus::Stopped;
    }

    fn state(&self) -> MutexGuard<'_, AgentState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run one task through the agent. Never fails: errors and panics come back
    /// as an error-flavored `AgentOutput` and leave the agent in `Error`.
    pub async fn execute(&self, input: AgentInput) -> AgentOutput {
        let _guard = self.exec_lock.lock().await;

        if self.status() == AgentStatus::Stopped {
            return AgentOutput::failure(&input.task_id, format!("agent {} is stopped", self.id), 0.0)
                .with_metadata("retryable", false);
        }

        let config = self.config();
        // Values too large for a Duration mean no effective limit.
        let timeout = config
            .get("timeout")
            .and_then(Value::as_f64)
            .filter(|t| *t > 0.0)
            .and_then(|t| Duration::try_from_secs_f64(t).ok());

        self.state().status = AgentStatus::Processing;
        let start = Instant::now();

        let guarded = AssertUnwindSafe(self.behavior.process(&input, &config)).catch_unwind();
        let outcome = match timeout {
            Some(limit) => match tokio::time::timeout(limit, guarded).await {
                Ok(result) => result,
                Err(_) => Ok(Err(AgentError::Timeout(format!(
                    "{} exceeded {:.3}s",
                    self.id,
                    limit.as_secs_f64()
                )))),
            },
            None => guarded.await,
        };
        let outcome = outcome.unwrap_or_else(|panic| {
            Err(AgentError::Internal(format!("agent {} panicked: {}", self.id, panic_message(&*panic))))
        });

        let elapsed = start.elapsed().as_secs_f64();

        let output = match outcome {
            Ok(mut output) if output.is_success() => {
                output.processing_time = elapsed;
                info!(
                    agent_id = %self.id,
                    task_id = %input.task_id,
                    processing_time = format!("{:.2}s", elapsed),
                    confidence = format!("{:.2}", output.confidence),
                    "Task completed"
                );
                output
            }
            Ok(output) => {
                let message = output.error_message.unwrap_or_else(|| "agent reported an error".to_string());
                error!(agent_id = %self.id, task_id = %input.task_id, error = %message, "Task failed");
                let mut failure = AgentOutput::failure(&input.task_id, message, elapsed);
                failure.metadata.extend(output.metadata);
                failure
            }
            Err(e) => {
                let classification = e.classify();
                error!(
                    agent_id = %self.id,
                    task_id = %input.task_id,
                    error_type = classification.error_type,
                    error = %e,
                    "Task failed"
                );
                AgentOutput::failure(&input.task_id, e.to_string(), elapsed)
                    .with_metadata("error_type", classification.error_type)
                    .with_metadata("retryable", classification.retryable)
            }
        };

        let mut state = self.state();
        state.metrics.record(&output);
        // Stopped while running (removed or replaced): stays stopped.
        if state.status != AgentStatus::Stopped {
            state.status = if output.is_success() { AgentStatus::Idle } else { AgentStatus::Error };
        }
        drop(state);

        output
    }

    /// Validate and apply a new config. An invalid config leaves the current one
    /// untouched; a failing post-apply hook restores the previous config.
    /// A successful reload also clears `Error`.
    pub async fn reload_config(&self, new_config: JsonMap) -> Result<(), AgentError> {
        if let Err(e) = self.behavior.validate_config(&new_config) {
            error!(agent_id = %self.id, error = %e, "Config reload rejected");
            return Err(e);
        }

        let _guard = self.exec_lock.lock().await;

        let previous = {
            let mut config = self.config.write().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *config, new_config.clone())
        };

        if let Err(e) = self.behavior.apply_config(&new_config).await {
            *self.config.write().unwrap_or_else(PoisonError::into_inner) = previous;
            warn!(agent_id = %self.id, error = %e, "Config apply failed, rolled back");
            return Err(e);
        }

        let mut state = self.state();
        if state.status == AgentStatus::Error {
            state.status = AgentStatus::Idle;
        }
        drop(state);

        info!(agent_id = %self.id, version = %self.config_version(), "Config reloaded");
        Ok(())
    }

    pub async fn health_check(&self) -> bool {
        if self.status() == AgentStatus::Error {
            return false;
        }
        let config = self.config();
        self.behavior.health_check(&config).await
    }

    pub fn get_status(&self) -> AgentStatusReport {
        let state = self.state();
        AgentStatusReport {
            agent_id: self.id.clone(),
            agent_type: self.agent_type().to_string(),
            status: state.status,
            capabilities: self.capabilities(),
            total_tasks: state.metrics.total_tasks,
            success_rate: state.metrics.success_rate(),
            average_processing_time: state.metrics.average_processing_time(),
            average_confidence: state.metrics.average_confidence,
            config_version: self.config_version(),
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

impl std::fmt::Debug for ManagedAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedAgent")
            .field("id", &self.id)
            .field("agent_type", &self.agent_type())
            .field("status", &self.status())
            .finish()
    }
}
