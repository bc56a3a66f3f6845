use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::AgentError;
use super::base::ManagedAgent;
use super::registry::{AgentFactory, AgentRegistry};
use super::types::{AgentInput, AgentOutput, AgentStatus, AgentStatusReport, JsonMap};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Number of worker loops draining the task queue.
    pub workers: usize,
    pub queue_capacity: usize,
    /// Upper bound on one queue poll before a worker re-checks for shutdown.
    pub poll_interval_ms: u64,
    /// Pause after the dequeue machinery itself fails.
    pub error_backoff_ms: u64,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            queue_capacity: 100,
            poll_interval_ms: 1000,
            error_backoff_ms: 1000,
        }
    }
}

impl ManagerConfig {
    pub fn validate(&self) -> Result<(), AgentError> {
        if self.workers == 0 {
            return Err(AgentError::Config("manager.workers must be at least 1".into()));
        }
        if self.queue_capacity == 0 {
            return Err(AgentError::Config("manager.queue_capacity must be at least 1".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(AgentError::Config("manager.poll_interval_ms must be positive".into()));
        }
        Ok(())
    }
}

type TaskReply = oneshot::Sender<Result<AgentOutput, AgentError>>;

struct QueuedTask {
    agent_id: String,
    input: AgentInput,
    reply: TaskReply,
}

/// Handle for a queued task. Resolves once a worker has run it, or with
/// `Shutdown` if the manager stopped before it was picked up.
#[derive(Debug)]
pub struct TaskTicket {
    task_id: String,
    agent_id: String,
    rx: oneshot::Receiver<Result<AgentOutput, AgentError>>,
}

impl TaskTicket {
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub async fn wait(self) -> Result<AgentOutput, AgentError> {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(AgentError::Shutdown),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemMetrics {
    pub total_agents: usize,
    pub healthy_agents: usize,
    pub health_rate: f64,
    pub total_tasks: u64,
    pub successful_tasks: u64,
    pub overall_success_rate: f64,
    pub average_processing_time: f64,
    pub queue_depth: usize,
    pub queue_capacity: usize,
    pub running_workers: usize,
}

/// Owns the live agents, the bounded task queue and the worker pool.
///
/// Lock discipline:
/// - `agents` is a sharded map; callers clone the `Arc<ManagedAgent>` out and
///   never hold a map guard across an await.
/// - the queue receiver sits behind one async mutex shared by the workers, so
///   exactly one worker is waiting on `recv` at a time and each task is
///   delivered once.
/// - the sender lives in an `RwLock<Option<_>>`; shutdown takes it out,
///   which closes the queue to new submissions.
pub struct AgentManager {
    config: ManagerConfig,
    registry: RwLock<AgentRegistry>,
    agents: Arc<DashMap<String, Arc<ManagedAgent>>>,
    next_seq: AtomicU64,
    sender: RwLock<Option<mpsc::Sender<QueuedTask>>>,
    receiver: Arc<Mutex<mpsc::Receiver<QueuedTask>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    running_workers: Arc<AtomicUsize>,
    cancel: CancellationToken,
    started: AtomicBool,
    shut_down: AtomicBool,
}

impl AgentManager {
    pub fn new(config: ManagerConfig, registry: AgentRegistry) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        Self {
            config,
            registry: RwLock::new(registry),
            agents: Arc::new(DashMap::new()),
            next_seq: AtomicU64::new(0),
            sender: RwLock::new(Some(tx)),
            receiver: Arc::new(Mutex::new(rx)),
            workers: Mutex::new(Vec::new()),
            running_workers: Arc::new(AtomicUsize::new(0)),
            cancel: CancellationToken::new(),
            started: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Spawn the worker pool. Calling it again is a no-op.
    pub async fn start(&self) -> Result<(), AgentError> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(AgentError::Shutdown);
        }
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let mut workers = self.workers.lock().await;
        for worker_id in 0..self.config.workers {
            let ctx = WorkerContext {
                worker_id,
                agents: self.agents.clone(),
                receiver: self.receiver.clone(),
                cancel: self.cancel.clone(),
                poll_interval: Duration::from_millis(self.config.poll_interval_ms),
                error_backoff: Duration::from_millis(self.config.error_backoff_ms),
                running: self.running_workers.clone(),
            };
            workers.push(tokio::spawn(run_worker(ctx)));
        }
        info!(workers = self.config.workers, queue_capacity = self.config.queue_capacity, "Agent manager started");
        Ok(())
    }

    pub fn register_agent_type(&self, agent_type: &str, factory: AgentFactory) {
        self.registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .register(agent_type, factory);
        debug!(agent_type, "Registered agent type");
    }

    pub fn agent_types(&self) -> Vec<String> {
        self.registry.read().unwrap_or_else(PoisonError::into_inner).types()
    }

    /// Build, validate and register an agent. An existing agent with the same
    /// id is replaced and stopped.
    pub fn create_agent(
        &self,
        agent_id: &str,
        agent_type: &str,
        config: JsonMap,
    ) -> Result<Arc<ManagedAgent>, AgentError> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(AgentError::Shutdown);
        }

        let behavior = self
            .registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .build(agent_type)?;

        if let Err(e) = behavior.validate_config(&config) {
            warn!(agent_id, agent_type, error = %e, "Agent config rejected");
            return Err(e);
        }

        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let agent = Arc::new(ManagedAgent::new(agent_id, seq, behavior, config));
        if let Some(previous) = self.agents.insert(agent_id.to_string(), agent.clone()) {
            previous.mark_stopped();
            warn!(agent_id, "Replaced existing agent with the same id");
        }

        info!(agent_id, agent_type, version = %agent.config_version(), "Agent created");
        Ok(agent)
    }

    pub fn remove_agent(&self, agent_id: &str) -> Result<(), AgentError> {
        match self.agents.remove(agent_id) {
            Some((_, agent)) => {
                agent.mark_stopped();
                info!(agent_id, "Agent removed");
                Ok(())
            }
            None => Err(AgentError::UnknownAgent(agent_id.to_string())),
        }
    }

    pub fn get_agent(&self, agent_id: &str) -> Option<Arc<ManagedAgent>> {
        self.agents.get(agent_id).map(|entry| entry.value().clone())
    }

    /// All agents in registration order.
    pub fn list_agents(&self) -> Vec<Arc<ManagedAgent>> {
        let mut agents: Vec<Arc<ManagedAgent>> =
            self.agents.iter().map(|entry| entry.value().clone()).collect();
        agents.sort_by_key(|a| a.seq());
        agents
    }

    /// Agents advertising `tag`, in registration order.
    pub fn get_agents_by_capability(&self, tag: &str) -> Vec<Arc<ManagedAgent>> {
        self.list_agents()
            .into_iter()
            .filter(|a| a.has_capability(tag))
            .collect()
    }

    /// First registered agent advertising `tag`.
    pub fn select_agent(&self, tag: &str) -> Result<Arc<ManagedAgent>, AgentError> {
        self.get_agents_by_capability(tag)
            .into_iter()
            .next()
            .ok_or_else(|| AgentError::UnknownCapability(tag.to_string()))
    }

    /// Run a task on the caller's task, bypassing the queue.
    pub async fn execute_task(&self, agent_id: &str, input: AgentInput) -> Result<AgentOutput, AgentError> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(AgentError::Shutdown);
        }
        run_on_agent(&self.agents, agent_id, input).await
    }

    /// Enqueue a task, waiting for queue space when the queue is full.
    pub async fn submit(&self, agent_id: &str, input: AgentInput) -> Result<TaskTicket, AgentError> {
        let (task, ticket) = self.prepare(agent_id, input)?;
        let sender = self.current_sender()?;
        sender.send(task).await.map_err(|_| AgentError::Shutdown)?;
        debug!(agent_id, task_id = %ticket.task_id, "Task queued");
        Ok(ticket)
    }

    /// Enqueue a task, failing with `QueueFull` instead of waiting.
    pub fn try_submit(&self, agent_id: &str, input: AgentInput) -> Result<TaskTicket, AgentError> {
        let (task, ticket) = self.prepare(agent_id, input)?;
        let sender = self.current_sender()?;
        sender.try_send(task).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => AgentError::QueueFull(self.config.queue_capacity),
            mpsc::error::TrySendError::Closed(_) => AgentError::Shutdown,
        })?;
        debug!(agent_id, task_id = %ticket.task_id, "Task queued");
        Ok(ticket)
    }

    fn prepare(&self, agent_id: &str, input: AgentInput) -> Result<(QueuedTask, TaskTicket), AgentError> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(AgentError::Shutdown);
        }
        if !self.agents.contains_key(agent_id) {
            return Err(AgentError::UnknownAgent(agent_id.to_string()));
        }
        let (reply, rx) = oneshot::channel();
        let ticket = TaskTicket {
            task_id: input.task_id.clone(),
            agent_id: agent_id.to_string(),
            rx,
        };
        let task = QueuedTask {
            agent_id: agent_id.to_string(),
            input,
            reply,
        };
        Ok((task, ticket))
    }

    fn current_sender(&self) -> Result<mpsc::Sender<QueuedTask>, AgentError> {
        self.sender
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(AgentError::Shutdown)
    }

    pub async fn reload_agent_config(&self, agent_id: &str, config: JsonMap) -> Result<(), AgentError> {
        let agent = self
            .get_agent(agent_id)
            .ok_or_else(|| AgentError::UnknownAgent(agent_id.to_string()))?;
        agent.reload_config(config).await
    }

    pub fn get_status(&self, agent_id: &str) -> Result<AgentStatusReport, AgentError> {
        self.get_agent(agent_id)
            .map(|a| a.get_status())
            .ok_or_else(|| AgentError::UnknownAgent(agent_id.to_string()))
    }

    pub fn get_all_status(&self) -> Vec<AgentStatusReport> {
        self.list_agents().iter().map(|a| a.get_status()).collect()
    }

    /// Probe every agent concurrently. Agents are snapshotted first so no map
    /// guard is held while probing.
    pub async fn health_check_all(&self) -> BTreeMap<String, bool> {
        let agents = self.list_agents();
        let probes = agents.iter().map(|a| a.health_check());
        let results = futures::future::join_all(probes).await;
        agents
            .iter()
            .zip(results)
            .map(|(a, healthy)| (a.id().to_string(), healthy))
            .collect()
    }

    pub fn queue_depth(&self) -> usize {
        match self.sender.read().unwrap_or_else(PoisonError::into_inner).as_ref() {
            Some(tx) => tx.max_capacity() - tx.capacity(),
            None => 0,
        }
    }

    pub fn running_workers(&self) -> usize {
        self.running_workers.load(Ordering::SeqCst)
    }

    pub fn get_system_metrics(&self) -> SystemMetrics {
        let agents = self.list_agents();
        let total_agents = agents.len();
        let healthy_agents = agents
            .iter()
            .filter(|a| matches!(a.status(), AgentStatus::Idle | AgentStatus::Processing))
            .count();

        let (mut total_tasks, mut successful_tasks, mut total_time) = (0u64, 0u64, 0.0f64);
        for agent in &agents {
            let metrics = agent.metrics();
            total_tasks += metrics.total_tasks;
            successful_tasks += metrics.successful_tasks;
            total_time += metrics.total_processing_time;
        }

        let ratio = |num: f64, den: f64| if den > 0.0 { num / den } else { 0.0 };
        SystemMetrics {
            total_agents,
            healthy_agents,
            health_rate: ratio(healthy_agents as f64, total_agents as f64),
            total_tasks,
            successful_tasks,
            overall_success_rate: ratio(successful_tasks as f64, total_tasks as f64),
            average_processing_time: ratio(total_time, total_tasks as f64),
            queue_depth: self.queue_depth(),
            queue_capacity: self.config.queue_capacity,
            running_workers: self.running_workers(),
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Stop the pool and drop every agent. Workers finish the task they are
    /// running; tasks still queued resolve with `Shutdown`. Idempotent.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Shutting down agent manager");
        self.cancel.cancel();

        let handles: Vec<JoinHandle<()>> = self.workers.lock().await.drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Worker terminated abnormally");
            }
        }

        drop(self.sender.write().unwrap_or_else(PoisonError::into_inner).take());

        let mut rx = self.receiver.lock().await;
        rx.close();
        let mut discarded = 0usize;
        while let Ok(task) = rx.try_recv() {
            let _ = task.reply.send(Err(AgentError::Shutdown));
            discarded += 1;
        }
        drop(rx);

        let agent_ids: Vec<String> = self.agents.iter().map(|e| e.key().clone()).collect();
        for agent_id in agent_ids {
            if let Some((_, agent)) = self.agents.remove(&agent_id) {
                agent.mark_stopped();
            }
        }
        info!(discarded_tasks = discarded, "Agent manager stopped");
    }
}

impl std::fmt::Debug for AgentManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentManager")
            .field("config", &self.config)
            .field("agents", &self.agents.len())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

async fn run_on_agent(
    agents: &DashMap<String, Arc<ManagedAgent>>,
    agent_id: &str,
    input: AgentInput,
) -> Result<AgentOutput, AgentError> {
    let agent = agents
        .get(agent_id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| AgentError::UnknownAgent(agent_id.to_string()))?;

    // An agent that failed stays out of rotation until its config is reloaded.
    if agent.status() == AgentStatus::Error {
        return Err(AgentError::AgentUnavailable(format!("{} is in error state", agent_id)));
    }
    Ok(agent.execute(input).await)
}

struct WorkerContext {
    worker_id: usize,
    agents: Arc<DashMap<String, Arc<ManagedAgent>>>,
    receiver: Arc<Mutex<mpsc::Receiver<QueuedTask>>>,
    cancel: CancellationToken,
    poll_interval: Duration,
    error_backoff: Duration,
    running: Arc<AtomicUsize>,
}

enum Poll {
    Task(QueuedTask),
    Empty,
    Closed,
}

async fn poll_queue(receiver: &Mutex<mpsc::Receiver<QueuedTask>>, interval: Duration) -> Poll {
    let next = tokio::time::timeout(interval, async { receiver.lock().await.recv().await }).await;
    match next {
        Ok(Some(task)) => Poll::Task(task),
        Ok(None) => Poll::Closed,
        Err(_) => Poll::Empty,
    }
}

async fn run_worker(ctx: WorkerContext) {
    ctx.running.fetch_add(1, Ordering::SeqCst);
    debug!(worker_id = ctx.worker_id, "Worker started");

    loop {
        // Cancellation wins over a ready task; recv is cancel safe, so a
        // dropped poll never loses a queued task.
        let next = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => break,
            next = poll_queue(&ctx.receiver, ctx.poll_interval) => next,
        };

        match next {
            Poll::Task(task) => {
                let task_id = task.input.task_id.clone();
                let result = run_on_agent(&ctx.agents, &task.agent_id, task.input).await;
                if let Err(ref e) = result {
                    warn!(worker_id = ctx.worker_id, agent_id = %task.agent_id, task_id = %task_id, error = %e, "Queued task not run");
                }
                if task.reply.send(result).is_err() {
                    debug!(task_id = %task_id, "Submitter dropped its ticket");
                }
            }
            Poll::Empty => continue,
            Poll::Closed => {
                if ctx.cancel.is_cancelled() {
                    break;
                }
                warn!(worker_id = ctx.worker_id, "Task queue closed unexpectedly, backing off");
                tokio::time::sleep(ctx.error_backoff).await;
            }
        }
    }

    ctx.running.fetch_sub(1, Ordering::SeqCst);
    debug!(worker_id = ctx.worker_id, "Worker stopped");
}
