use crate::config::CoordinatorConfig;
use crate::dispatcher::Dispatcher;
use crate::events::{self, AGENT_REMOVED, AGENT_STATUS, TASK_COMPLETION, TASK_SUBMITTED};
use crate::monitor::{self, HealthMonitor};
use crate::queue::TaskQueue;
use crate::registry::AgentRegistry;
use crate::selector::select_agent;
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use taskgrid_core::{
    AgentRecord, AgentStatus, EventSink, MetricsUpdate, TaskExecutor, TaskPriority, TaskRecord,
    TaskgridError, TaskgridResult,
};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

/// Overall system health derived from the agent pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SystemHealth {
    /// Every agent is available.
    Healthy,
    /// Some agents are Offline or Error.
    Degraded,
    /// At least half the pool is Offline or Error.
    Critical,
    /// No agents registered.
    Unknown,
}

/// Aggregated view of agents, tasks, and overall health.
#[derive(Debug, Clone, Serialize)]
pub struct SystemOverview {
    /// Registered agent count.
    pub total_agents: usize,
    /// Agent counts keyed by status string.
    pub agents_by_status: HashMap<String, usize>,
    /// Mean of the agents' average response times, in ms.
    pub average_response_time: f64,
    /// Mean of the agents' success rates, in percent.
    pub average_success_rate: f64,
    /// Total known tasks, pending and terminal alike.
    pub total_tasks: usize,
    /// Task counts keyed by status string.
    pub tasks_by_status: HashMap<String, usize>,
    /// Derived pool health.
    pub health: SystemHealth,
}

/// Full agent record plus its most recent tasks.
#[derive(Debug, Clone, Serialize)]
pub struct AgentDetails {
    /// The agent snapshot.
    pub agent: AgentRecord,
    /// Up to the 10 most recent tasks bound to this agent, newest first.
    pub recent_tasks: Vec<TaskRecord>,
}

/// The task scheduler and worker-agent coordinator.
///
/// An explicitly constructed instance with a `start()`/`stop()` lifecycle;
/// multiple isolated coordinators can coexist (e.g. in tests). The injected
/// [`TaskExecutor`] performs the actual work and the [`EventSink`] receives
/// every state change; the coordinator itself owns no transport.
pub struct Coordinator {
    registry: Arc<AgentRegistry>,
    queue: Arc<TaskQueue>,
    executor: Arc<dyn TaskExecutor>,
    sink: Arc<dyn EventSink>,
    config: Arc<CoordinatorConfig>,
    running: Arc<AtomicBool>,
    shutdown: watch::Sender<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Coordinator {
    /// Create a stopped coordinator around the injected hook and sink.
    pub fn new(
        config: CoordinatorConfig,
        executor: Arc<dyn TaskExecutor>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            registry: Arc::new(AgentRegistry::new()),
            queue: Arc::new(TaskQueue::new()),
            executor,
            sink,
            config: Arc::new(config),
            running: Arc::new(AtomicBool::new(false)),
            shutdown: watch::channel(false).0,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Spawn the dispatcher loop and the health monitor. Idempotent.
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.shutdown.send(false);
        let dispatcher = Dispatcher {
            registry: Arc::clone(&self.registry),
            queue: Arc::clone(&self.queue),
            executor: Arc::clone(&self.executor),
            sink: Arc::clone(&self.sink),
            config: Arc::clone(&self.config),
            running: Arc::clone(&self.running),
        };
        let health = HealthMonitor {
            registry: Arc::clone(&self.registry),
            queue: Arc::clone(&self.queue),
            sink: Arc::clone(&self.sink),
            heartbeat_timeout_secs: self.config.heartbeat_timeout_secs,
            interval_secs: self.config.health_check_interval_secs,
            running: Arc::clone(&self.running),
            shutdown: self.shutdown.subscribe(),
        };
        let mut handles = self.handles.lock().await;
        handles.push(tokio::spawn(dispatcher.run()));
        handles.push(tokio::spawn(health.run()));
        info!("coordinator started");
    }

    /// Cooperatively stop both background loops.
    ///
    /// In-flight executions are left to run to completion; only the loops
    /// are cancelled.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        let _ = self.shutdown.send(true);
        self.queue.nudge();
        let mut handles = self.handles.lock().await;
        for handle in handles.drain(..) {
            if let Err(e) = handle.await {
                warn!(error = %e, "background loop ended abnormally");
            }
        }
        info!("coordinator stopped");
    }

    /// Register a worker agent. Fails on a duplicate id or a zero ceiling.
    pub async fn register_agent(
        &self,
        id: impl Into<String>,
        name: impl Into<String>,
        capabilities: Vec<String>,
        max_concurrent: u32,
    ) -> TaskgridResult<()> {
        let agent = self
            .registry
            .register(id, name, capabilities, max_concurrent)
            .await?;
        info!(agent_id = %agent.id, name = %agent.name, "agent registered");
        events::emit_json(&self.sink, AGENT_STATUS, &agent).await;
        Ok(())
    }

    /// Remove an agent, failing all of its non-terminal tasks first.
    pub async fn unregister_agent(&self, id: &str) -> TaskgridResult<()> {
        if self.registry.get(id).await.is_none() {
            return Err(TaskgridError::UnknownAgent(id.to_string()));
        }
        let mut failed = self.queue.fail_queued_for_agent(id, "Agent unregistered").await;
        failed.extend(
            self.queue
                .fail_running_for_agent(id, "Agent unregistered")
                .await,
        );
        for task in &failed {
            events::emit_json(&self.sink, TASK_COMPLETION, task).await;
        }
        let agent = self.registry.remove(id).await?;
        info!(agent_id = %agent.id, failed_tasks = failed.len(), "agent unregistered");
        events::emit(&self.sink, AGENT_REMOVED, json!({ "agent_id": agent.id })).await;
        Ok(())
    }

    /// Apply a status transition. Returns `Ok(false)` for an unknown agent;
    /// an illegal transition is an [`TaskgridError::InvalidTransition`]
    /// error. A manual transition to Offline also fails the agent's Running
    /// tasks, exactly like a heartbeat timeout.
    pub async fn update_agent_status(
        &self,
        id: &str,
        status: AgentStatus,
        current_task: Option<String>,
    ) -> TaskgridResult<bool> {
        let agent = match self.registry.set_status(id, status, current_task).await {
            Ok(agent) => agent,
            Err(TaskgridError::UnknownAgent(_)) => return Ok(false),
            Err(e) => return Err(e),
        };
        if status == AgentStatus::Offline {
            for task in self.queue.fail_running_for_agent(id, "Agent offline").await {
                events::emit_json(&self.sink, TASK_COMPLETION, &task).await;
            }
        }
        events::emit_json(&self.sink, AGENT_STATUS, &agent).await;
        Ok(true)
    }

    /// Record a liveness signal with an optional partial metrics patch.
    /// Returns false for an unknown agent.
    pub async fn agent_heartbeat(&self, id: &str, metrics: Option<MetricsUpdate>) -> bool {
        match self.registry.heartbeat(id, metrics.as_ref()).await {
            Some(agent) => {
                events::emit_json(&self.sink, AGENT_STATUS, &agent).await;
                true
            }
            None => false,
        }
    }

    /// Submit a task for dispatch.
    ///
    /// The selector runs synchronously: when no registered agent satisfies
    /// the required capabilities this fails with
    /// [`TaskgridError::NoSuitableAgent`] and no task record is created.
    pub async fn submit_task(
        &self,
        task_type: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
        priority: TaskPriority,
        required_capabilities: &[String],
        preferred_agent: Option<&str>,
    ) -> TaskgridResult<Uuid> {
        let agents = self.registry.snapshot().await;
        let agent_id = select_agent(&agents, required_capabilities, preferred_agent)
            .ok_or_else(|| TaskgridError::NoSuitableAgent(required_capabilities.join(", ")))?;

        let task = TaskRecord::new(agent_id.clone(), task_type, description, parameters, priority);
        let task_id = task.id;
        let submitted = json!({
            "task_id": task_id,
            "agent_id": agent_id,
            "task_type": task.task_type,
            "description": task.description,
            "priority": task.priority,
            "status": "queued",
        });
        self.queue.insert(task).await;
        info!(%task_id, agent_id = %agent_id, "task submitted");
        events::emit(&self.sink, TASK_SUBMITTED, submitted).await;
        Ok(task_id)
    }

    /// Aggregate agent, task, and health counters.
    pub async fn get_system_overview(&self) -> SystemOverview {
        let agents = self.registry.snapshot().await;
        let mut agents_by_status: HashMap<String, usize> = HashMap::new();
        for agent in &agents {
            *agents_by_status.entry(agent.status.to_string()).or_default() += 1;
        }

        let (average_response_time, average_success_rate) = if agents.is_empty() {
            (0.0, 0.0)
        } else {
            let n = agents.len() as f64;
            (
                agents.iter().map(|a| a.metrics.average_response_time).sum::<f64>() / n,
                agents.iter().map(|a| a.metrics.success_rate).sum::<f64>() / n,
            )
        };

        let unavailable = agents
            .iter()
            .filter(|a| matches!(a.status, AgentStatus::Offline | AgentStatus::Error))
            .count();
        let health = if agents.is_empty() {
            SystemHealth::Unknown
        } else if unavailable * 2 >= agents.len() {
            SystemHealth::Critical
        } else if unavailable > 0 {
            SystemHealth::Degraded
        } else {
            SystemHealth::Healthy
        };

        SystemOverview {
            total_agents: agents.len(),
            agents_by_status,
            average_response_time,
            average_success_rate,
            total_tasks: self.queue.len().await,
            tasks_by_status: self.queue.status_counts().await,
            health,
        }
    }

    /// Full agent record plus its 10 most recent tasks, or `None`.
    pub async fn get_agent_details(&self, id: &str) -> Option<AgentDetails> {
        let agent = self.registry.get(id).await?;
        let recent_tasks = self.queue.recent_for_agent(id, 10).await;
        Some(AgentDetails { agent, recent_tasks })
    }

    /// Remove terminal tasks older than `max_age_hours`; returns the count.
    pub async fn cleanup_old_tasks(&self, max_age_hours: i64) -> usize {
        let cutoff = Utc::now() - chrono::Duration::hours(max_age_hours);
        let removed = self.queue.remove_terminal_older_than(cutoff).await;
        if removed > 0 {
            info!(removed, "cleaned up old tasks");
        }
        removed
    }

    /// Run one liveness sweep outside the periodic schedule. Returns the
    /// number of agents marked offline.
    pub async fn check_agent_health(&self) -> usize {
        monitor::sweep(
            &self.registry,
            &self.queue,
            &self.sink,
            self.config.heartbeat_timeout_secs,
        )
        .await
    }

    /// Snapshot of one task.
    pub async fn task(&self, id: Uuid) -> Option<TaskRecord> {
        self.queue.get(id).await
    }

    /// Snapshot of one agent.
    pub async fn agent(&self, id: &str) -> Option<AgentRecord> {
        self.registry.get(id).await
    }
}
