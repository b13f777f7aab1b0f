use chrono::Utc;
use std::collections::HashMap;
use taskgrid_core::{
    AgentRecord, AgentStatus, MetricsUpdate, TaskgridError, TaskgridResult,
};
use tokio::sync::RwLock;

/// CRUD and status transitions for the worker agent pool.
///
/// Every mutator runs inside a single write-lock critical section and
/// returns a cloned snapshot, so callers can emit events without holding
/// the lock and concurrent completion callbacks and health sweeps never
/// interleave on a record.
pub struct AgentRegistry {
    agents: RwLock<HashMap<String, AgentRecord>>,
}

impl AgentRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            agents: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new idle agent with a fresh heartbeat.
    pub async fn register(
        &self,
        id: impl Into<String>,
        name: impl Into<String>,
        capabilities: Vec<String>,
        max_concurrent: u32,
    ) -> TaskgridResult<AgentRecord> {
        let id = id.into();
        if max_concurrent == 0 {
            return Err(TaskgridError::Config(format!(
                "agent {id}: max_concurrent must be at least 1"
            )));
        }
        let mut agents = self.agents.write().await;
        if agents.contains_key(&id) {
            return Err(TaskgridError::DuplicateAgent(id));
        }
        let record = AgentRecord::new(id.clone(), name, capabilities, max_concurrent);
        agents.insert(id, record.clone());
        Ok(record)
    }

    /// Delete an agent and return its final record.
    pub async fn remove(&self, id: &str) -> TaskgridResult<AgentRecord> {
        self.agents
            .write()
            .await
            .remove(id)
            .ok_or_else(|| TaskgridError::UnknownAgent(id.to_string()))
    }

    /// Snapshot of one agent.
    pub async fn get(&self, id: &str) -> Option<AgentRecord> {
        self.agents.read().await.get(id).cloned()
    }

    /// Snapshot of the whole pool.
    pub async fn snapshot(&self) -> Vec<AgentRecord> {
        self.agents.read().await.values().cloned().collect()
    }

    /// Number of registered agents.
    pub async fn count(&self) -> usize {
        self.agents.read().await.len()
    }

    /// Apply a validated status transition.
    ///
    /// Entering Offline zeroes the in-flight count and clears the current
    /// task so the offline invariant holds no matter how the transition
    /// was reached.
    pub async fn set_status(
        &self,
        id: &str,
        status: AgentStatus,
        current_task: Option<String>,
    ) -> TaskgridResult<AgentRecord> {
        let mut agents = self.agents.write().await;
        let agent = agents
            .get_mut(id)
            .ok_or_else(|| TaskgridError::UnknownAgent(id.to_string()))?;
        if !agent.status.can_transition_to(status) {
            return Err(TaskgridError::InvalidTransition(format!(
                "agent {id}: {} -> {status}",
                agent.status
            )));
        }
        agent.status = status;
        if let Some(task) = current_task {
            agent.current_task = Some(task);
        }
        if status == AgentStatus::Offline {
            agent.current_count = 0;
            agent.current_task = None;
        }
        agent.refresh_load();
        agent.last_heartbeat = Utc::now();
        Ok(agent.clone())
    }

    /// Record a liveness signal, merging any supplied metric fields.
    ///
    /// An offline agent is resurrected to Idle. Returns `None` for an
    /// unknown id.
    pub async fn heartbeat(
        &self,
        id: &str,
        metrics: Option<&MetricsUpdate>,
    ) -> Option<AgentRecord> {
        let mut agents = self.agents.write().await;
        let agent = agents.get_mut(id)?;
        agent.last_heartbeat = Utc::now();
        if let Some(patch) = metrics {
            patch.apply(&mut agent.metrics);
        }
        if agent.status == AgentStatus::Offline {
            agent.status = AgentStatus::Idle;
        }
        Some(agent.clone())
    }

    /// Capacity re-check and slot claim at dispatch time.
    ///
    /// Atomically: verify the agent exists, accepts work, and is under its
    /// ceiling; then increment the in-flight count, promote Idle to
    /// Processing, and record the task description. The only place
    /// `current_count` ever increments.
    pub async fn try_begin_task(&self, id: &str, description: &str) -> Option<AgentRecord> {
        let mut agents = self.agents.write().await;
        let agent = agents.get_mut(id)?;
        if !agent.status.can_accept_tasks() || !agent.has_capacity() {
            return None;
        }
        agent.current_count += 1;
        if agent.status == AgentStatus::Idle {
            agent.status = AgentStatus::Processing;
        }
        agent.current_task = Some(description.to_string());
        agent.refresh_load();
        Some(agent.clone())
    }

    /// Record an execution result and release the slot it held.
    ///
    /// Folds the result into the agent's metrics, decrements the in-flight
    /// count, and drops a Processing agent back to Idle when nothing is
    /// left in flight.
    pub async fn complete_task(
        &self,
        id: &str,
        execution_time: f64,
        success: bool,
    ) -> Option<AgentRecord> {
        let mut agents = self.agents.write().await;
        let agent = agents.get_mut(id)?;
        agent.metrics.record(execution_time, success);
        Some(Self::release(agent))
    }

    /// Undo a [`try_begin_task`](Self::try_begin_task) claim without
    /// recording a result (the task reached a terminal state before the
    /// execution hook ran).
    pub async fn release_slot(&self, id: &str) -> Option<AgentRecord> {
        let mut agents = self.agents.write().await;
        let agent = agents.get_mut(id)?;
        Some(Self::release(agent))
    }

    fn release(agent: &mut AgentRecord) -> AgentRecord {
        agent.current_count = agent.current_count.saturating_sub(1);
        if agent.current_count == 0 && agent.status == AgentStatus::Processing {
            agent.status = AgentStatus::Idle;
            agent.current_task = None;
        }
        agent.refresh_load();
        agent.clone()
    }

    /// Liveness sweep: mark every agent silent past `timeout` as Offline,
    /// zero its accounting, and return the transitioned snapshots.
    pub async fn mark_stale_offline(&self, timeout: chrono::Duration) -> Vec<AgentRecord> {
        let now = Utc::now();
        let mut transitioned = Vec::new();
        let mut agents = self.agents.write().await;
        for agent in agents.values_mut() {
            if agent.status != AgentStatus::Offline && now - agent.last_heartbeat > timeout {
                agent.status = AgentStatus::Offline;
                agent.current_task = None;
                agent.current_count = 0;
                agent.refresh_load();
                transitioned.push(agent.clone());
            }
        }
        transitioned
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}
