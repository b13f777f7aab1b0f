use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Lifecycle status of a registered worker agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    /// Registered and ready, no tasks in flight.
    Idle,
    /// At least one task currently executing.
    Processing,
    /// The agent reported itself unhealthy.
    Error,
    /// No heartbeat within the liveness timeout.
    Offline,
}

impl AgentStatus {
    /// Whether an agent in this status may be assigned new work.
    pub fn can_accept_tasks(self) -> bool {
        matches!(self, AgentStatus::Idle | AgentStatus::Processing)
    }

    /// Whether a transition from `self` to `next` is legal.
    ///
    /// An offline agent can only come back through a heartbeat
    /// (Offline → Idle); every other status may move freely. Same-status
    /// updates count as a refresh and are always allowed.
    pub fn can_transition_to(self, next: AgentStatus) -> bool {
        match self {
            AgentStatus::Offline => matches!(next, AgentStatus::Offline | AgentStatus::Idle),
            _ => true,
        }
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentStatus::Idle => write!(f, "idle"),
            AgentStatus::Processing => write!(f, "processing"),
            AgentStatus::Error => write!(f, "error"),
            AgentStatus::Offline => write!(f, "offline"),
        }
    }
}

/// Rolling performance aggregates for a single agent.
///
/// Both derived fields (`average_response_time`, `success_rate`) are
/// recomputed in the same call that mutates their inputs, so a cloned
/// snapshot is never internally inconsistent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMetrics {
    /// Total executions recorded, successes and failures alike.
    pub tasks_completed: u64,
    /// Executions that ended in failure.
    pub error_count: u64,
    /// Accumulated execution time of successful tasks, in seconds.
    pub total_execution_time: f64,
    /// Derived: `total_execution_time / tasks_completed`, in milliseconds.
    pub average_response_time: f64,
    /// Derived: `(tasks_completed - error_count) / tasks_completed * 100`.
    pub success_rate: f64,
    /// When the last execution result was recorded.
    pub last_activity: DateTime<Utc>,
}

impl AgentMetrics {
    /// Fresh aggregates for a newly registered agent.
    pub fn new() -> Self {
        Self {
            tasks_completed: 0,
            error_count: 0,
            total_execution_time: 0.0,
            average_response_time: 0.0,
            success_rate: 100.0,
            last_activity: Utc::now(),
        }
    }

    /// Fold one finished execution into the aggregates.
    ///
    /// `execution_time` is in seconds and only contributes on success;
    /// failures count toward `error_count` and the rates.
    pub fn record(&mut self, execution_time: f64, success: bool) {
        self.tasks_completed += 1;
        if success {
            self.total_execution_time += execution_time;
            self.average_response_time =
                self.total_execution_time / self.tasks_completed as f64 * 1000.0;
        } else {
            self.error_count += 1;
        }
        self.success_rate = self.tasks_completed.saturating_sub(self.error_count) as f64
            / self.tasks_completed as f64
            * 100.0;
        self.last_activity = Utc::now();
    }

    /// Failed share of all recorded executions, as a percentage.
    pub fn error_rate(&self) -> f64 {
        if self.tasks_completed == 0 {
            return 0.0;
        }
        self.error_count as f64 / self.tasks_completed as f64 * 100.0
    }
}

impl Default for AgentMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Partial metrics patch carried by an agent heartbeat.
///
/// Only fields that are present overwrite the stored value; everything
/// else is left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsUpdate {
    /// Replacement for `tasks_completed`, if present.
    pub tasks_completed: Option<u64>,
    /// Replacement for `error_count`, if present.
    pub error_count: Option<u64>,
    /// Replacement for `total_execution_time`, if present.
    pub total_execution_time: Option<f64>,
    /// Replacement for `average_response_time`, if present.
    pub average_response_time: Option<f64>,
    /// Replacement for `success_rate`, if present.
    pub success_rate: Option<f64>,
}

impl MetricsUpdate {
    /// Apply the present fields onto `metrics` and refresh `last_activity`.
    pub fn apply(&self, metrics: &mut AgentMetrics) {
        if let Some(v) = self.tasks_completed {
            metrics.tasks_completed = v;
        }
        if let Some(v) = self.error_count {
            metrics.error_count = v;
        }
        if let Some(v) = self.total_execution_time {
            metrics.total_execution_time = v;
        }
        if let Some(v) = self.average_response_time {
            metrics.average_response_time = v;
        }
        if let Some(v) = self.success_rate {
            metrics.success_rate = v;
        }
        metrics.last_activity = Utc::now();
    }
}

/// A registered worker agent and its live scheduling state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    /// Caller-supplied unique identifier.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Current lifecycle status.
    pub status: AgentStatus,
    /// Opaque tags describing the kinds of work this agent can perform.
    pub capabilities: HashSet<String>,
    /// Concurrency ceiling for this agent.
    pub max_concurrent: u32,
    /// Number of tasks currently executing on this agent.
    pub current_count: u32,
    /// Derived: `current_count / max_concurrent * 100`. Refreshed by every
    /// mutator that touches the in-flight count.
    pub load_percentage: f64,
    /// Rolling performance aggregates.
    pub metrics: AgentMetrics,
    /// Last liveness signal.
    pub last_heartbeat: DateTime<Utc>,
    /// Description of the task presently running, for display only.
    pub current_task: Option<String>,
}

impl AgentRecord {
    /// Create an idle agent with a fresh heartbeat.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        capabilities: impl IntoIterator<Item = String>,
        max_concurrent: u32,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status: AgentStatus::Idle,
            capabilities: capabilities.into_iter().collect(),
            max_concurrent,
            current_count: 0,
            load_percentage: 0.0,
            metrics: AgentMetrics::new(),
            last_heartbeat: Utc::now(),
            current_task: None,
        }
    }

    /// Whether the agent is below its concurrency ceiling.
    pub fn has_capacity(&self) -> bool {
        self.current_count < self.max_concurrent
    }

    /// Whether the agent's capability set covers every required tag.
    pub fn can_handle(&self, required: &[String]) -> bool {
        required.iter().all(|c| self.capabilities.contains(c))
    }

    /// Recompute `load_percentage` from the in-flight count.
    pub fn refresh_load(&mut self) {
        self.load_percentage = if self.max_concurrent == 0 {
            0.0
        } else {
            f64::from(self.current_count) / f64::from(self.max_concurrent) * 100.0
        };
    }
}
