use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Relative urgency of a task. Ordering follows declaration order, so
/// `Critical` outranks everything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    /// Background work.
    Low,
    /// Default urgency.
    Medium,
    /// Jump ahead of routine work.
    High,
    /// Dispatched before anything else.
    Critical,
}

impl std::fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskPriority::Low => write!(f, "low"),
            TaskPriority::Medium => write!(f, "medium"),
            TaskPriority::High => write!(f, "high"),
            TaskPriority::Critical => write!(f, "critical"),
        }
    }
}

/// Execution state of a task.
///
/// Transitions are monotonic: `Queued → Running → {Completed | Failed}`,
/// with `Queued → Failed` allowed when the bound agent vanishes before
/// dispatch. Terminal records are immutable except for cleanup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Waiting in the priority queue.
    Queued,
    /// Handed to the execution hook.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
}

impl TaskStatus {
    /// Whether this status ends the task lifecycle.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Whether a transition from `self` to `next` is legal.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Queued, TaskStatus::Running)
                | (TaskStatus::Queued, TaskStatus::Failed)
                | (TaskStatus::Running, TaskStatus::Completed)
                | (TaskStatus::Running, TaskStatus::Failed)
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Queued => write!(f, "queued"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Outcome recorded when the execution hook returns successfully.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    /// Whether the execution succeeded.
    pub success: bool,
    /// Elapsed execution time in seconds, as reported by the hook.
    pub execution_time: f64,
    /// Human-readable completion message.
    pub message: String,
}

/// A unit of work bound to a worker agent at submission time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Unique task identifier.
    pub id: Uuid,
    /// The agent selected for this task when it was submitted.
    pub agent_id: String,
    /// Caller-defined task category.
    pub task_type: String,
    /// Human-readable description.
    pub description: String,
    /// Opaque payload forwarded to the execution hook.
    pub parameters: serde_json::Value,
    /// Dispatch urgency.
    pub priority: TaskPriority,
    /// Current lifecycle state.
    pub status: TaskStatus,
    /// When the task was submitted.
    pub created_at: DateTime<Utc>,
    /// When dispatch handed it to the execution hook.
    pub started_at: Option<DateTime<Utc>>,
    /// When it reached a terminal state.
    pub completed_at: Option<DateTime<Utc>>,
    /// Outcome, present once completed.
    pub result: Option<TaskResult>,
    /// Failure message, present once failed.
    pub error: Option<String>,
}

impl TaskRecord {
    /// Create a queued task bound to `agent_id`.
    pub fn new(
        agent_id: impl Into<String>,
        task_type: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
        priority: TaskPriority,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            agent_id: agent_id.into(),
            task_type: task_type.into(),
            description: description.into(),
            parameters,
            priority,
            status: TaskStatus::Queued,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
        }
    }
}
