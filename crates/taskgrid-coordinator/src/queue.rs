use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::Duration;
use taskgrid_core::{TaskPriority, TaskRecord, TaskResult, TaskStatus};
use tokio::sync::{Mutex, Notify};
use uuid::Uuid;

/// Heap key for a pending task: priority first, then submission order.
///
/// The sequence counter makes equal-priority entries comparable without
/// ever ordering task payloads, and survives a re-queue unchanged so a
/// pushed-back task keeps its place relative to later arrivals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueEntry {
    /// Dispatch urgency, compared first.
    pub priority: TaskPriority,
    /// Monotonic insertion counter; lower dispatches first among equals.
    pub sequence: u64,
    /// The task this entry refers to.
    pub task_id: Uuid,
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            // earlier submissions win among equal priorities
            .then_with(|| other.sequence.cmp(&self.sequence))
            .then_with(|| self.task_id.cmp(&other.task_id))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct QueueState {
    records: HashMap<Uuid, TaskRecord>,
    pending: BinaryHeap<QueueEntry>,
}

/// Priority-ordered store of pending tasks plus the full task ledger.
///
/// Owns every [`TaskRecord`] the coordinator knows about; the heap holds
/// only `(priority, sequence, id)` keys for tasks still waiting to
/// dispatch, and a [`Notify`] wakes the dispatcher when new work arrives.
pub struct TaskQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    sequence: AtomicU64,
}

impl TaskQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                records: HashMap::new(),
                pending: BinaryHeap::new(),
            }),
            notify: Notify::new(),
            sequence: AtomicU64::new(0),
        }
    }

    /// Store a new task and enqueue it for dispatch.
    pub async fn insert(&self, task: TaskRecord) -> QueueEntry {
        let entry = QueueEntry {
            priority: task.priority,
            sequence: self.sequence.fetch_add(1, AtomicOrdering::Relaxed),
            task_id: task.id,
        };
        {
            let mut state = self.state.lock().await;
            state.records.insert(task.id, task);
            state.pending.push(entry);
        }
        self.notify.notify_one();
        entry
    }

    /// Push an entry back unchanged (its target agent was saturated).
    pub async fn requeue(&self, entry: QueueEntry) {
        self.state.lock().await.pending.push(entry);
        self.notify.notify_one();
    }

    /// Wake any dispatcher blocked in [`pop_pending`](Self::pop_pending),
    /// e.g. so a shutdown check runs immediately.
    pub fn nudge(&self) {
        self.notify.notify_waiters();
    }

    /// Pop the highest-priority pending entry, waiting up to `wait`.
    ///
    /// Entries whose task is no longer Queued (failed while still on the
    /// heap) are discarded transparently. Returns `None` on timeout so the
    /// caller can re-check its shutdown flag.
    pub async fn pop_pending(&self, wait: Duration) -> Option<QueueEntry> {
        if let Some(entry) = self.try_pop().await {
            return Some(entry);
        }
        match tokio::time::timeout(wait, self.notify.notified()).await {
            Ok(()) => self.try_pop().await,
            Err(_) => None,
        }
    }

    async fn try_pop(&self) -> Option<QueueEntry> {
        let mut state = self.state.lock().await;
        while let Some(entry) = state.pending.pop() {
            match state.records.get(&entry.task_id) {
                Some(task) if task.status == TaskStatus::Queued => return Some(entry),
                _ => continue, // stale heap entry
            }
        }
        None
    }

    /// Snapshot of one task.
    pub async fn get(&self, id: Uuid) -> Option<TaskRecord> {
        self.state.lock().await.records.get(&id).cloned()
    }

    /// Queued → Running with `started_at = now`. `None` if the transition
    /// is not legal from the task's current state.
    pub async fn mark_running(&self, id: Uuid) -> Option<TaskRecord> {
        let mut state = self.state.lock().await;
        let task = state.records.get_mut(&id)?;
        if !task.status.can_transition_to(TaskStatus::Running) {
            return None;
        }
        task.status = TaskStatus::Running;
        task.started_at = Some(Utc::now());
        Some(task.clone())
    }

    /// Running → Completed with the hook's result attached.
    pub async fn mark_completed(&self, id: Uuid, result: TaskResult) -> Option<TaskRecord> {
        let mut state = self.state.lock().await;
        let task = state.records.get_mut(&id)?;
        if !task.status.can_transition_to(TaskStatus::Completed) {
            return None;
        }
        task.status = TaskStatus::Completed;
        task.completed_at = Some(Utc::now());
        task.result = Some(result);
        Some(task.clone())
    }

    /// {Queued, Running} → Failed with the failure message attached.
    pub async fn mark_failed(&self, id: Uuid, error: impl Into<String>) -> Option<TaskRecord> {
        let mut state = self.state.lock().await;
        Self::fail_locked(&mut state, id, &error.into())
    }

    fn fail_locked(state: &mut QueueState, id: Uuid, error: &str) -> Option<TaskRecord> {
        let task = state.records.get_mut(&id)?;
        if !task.status.can_transition_to(TaskStatus::Failed) {
            return None;
        }
        task.status = TaskStatus::Failed;
        task.completed_at = Some(Utc::now());
        task.error = Some(error.to_string());
        Some(task.clone())
    }

    /// Fail every Queued task bound to `agent_id` (unregister path).
    pub async fn fail_queued_for_agent(&self, agent_id: &str, reason: &str) -> Vec<TaskRecord> {
        self.fail_for_agent(agent_id, TaskStatus::Queued, reason).await
    }

    /// Fail every Running task bound to `agent_id` (offline path): no owner
    /// is left to complete them once the agent is gone.
    pub async fn fail_running_for_agent(&self, agent_id: &str, reason: &str) -> Vec<TaskRecord> {
        self.fail_for_agent(agent_id, TaskStatus::Running, reason).await
    }

    async fn fail_for_agent(
        &self,
        agent_id: &str,
        from: TaskStatus,
        reason: &str,
    ) -> Vec<TaskRecord> {
        let mut state = self.state.lock().await;
        let ids: Vec<Uuid> = state
            .records
            .values()
            .filter(|t| t.agent_id == agent_id && t.status == from)
            .map(|t| t.id)
            .collect();
        ids.into_iter()
            .filter_map(|id| Self::fail_locked(&mut state, id, reason))
            .collect()
    }

    /// Newest-first slice of the agent's tasks, at most `limit` entries.
    pub async fn recent_for_agent(&self, agent_id: &str, limit: usize) -> Vec<TaskRecord> {
        let state = self.state.lock().await;
        let mut tasks: Vec<TaskRecord> = state
            .records
            .values()
            .filter(|t| t.agent_id == agent_id)
            .cloned()
            .collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        tasks.truncate(limit);
        tasks
    }

    /// Drop terminal tasks whose completion predates `cutoff`; Queued and
    /// Running tasks are never removed regardless of age.
    pub async fn remove_terminal_older_than(&self, cutoff: DateTime<Utc>) -> usize {
        let mut state = self.state.lock().await;
        let before = state.records.len();
        state.records.retain(|_, t| {
            !(t.status.is_terminal() && t.completed_at.is_some_and(|c| c < cutoff))
        });
        before - state.records.len()
    }

    /// Task counts keyed by status string.
    pub async fn status_counts(&self) -> HashMap<String, usize> {
        let state = self.state.lock().await;
        let mut counts: HashMap<String, usize> = HashMap::new();
        for task in state.records.values() {
            *counts.entry(task.status.to_string()).or_default() += 1;
        }
        counts
    }

    /// Total number of known tasks, pending and terminal alike.
    pub async fn len(&self) -> usize {
        self.state.lock().await.records.len()
    }

    /// Whether the ledger holds no tasks at all.
    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.records.is_empty()
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}
