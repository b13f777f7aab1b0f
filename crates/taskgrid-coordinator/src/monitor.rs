use crate::events::{self, AGENT_STATUS, TASK_COMPLETION};
use crate::queue::TaskQueue;
use crate::registry::AgentRegistry;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use taskgrid_core::EventSink;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

/// Periodic liveness sweep over the agent registry, independent of the
/// dispatcher loop.
pub(crate) struct HealthMonitor {
    pub registry: Arc<AgentRegistry>,
    pub queue: Arc<TaskQueue>,
    pub sink: Arc<dyn EventSink>,
    pub heartbeat_timeout_secs: u64,
    pub interval_secs: u64,
    pub running: Arc<AtomicBool>,
    pub shutdown: watch::Receiver<bool>,
}

impl HealthMonitor {
    /// Sweep on a fixed interval until shut down.
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(Duration::from_secs(self.interval_secs.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await; // the first tick fires immediately
        info!("health monitor started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if !self.running.load(Ordering::SeqCst) {
                        break;
                    }
                    sweep(&self.registry, &self.queue, &self.sink, self.heartbeat_timeout_secs)
                        .await;
                }
                _ = self.shutdown.changed() => break,
            }
        }
        info!("health monitor stopped");
    }
}

/// One liveness pass: agents silent past the timeout go Offline with their
/// accounting reset, their Running tasks are failed (nothing is left to
/// complete them), and one `agent_status` event fires per transition.
/// Returns the number of agents transitioned.
pub(crate) async fn sweep(
    registry: &Arc<AgentRegistry>,
    queue: &Arc<TaskQueue>,
    sink: &Arc<dyn EventSink>,
    heartbeat_timeout_secs: u64,
) -> usize {
    let timeout = i64::try_from(heartbeat_timeout_secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .unwrap_or(chrono::Duration::MAX);
    let stale = registry.mark_stale_offline(timeout).await;
    for agent in &stale {
        warn!(agent_id = %agent.id, "agent heartbeat timed out, marking offline");
        for task in queue.fail_running_for_agent(&agent.id, "Agent offline").await {
            events::emit_json(sink, TASK_COMPLETION, &task).await;
        }
        events::emit_json(sink, AGENT_STATUS, agent).await;
    }
    stale.len()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use taskgrid_core::{AgentStatus, NullEventSink, TaskPriority, TaskRecord, TaskStatus};

    async fn setup() -> (Arc<AgentRegistry>, Arc<TaskQueue>, Arc<dyn EventSink>) {
        let registry = Arc::new(AgentRegistry::new());
        registry
            .register("a1", "Worker 1", Vec::new(), 1)
            .await
            .unwrap();
        let sink: Arc<dyn EventSink> = Arc::new(NullEventSink);
        (registry, Arc::new(TaskQueue::new()), sink)
    }

    #[tokio::test]
    async fn test_sweep_marks_silent_agents_offline_once() {
        let (registry, queue, sink) = setup().await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(sweep(&registry, &queue, &sink, 0).await, 1);
        assert_eq!(
            registry.get("a1").await.unwrap().status,
            AgentStatus::Offline
        );
        // Already offline: nothing transitions on the next pass.
        assert_eq!(sweep(&registry, &queue, &sink, 0).await, 0);
    }

    #[tokio::test]
    async fn test_sweep_fails_running_tasks_of_offline_agent() {
        let (registry, queue, sink) = setup().await;
        let entry = queue
            .insert(TaskRecord::new(
                "a1",
                "job",
                "a job",
                serde_json::Value::Null,
                TaskPriority::Medium,
            ))
            .await;
        queue.mark_running(entry.task_id).await.unwrap();
        registry.try_begin_task("a1", "a job").await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        sweep(&registry, &queue, &sink, 0).await;

        let task = queue.get(entry.task_id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.error.as_deref(), Some("Agent offline"));
        let agent = registry.get("a1").await.unwrap();
        assert_eq!(agent.current_count, 0);
        assert!(agent.current_task.is_none());
    }

    #[tokio::test]
    async fn test_sweep_spares_live_agents() {
        let (registry, queue, sink) = setup().await;
        assert_eq!(sweep(&registry, &queue, &sink, 300).await, 0);
        assert_eq!(registry.get("a1").await.unwrap().status, AgentStatus::Idle);
    }
}
