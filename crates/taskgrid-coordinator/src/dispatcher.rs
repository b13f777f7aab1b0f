use crate::alerts;
use crate::config::{CoordinatorConfig, PerformanceThresholds};
use crate::events::{self, AGENT_STATUS, PERFORMANCE_ALERT, TASK_COMPLETION};
use crate::queue::TaskQueue;
use crate::registry::AgentRegistry;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use taskgrid_core::{
    AgentRecord, EventSink, TaskExecutor, TaskRecord, TaskResult, TaskgridError, TaskgridResult,
};
use tracing::{debug, error, info, warn};

/// The single scheduling loop: dequeues pending tasks, re-validates agent
/// capacity, and launches bounded concurrent executions.
pub(crate) struct Dispatcher {
    pub registry: Arc<AgentRegistry>,
    pub queue: Arc<TaskQueue>,
    pub executor: Arc<dyn TaskExecutor>,
    pub sink: Arc<dyn EventSink>,
    pub config: Arc<CoordinatorConfig>,
    pub running: Arc<AtomicBool>,
}

impl Dispatcher {
    /// Run until the shared running flag clears.
    ///
    /// A failed iteration is logged and followed by a short back-off; the
    /// loop never terminates on a single bad iteration.
    pub async fn run(self) {
        info!("dispatcher loop started");
        while self.running.load(Ordering::SeqCst) {
            if let Err(e) = self.step().await {
                let e = TaskgridError::Queue(e.to_string());
                error!(error = %e, "dispatcher iteration failed, backing off");
                tokio::time::sleep(Duration::from_millis(self.config.error_backoff_ms)).await;
            }
        }
        info!("dispatcher loop stopped");
    }

    async fn step(&self) -> TaskgridResult<()> {
        let wait = Duration::from_secs(self.config.queue_poll_interval_secs);
        let Some(entry) = self.queue.pop_pending(wait).await else {
            return Ok(()); // timeout: fall through to the shutdown check
        };
        let Some(task) = self.queue.get(entry.task_id).await else {
            return Ok(()); // cleaned up while pending
        };

        if self.registry.get(&task.agent_id).await.is_none() {
            // the bound agent vanished between submission and dispatch
            if let Some(failed) = self
                .queue
                .mark_failed(task.id, "Agent no longer available")
                .await
            {
                warn!(task_id = %task.id, agent_id = %task.agent_id, "bound agent gone, task failed");
                events::emit(&self.sink, TASK_COMPLETION, serde_json::to_value(&failed)?).await;
            }
            return Ok(());
        }

        match self
            .registry
            .try_begin_task(&task.agent_id, &task.description)
            .await
        {
            Some(agent) => self.dispatch(task, agent).await,
            None => {
                // saturated: push back at its original key and yield briefly
                debug!(task_id = %entry.task_id, agent_id = %task.agent_id, "agent at capacity, re-queueing");
                self.queue.requeue(entry).await;
                tokio::time::sleep(Duration::from_millis(self.config.saturation_backoff_ms)).await;
                Ok(())
            }
        }
    }

    /// Hand one task to the execution hook without blocking the loop.
    async fn dispatch(&self, task: TaskRecord, agent: AgentRecord) -> TaskgridResult<()> {
        let Some(running) = self.queue.mark_running(task.id).await else {
            // the task reached a terminal state between pop and claim
            self.registry.release_slot(&task.agent_id).await;
            return Ok(());
        };

        info!(
            task_id = %running.id,
            agent_id = %agent.id,
            priority = %running.priority,
            "dispatching task"
        );
        events::emit(&self.sink, AGENT_STATUS, serde_json::to_value(&agent)?).await;
        events::emit(&self.sink, TASK_COMPLETION, serde_json::to_value(&running)?).await;

        let registry = Arc::clone(&self.registry);
        let queue = Arc::clone(&self.queue);
        let sink = Arc::clone(&self.sink);
        let executor = Arc::clone(&self.executor);
        let thresholds = self.config.thresholds.clone();
        tokio::spawn(async move {
            let outcome = executor.execute(&running).await;
            finish_execution(registry, queue, sink, thresholds, running, outcome).await;
        });
        Ok(())
    }
}

/// Completion callback shared by the success and failure paths: finalize
/// the task record, fold the result into the agent's metrics, release the
/// concurrency slot, and publish the resulting events.
async fn finish_execution(
    registry: Arc<AgentRegistry>,
    queue: Arc<TaskQueue>,
    sink: Arc<dyn EventSink>,
    thresholds: PerformanceThresholds,
    task: TaskRecord,
    outcome: TaskgridResult<f64>,
) {
    let (final_task, execution_time, success) = match outcome {
        Ok(elapsed) => {
            let result = TaskResult {
                success: true,
                execution_time: elapsed,
                message: format!("completed in {elapsed:.2}s"),
            };
            (queue.mark_completed(task.id, result).await, elapsed, true)
        }
        Err(e) => {
            warn!(task_id = %task.id, agent_id = %task.agent_id, error = %e, "task execution failed");
            (queue.mark_failed(task.id, e.to_string()).await, 0.0, false)
        }
    };

    let agent = registry
        .complete_task(&task.agent_id, execution_time, success)
        .await;

    if let Some(final_task) = &final_task {
        events::emit_json(&sink, TASK_COMPLETION, final_task).await;
    }
    if let Some(agent) = agent {
        events::emit_json(&sink, AGENT_STATUS, &agent).await;
        let violations = alerts::check_thresholds(&agent, &thresholds);
        if !violations.is_empty() {
            warn!(
                agent_id = %agent.id,
                violations = violations.len(),
                "performance thresholds violated"
            );
            events::emit(&sink, PERFORMANCE_ALERT, alerts::alert_payload(&agent, &violations))
                .await;
        }
    }
}
