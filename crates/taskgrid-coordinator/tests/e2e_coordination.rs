//! End-to-end coordination tests.
//!
//! Drives a real [`Coordinator`] with its dispatcher loop against a mock
//! execution hook and a recording event sink. Checks: the full
//! submit → dispatch → complete flow, the per-agent concurrency ceiling,
//! priority and FIFO dispatch order, failure metrics and threshold alerts,
//! liveness sweeps, and heartbeat resurrection.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use taskgrid_core::{
    AgentStatus, EventSink, TaskExecutor, TaskPriority, TaskRecord, TaskStatus, TaskgridError,
    TaskgridResult,
};
use taskgrid_coordinator::{events, Coordinator, CoordinatorConfig, PerformanceThresholds};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .try_init();
}

// ---------------------------------------------------------------------------
// Recording sink — captures every published event for assertions
// ---------------------------------------------------------------------------

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<(String, Value)>>,
}

impl RecordingSink {
    fn on_channel(&self, channel: &str) -> Vec<Value> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| c == channel)
            .map(|(_, p)| p.clone())
            .collect()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn publish(&self, channel: &str, payload: Value) -> TaskgridResult<()> {
        self.events
            .lock()
            .unwrap()
            .push((channel.to_string(), payload));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Mock executor — configurable latency, failures, and concurrency tracking
// ---------------------------------------------------------------------------

struct MockExecutor {
    /// Wall-clock delay per execution.
    delay: Duration,
    /// Reported execution time in seconds; defaults to the real delay.
    report_secs: Option<f64>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockExecutor {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            report_secs: None,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    fn reporting(delay: Duration, report_secs: f64) -> Self {
        Self {
            report_secs: Some(report_secs),
            ..Self::new(delay)
        }
    }
}

#[async_trait]
impl TaskExecutor for MockExecutor {
    async fn execute(&self, task: &TaskRecord) -> TaskgridResult<f64> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if task.description.contains("boom") {
            return Err(TaskgridError::Execution("simulated blow-up".to_string()));
        }
        Ok(self.report_secs.unwrap_or_else(|| self.delay.as_secs_f64()))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn test_config() -> CoordinatorConfig {
    CoordinatorConfig {
        saturation_backoff_ms: 20,
        ..CoordinatorConfig::default()
    }
}

async fn wait_terminal(coordinator: &Coordinator, id: Uuid) -> TaskRecord {
    for _ in 0..500 {
        if let Some(task) = coordinator.task(id).await {
            if task.status.is_terminal() {
                // the completion callback finalizes the task before it folds
                // metrics and publishes events; give it a moment to finish
                tokio::time::sleep(Duration::from_millis(50)).await;
                return coordinator.task(id).await.unwrap_or(task);
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("task {id} never reached a terminal state");
}

// ---------------------------------------------------------------------------
// Test: Happy path — submit, dispatch, complete, observe events
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_e2e_submit_and_complete() {
    init_tracing();
    let sink = Arc::new(RecordingSink::default());
    let executor = Arc::new(MockExecutor::new(Duration::from_millis(20)));
    let coordinator = Coordinator::new(test_config(), executor, sink.clone());

    coordinator
        .register_agent("a1", "Worker 1", vec!["codegen".into()], 2)
        .await
        .unwrap();
    coordinator.start().await;

    let task_id = coordinator
        .submit_task(
            "codegen",
            "generate a parser",
            serde_json::json!({"lang": "rust"}),
            TaskPriority::High,
            &["codegen".to_string()],
            None,
        )
        .await
        .unwrap();

    let task = wait_terminal(&coordinator, task_id).await;
    coordinator.stop().await;

    assert_eq!(task.status, TaskStatus::Completed);
    let result = task.result.unwrap();
    assert!(result.success);
    assert!(result.execution_time > 0.0);
    assert!(task.started_at.is_some() && task.completed_at.is_some());

    // Metrics folded into the agent.
    let agent = coordinator.agent("a1").await.unwrap();
    assert_eq!(agent.metrics.tasks_completed, 1);
    assert_eq!(agent.metrics.error_count, 0);
    assert_eq!(agent.metrics.success_rate, 100.0);
    assert_eq!(agent.status, AgentStatus::Idle);
    assert_eq!(agent.current_count, 0);

    // One submission event, and the task crossed the sink both on dispatch
    // and on completion.
    let submitted = sink.on_channel(events::TASK_SUBMITTED);
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0]["status"], "queued");
    assert_eq!(submitted[0]["priority"], "high");

    let completions = sink.on_channel(events::TASK_COMPLETION);
    let statuses: Vec<&str> = completions
        .iter()
        .filter_map(|p| p["status"].as_str())
        .collect();
    assert!(statuses.contains(&"running"));
    assert!(statuses.contains(&"completed"));

    // No alert for a healthy agent.
    assert!(sink.on_channel(events::PERFORMANCE_ALERT).is_empty());

    let overview = coordinator.get_system_overview().await;
    assert_eq!(overview.tasks_by_status.get("completed"), Some(&1));
    assert_eq!(overview.health, taskgrid_coordinator::SystemHealth::Healthy);
}

// ---------------------------------------------------------------------------
// Test: Concurrency ceiling — max_concurrent=1 never overshoots
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_e2e_concurrency_ceiling() {
    init_tracing();
    let sink = Arc::new(RecordingSink::default());
    let executor = Arc::new(MockExecutor::new(Duration::from_millis(80)));
    let coordinator = Coordinator::new(test_config(), executor.clone(), sink);

    coordinator
        .register_agent("a1", "Worker 1", Vec::new(), 1)
        .await
        .unwrap();
    coordinator.start().await;

    let first = coordinator
        .submit_task("job", "first", Value::Null, TaskPriority::Medium, &[], None)
        .await
        .unwrap();
    let second = coordinator
        .submit_task("job", "second", Value::Null, TaskPriority::Medium, &[], None)
        .await
        .unwrap();

    let first = wait_terminal(&coordinator, first).await;
    let second = wait_terminal(&coordinator, second).await;
    coordinator.stop().await;

    assert_eq!(first.status, TaskStatus::Completed);
    assert_eq!(second.status, TaskStatus::Completed);
    // The ceiling held: never more than one execution in flight.
    assert_eq!(executor.max_in_flight.load(Ordering::SeqCst), 1);
    // The second dispatch waited for the first completion.
    assert!(second.started_at.unwrap() >= first.completed_at.unwrap());
}

// ---------------------------------------------------------------------------
// Test: Dispatch order — strict priority, FIFO within a priority
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_e2e_priority_and_fifo_order() {
    init_tracing();
    let sink = Arc::new(RecordingSink::default());
    let executor = Arc::new(MockExecutor::new(Duration::from_millis(10)));
    let coordinator = Coordinator::new(test_config(), executor, sink);

    coordinator
        .register_agent("a1", "Worker 1", Vec::new(), 1)
        .await
        .unwrap();

    // Everything queued before the dispatcher starts, so pop order is the
    // only thing deciding who runs first.
    let low = coordinator
        .submit_task("job", "low", Value::Null, TaskPriority::Low, &[], None)
        .await
        .unwrap();
    let critical = coordinator
        .submit_task("job", "critical", Value::Null, TaskPriority::Critical, &[], None)
        .await
        .unwrap();
    let medium_a = coordinator
        .submit_task("job", "medium a", Value::Null, TaskPriority::Medium, &[], None)
        .await
        .unwrap();
    let medium_b = coordinator
        .submit_task("job", "medium b", Value::Null, TaskPriority::Medium, &[], None)
        .await
        .unwrap();

    coordinator.start().await;
    let low = wait_terminal(&coordinator, low).await;
    let critical = wait_terminal(&coordinator, critical).await;
    let medium_a = wait_terminal(&coordinator, medium_a).await;
    let medium_b = wait_terminal(&coordinator, medium_b).await;
    coordinator.stop().await;

    let started = |t: &TaskRecord| t.started_at.unwrap();
    assert!(started(&critical) < started(&medium_a));
    assert!(started(&medium_a) < started(&medium_b)); // submission order among equals
    assert!(started(&medium_b) < started(&low));
}

// ---------------------------------------------------------------------------
// Test: Failure path — error metrics and a success-rate alert
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_e2e_failure_metrics_and_alert() {
    init_tracing();
    let sink = Arc::new(RecordingSink::default());
    let executor = Arc::new(MockExecutor::new(Duration::from_millis(10)));
    let coordinator = Coordinator::new(test_config(), executor, sink.clone());

    coordinator
        .register_agent("a1", "Worker 1", Vec::new(), 1)
        .await
        .unwrap();
    coordinator.start().await;

    let task_id = coordinator
        .submit_task("job", "boom now", Value::Null, TaskPriority::High, &[], None)
        .await
        .unwrap();
    let task = wait_terminal(&coordinator, task_id).await;
    coordinator.stop().await;

    assert_eq!(task.status, TaskStatus::Failed);
    assert!(task.error.unwrap().contains("simulated blow-up"));
    assert!(task.result.is_none());

    let agent = coordinator.agent("a1").await.unwrap();
    assert_eq!(agent.metrics.tasks_completed, 1);
    assert_eq!(agent.metrics.error_count, 1);
    assert_eq!(agent.metrics.success_rate, 0.0);

    // One evaluation, one alert, naming both rate violations.
    let alerts = sink.on_channel(events::PERFORMANCE_ALERT);
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0]["agent_id"], "a1");
    let messages: Vec<&str> = alerts[0]["alerts"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(Value::as_str)
        .collect();
    assert!(messages.iter().any(|m| m.contains("success rate")));
    assert!(messages.iter().any(|m| m.contains("error rate")));
}

// ---------------------------------------------------------------------------
// Test: Slow agent — response-time threshold alert, and nothing else
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_e2e_response_time_alert() {
    init_tracing();
    let sink = Arc::new(RecordingSink::default());
    // Finishes instantly but reports a 12s execution: 12000ms average.
    let executor = Arc::new(MockExecutor::reporting(Duration::from_millis(5), 12.0));
    let config = CoordinatorConfig {
        thresholds: PerformanceThresholds {
            max_response_time_ms: 5000.0,
            ..PerformanceThresholds::default()
        },
        ..test_config()
    };
    let coordinator = Coordinator::new(config, executor, sink.clone());

    coordinator
        .register_agent("a1", "Worker 1", Vec::new(), 1)
        .await
        .unwrap();
    coordinator.start().await;

    let task_id = coordinator
        .submit_task("job", "slow", Value::Null, TaskPriority::Medium, &[], None)
        .await
        .unwrap();
    wait_terminal(&coordinator, task_id).await;
    coordinator.stop().await;

    let alerts = sink.on_channel(events::PERFORMANCE_ALERT);
    assert_eq!(alerts.len(), 1);
    let messages = alerts[0]["alerts"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].as_str().unwrap().contains("average response time"));
}

// ---------------------------------------------------------------------------
// Test: Liveness — silent agent goes offline exactly once, then resurrects
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_e2e_offline_sweep_and_resurrection() {
    init_tracing();
    let sink = Arc::new(RecordingSink::default());
    let executor = Arc::new(MockExecutor::new(Duration::from_millis(10)));
    let config = CoordinatorConfig {
        heartbeat_timeout_secs: 0,
        ..test_config()
    };
    let coordinator = Coordinator::new(config, executor, sink.clone());

    coordinator
        .register_agent("a1", "Worker 1", Vec::new(), 1)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(coordinator.check_agent_health().await, 1);
    assert_eq!(coordinator.check_agent_health().await, 0);

    let agent = coordinator.agent("a1").await.unwrap();
    assert_eq!(agent.status, AgentStatus::Offline);
    assert_eq!(agent.current_count, 0);
    assert!(agent.current_task.is_none());

    // Exactly one offline transition crossed the sink.
    let offline_events: Vec<Value> = sink
        .on_channel(events::AGENT_STATUS)
        .into_iter()
        .filter(|p| p["status"] == "offline")
        .collect();
    assert_eq!(offline_events.len(), 1);

    // A later heartbeat brings the agent straight back to Idle.
    assert!(coordinator.agent_heartbeat("a1", None).await);
    assert_eq!(
        coordinator.agent("a1").await.unwrap().status,
        AgentStatus::Idle
    );
    let overview = coordinator.get_system_overview().await;
    assert_eq!(overview.health, taskgrid_coordinator::SystemHealth::Healthy);
}

// ---------------------------------------------------------------------------
// Test: Unregister — queued work fails, removal event fires
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_e2e_unregister_fails_pending_work() {
    init_tracing();
    let sink = Arc::new(RecordingSink::default());
    let executor = Arc::new(MockExecutor::new(Duration::from_millis(10)));
    let coordinator = Coordinator::new(test_config(), executor, sink.clone());

    coordinator
        .register_agent("a1", "Worker 1", Vec::new(), 1)
        .await
        .unwrap();
    let task_id = coordinator
        .submit_task("job", "orphan", Value::Null, TaskPriority::Medium, &[], None)
        .await
        .unwrap();

    coordinator.unregister_agent("a1").await.unwrap();

    let task = coordinator.task(task_id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.error.as_deref(), Some("Agent unregistered"));

    let removed = sink.on_channel(events::AGENT_REMOVED);
    assert_eq!(removed.len(), 1);
    assert_eq!(removed[0]["agent_id"], "a1");

    // The agent pool is empty again.
    assert_eq!(
        coordinator.get_system_overview().await.health,
        taskgrid_coordinator::SystemHealth::Unknown
    );
}

// ---------------------------------------------------------------------------
// Test: Cleanup — terminal tasks age out, active tasks never do
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_e2e_cleanup_retention() {
    init_tracing();
    let sink = Arc::new(RecordingSink::default());
    let executor = Arc::new(MockExecutor::new(Duration::from_millis(10)));
    let coordinator = Coordinator::new(test_config(), executor, sink);

    coordinator
        .register_agent("a1", "Worker 1", Vec::new(), 1)
        .await
        .unwrap();
    coordinator.start().await;

    let done = coordinator
        .submit_task("job", "done", Value::Null, TaskPriority::Medium, &[], None)
        .await
        .unwrap();
    wait_terminal(&coordinator, done).await;
    coordinator.stop().await;

    // Still queued: the dispatcher is stopped now.
    let queued = coordinator
        .submit_task("job", "stuck", Value::Null, TaskPriority::Medium, &[], None)
        .await
        .unwrap();

    // A one-hour window keeps the fresh terminal task.
    assert_eq!(coordinator.cleanup_old_tasks(1).await, 0);
    // A cutoff in the future removes it, but never touches queued work.
    assert_eq!(coordinator.cleanup_old_tasks(-1).await, 1);
    assert!(coordinator.task(done).await.is_none());
    assert_eq!(
        coordinator.task(queued).await.unwrap().status,
        TaskStatus::Queued
    );
}
