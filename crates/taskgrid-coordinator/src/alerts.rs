use crate::config::PerformanceThresholds;
use chrono::Utc;
use serde_json::{json, Value};
use taskgrid_core::AgentRecord;

/// Evaluate every threshold against the agent's current state.
///
/// Returns one human-readable violation per breached threshold; an empty
/// list means no alert. Evaluation is edge-triggered per call, so a
/// chronically degraded agent re-alerts on every completed task.
pub fn check_thresholds(agent: &AgentRecord, thresholds: &PerformanceThresholds) -> Vec<String> {
    let mut alerts = Vec::new();
    let metrics = &agent.metrics;
    if metrics.average_response_time > thresholds.max_response_time_ms {
        alerts.push(format!(
            "average response time {:.0}ms exceeds {:.0}ms",
            metrics.average_response_time, thresholds.max_response_time_ms
        ));
    }
    if metrics.success_rate < thresholds.min_success_rate {
        alerts.push(format!(
            "success rate {:.1}% below {:.1}%",
            metrics.success_rate, thresholds.min_success_rate
        ));
    }
    if metrics.tasks_completed > 0 && metrics.error_rate() > thresholds.max_error_rate {
        alerts.push(format!(
            "error rate {:.1}% exceeds {:.1}%",
            metrics.error_rate(),
            thresholds.max_error_rate
        ));
    }
    if agent.load_percentage > thresholds.max_load_percentage {
        alerts.push(format!(
            "load {:.0}% exceeds {:.0}%",
            agent.load_percentage, thresholds.max_load_percentage
        ));
    }
    alerts
}

/// Build the `performance_alert` payload for the event sink.
pub fn alert_payload(agent: &AgentRecord, alerts: &[String]) -> Value {
    json!({
        "agent_id": agent.id,
        "agent_name": agent.name,
        "alerts": alerts,
        "timestamp": Utc::now(),
        "metrics": agent.metrics,
    })
}
