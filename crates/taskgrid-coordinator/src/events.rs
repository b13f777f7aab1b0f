//! Event channel names and sink publication helpers.
//!
//! Sink failures are logged and never propagate into coordinator
//! operations: a broken dashboard must not stall scheduling.

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use taskgrid_core::EventSink;
use tracing::warn;

/// Full agent snapshot, published after any status or metrics change.
pub const AGENT_STATUS: &str = "agent_status";
/// `{agent_id}`, published after an agent is unregistered.
pub const AGENT_REMOVED: &str = "agent_removed";
/// Submission acknowledgement with queue placement.
pub const TASK_SUBMITTED: &str = "task_submitted";
/// Full task snapshot, published on every task state change.
pub const TASK_COMPLETION: &str = "task_completion";
/// Threshold violations for one agent.
pub const PERFORMANCE_ALERT: &str = "performance_alert";

pub(crate) async fn emit(sink: &Arc<dyn EventSink>, channel: &str, payload: Value) {
    if let Err(e) = sink.publish(channel, payload).await {
        warn!(channel, error = %e, "event sink rejected event");
    }
}

pub(crate) async fn emit_json<T: Serialize>(sink: &Arc<dyn EventSink>, channel: &str, value: &T) {
    match serde_json::to_value(value) {
        Ok(payload) => emit(sink, channel, payload).await,
        Err(e) => warn!(channel, error = %e, "cannot serialize event payload"),
    }
}
