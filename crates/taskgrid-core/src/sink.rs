use crate::TaskgridResult;
use async_trait::async_trait;
use serde_json::Value;

/// Receives live status and alert notifications from the coordinator.
///
/// Implementations own the transport (WebSocket broadcast, pub/sub, log
/// pipeline); the coordinator only ever calls [`publish`](EventSink::publish)
/// and treats failures as non-fatal.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Publish one event payload on a named channel.
    async fn publish(&self, channel: &str, payload: Value) -> TaskgridResult<()>;
}

/// An [`EventSink`] that discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventSink;

#[async_trait]
impl EventSink for NullEventSink {
    async fn publish(&self, _channel: &str, _payload: Value) -> TaskgridResult<()> {
        Ok(())
    }
}
