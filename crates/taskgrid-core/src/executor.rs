use crate::{TaskRecord, TaskgridResult};
use async_trait::async_trait;

/// Performs the actual work behind a task.
///
/// The coordinator treats implementations as fully opaque: `execute` either
/// returns the elapsed execution time in seconds or an error whose display
/// string becomes the task's failure message. The core imposes no timeout
/// and makes no assumption about the hook's internal concurrency.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Run the task to completion.
    async fn execute(&self, task: &TaskRecord) -> TaskgridResult<f64>;
}
