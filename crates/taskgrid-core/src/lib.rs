//! Core types and error definitions for the Taskgrid coordinator.
//!
//! This crate provides the foundational types shared across Taskgrid crates:
//! error handling, the agent and task data model, and the two interfaces the
//! coordinator consumes but never implements itself — the event sink and the
//! execution hook.
//!
//! # Main types
//!
//! - [`TaskgridError`] — Unified error enum for all Taskgrid subsystems.
//! - [`TaskgridResult`] — Convenience alias for `Result<T, TaskgridError>`.
//! - [`AgentRecord`] / [`AgentMetrics`] / [`AgentStatus`] — Worker agent model.
//! - [`TaskRecord`] / [`TaskPriority`] / [`TaskStatus`] — Task model.
//! - [`EventSink`] — Transport-agnostic event publication.
//! - [`TaskExecutor`] — The externally supplied execution hook.

/// Agent records, statuses, and rolling metrics.
pub mod agent;
/// The execution hook consumed by the dispatcher.
pub mod executor;
/// The event sink interface and built-in no-op sink.
pub mod sink;
/// Task records, priorities, and lifecycle statuses.
pub mod task;

pub use agent::{AgentMetrics, AgentRecord, AgentStatus, MetricsUpdate};
pub use executor::TaskExecutor;
pub use sink::{EventSink, NullEventSink};
pub use task::{TaskPriority, TaskRecord, TaskResult, TaskStatus};

use thiserror::Error;

/// Top-level error type for the Taskgrid coordinator.
///
/// Each variant corresponds to a subsystem or failure class that can
/// surface to callers.
#[derive(Debug, Error)]
pub enum TaskgridError {
    /// No registered agent satisfies a submission's required capabilities.
    #[error("No suitable agent for capabilities: {0}")]
    NoSuitableAgent(String),

    /// An operation referenced an agent id that is not registered.
    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    /// An agent id was registered a second time.
    #[error("Agent already registered: {0}")]
    DuplicateAgent(String),

    /// A status change that violates the agent or task lifecycle.
    #[error("Invalid status transition: {0}")]
    InvalidTransition(String),

    /// The execution hook reported a failure.
    #[error("Execution failed: {0}")]
    Execution(String),

    /// An unexpected fault inside the dispatcher loop.
    #[error("Queue processing error: {0}")]
    Queue(String),

    /// A configuration parsing or validation error.
    #[error("Config error: {0}")]
    Config(String),

    /// An event sink publication failure.
    #[error("Event sink error: {0}")]
    Sink(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`TaskgridError`].
pub type TaskgridResult<T> = Result<T, TaskgridError>;
