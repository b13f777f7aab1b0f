//! Task scheduling and worker-agent coordination engine.
//!
//! Accepts units of work, matches each to a registered worker agent by
//! declared capabilities and current load, enforces per-agent concurrency
//! ceilings, tracks rolling performance metrics, and runs background
//! liveness and alerting sweeps. The actual work behind a task and the
//! transport behind status events are both injected
//! ([`taskgrid_core::TaskExecutor`], [`taskgrid_core::EventSink`]).
//!
//! # Main types
//!
//! - [`Coordinator`] — Top-level engine with an explicit start/stop lifecycle.
//! - [`AgentRegistry`] — CRUD and status transitions for worker agents.
//! - [`TaskQueue`] — Priority-ordered store of pending and historical tasks.
//! - [`CoordinatorConfig`] / [`PerformanceThresholds`] — Runtime configuration.
//! - [`SystemOverview`] — Aggregated health snapshot.

/// Threshold evaluation and alert payloads.
pub mod alerts;
/// Runtime configuration.
pub mod config;
/// The coordinator facade.
pub mod coordinator;
mod dispatcher;
/// Event channel names.
pub mod events;
mod monitor;
/// Priority task queue and task ledger.
pub mod queue;
/// Worker agent registry.
pub mod registry;
/// Capability- and load-based agent selection.
pub mod selector;

pub use config::{CoordinatorConfig, PerformanceThresholds};
pub use coordinator::{AgentDetails, Coordinator, SystemHealth, SystemOverview};
pub use queue::{QueueEntry, TaskQueue};
pub use registry::AgentRegistry;
pub use selector::select_agent;
