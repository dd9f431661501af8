//! Domain layer: workflow aggregate, task/result value objects, channel
//! events and the workflow store abstraction.

/// Channel event types and topic names
pub mod events;

/// Workflow store trait and in-memory implementation
pub mod store;

/// Task and result value objects
pub mod task;

/// Workflow aggregate, definitions and statuses
pub mod workflow;
