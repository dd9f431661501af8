//!
//! Opsflow Core - Core engine for the Opsflow platform
//!
//! This crate defines the workflow engine: the event channel components
//! communicate over, the domain model for workflows and tasks, the handler
//! registry and the orchestrator that drives workflows from creation to a
//! terminal status.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// In-process publish/subscribe event channel
pub mod channel;

/// Domain layer - workflow aggregate, tasks, events, store
pub mod domain;

/// Error types
pub mod error;

/// Handler traits and the handler kind discriminant
pub mod handler;

/// Workflow orchestrator
pub mod orchestrator;

/// Handler registry and dispatch wiring
pub mod registry;

/// Core types
pub mod types;

// Re-export key types
pub use error::CoreError;
pub use types::DataBag;

// Re-export main API types for easy use
pub use channel::{EventChannel, EventSubscriber, TopicPattern};
pub use domain::events::{topics, LifecycleCommand, WorkflowEvent, WorkflowNotification};
pub use domain::store::{MemoryWorkflowStore, WorkflowStore};
pub use domain::task::{Task, TaskPriority, TaskResult};
pub use domain::workflow::{
    Step, StepDefinition, StepId, StepStatus, TaskId, Workflow, WorkflowDefinition, WorkflowId,
    WorkflowStatus,
};
pub use handler::{HandlerKind, TaskHandler, TaskHandlerBase};
pub use orchestrator::WorkflowOrchestrator;
pub use registry::HandlerRegistry;
