use crate::domain::task::{Task, TaskResult};
use crate::CoreError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed set of handler kinds a step can be bound to
///
/// The registry maps each kind to exactly one active handler instance;
/// steps address handlers by kind, never by instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerKind {
    /// Customer-facing messaging and interaction
    CustomerInteraction,

    /// Appointment and resource scheduling
    Scheduling,

    /// Invoicing and payment bookkeeping
    Billing,

    /// Document generation and assembly
    Document,

    /// Nested workflows: the orchestrator addressed as a handler
    Workflow,
}

impl HandlerKind {
    /// Stable lowercase name, used in dispatch topic names
    pub fn as_str(&self) -> &'static str {
        match self {
            HandlerKind::CustomerInteraction => "customer_interaction",
            HandlerKind::Scheduling => "scheduling",
            HandlerKind::Billing => "billing",
            HandlerKind::Document => "document",
            HandlerKind::Workflow => "workflow",
        }
    }
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Non-async base trait for task handlers
/// This trait is object-safe and carries the handler's discriminant
pub trait TaskHandlerBase: Send + Sync {
    /// The kind this handler serves
    fn handler_kind(&self) -> HandlerKind;
}

/// A pluggable executor for one category of step
///
/// Handlers are uniform over this single capability regardless of internal
/// logic. An `Err` return is caught at the dispatch boundary and converted
/// to a failed [`TaskResult`]; it never goes unreported.
#[async_trait]
pub trait TaskHandler: TaskHandlerBase {
    /// Execute a task and produce its result
    async fn execute(&self, task: Task) -> Result<TaskResult, CoreError>;
}
