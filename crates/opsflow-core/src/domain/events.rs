use crate::domain::task::{Task, TaskResult};
use crate::domain::workflow::{WorkflowDefinition, WorkflowId};
use serde::{Deserialize, Serialize};

/// Topic names used on the event channel
pub mod topics {
    use crate::handler::HandlerKind;

    /// Lifecycle commands into the orchestrator
    pub const LIFECYCLE: &str = "workflow.lifecycle";

    /// Task results from handlers into the orchestrator
    pub const RESULTS: &str = "workflow.results";

    /// Notifications for external observers
    pub const NOTIFICATIONS: &str = "workflow.notifications";

    /// Dispatch topic for one handler kind
    pub fn dispatch(kind: HandlerKind) -> String {
        format!("task.dispatch.{}", kind.as_str())
    }
}

/// Lifecycle commands accepted by the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum LifecycleCommand {
    /// Materialize a workflow from a definition
    Create(WorkflowDefinition),

    /// Start dispatching the workflow's frontier
    Start {
        /// Target workflow
        workflow_id: WorkflowId,
    },

    /// Stop dispatching new steps
    Pause {
        /// Target workflow
        workflow_id: WorkflowId,
    },

    /// Resume dispatching eligible steps
    Resume {
        /// Target workflow
        workflow_id: WorkflowId,
    },

    /// Terminally cancel the workflow
    Cancel {
        /// Target workflow
        workflow_id: WorkflowId,
    },
}

/// Notifications the orchestrator publishes for external observers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkflowNotification {
    /// A workflow was materialized and stored
    Created {
        /// The new workflow
        workflow_id: WorkflowId,
    },

    /// A workflow was cancelled
    Cancelled {
        /// The cancelled workflow
        workflow_id: WorkflowId,
    },

    /// A workflow reached a terminal status via its completion sweep
    Completed {
        /// The finished workflow
        workflow_id: WorkflowId,
        /// Aggregate success flag: true iff no step failed
        success: bool,
    },
}

/// Every event carried on the channel
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WorkflowEvent {
    /// Lifecycle command into the orchestrator
    Lifecycle(LifecycleCommand),

    /// Task dispatched to a handler
    Dispatch(Task),

    /// Result reported by a handler
    Result(TaskResult),

    /// Observer notification
    Notification(WorkflowNotification),
}
