use crate::{
    domain::workflow::{StepId, TaskId, WorkflowId},
    DataBag,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Task priority
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    /// Background work
    Low,

    /// Default priority
    #[default]
    Normal,

    /// Time-sensitive work
    High,
}

impl TaskPriority {
    /// Parse a priority from its lowercase name; unknown strings map to normal
    pub fn parse(s: &str) -> Self {
        match s {
            "low" => TaskPriority::Low,
            "high" => TaskPriority::High,
            _ => TaskPriority::Normal,
        }
    }
}

/// The ephemeral dispatch unit sent from the orchestrator to a handler
///
/// Not stored; exists only in transit. The data bag is the step config
/// merged over the workflow's shared data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique task identifier
    pub id: TaskId,

    /// Action identifier, interpreted by the handler
    pub action: String,

    /// Priority
    pub priority: TaskPriority,

    /// Merged payload
    pub data: DataBag,

    /// Owning workflow
    pub workflow_id: WorkflowId,

    /// Step this task executes
    pub step_id: StepId,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Optional deadline; informational, the engine does not enforce it
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a task with a generated id
    pub fn new(
        action: impl Into<String>,
        priority: TaskPriority,
        data: DataBag,
        workflow_id: WorkflowId,
        step_id: StepId,
    ) -> Self {
        Self {
            id: TaskId(Uuid::new_v4().to_string()),
            action: action.into(),
            priority,
            data,
            workflow_id,
            step_id,
            created_at: Utc::now(),
            deadline: None,
        }
    }

    /// Set a deadline on the task
    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// The outcome a handler reports for a task, correlated back to its step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    /// The originating task
    pub task_id: TaskId,

    /// Owning workflow
    pub workflow_id: WorkflowId,

    /// Step the originating task executed
    pub step_id: StepId,

    /// Whether execution succeeded
    pub success: bool,

    /// Output data
    pub data: DataBag,

    /// Error message when execution failed
    #[serde(default)]
    pub error: Option<String>,

    /// Completion timestamp
    pub completed_at: DateTime<Utc>,
}

impl TaskResult {
    /// Build a successful result for a task
    pub fn success(task: &Task, data: DataBag) -> Self {
        Self {
            task_id: task.id.clone(),
            workflow_id: task.workflow_id.clone(),
            step_id: task.step_id.clone(),
            success: true,
            data,
            error: None,
            completed_at: Utc::now(),
        }
    }

    /// Build a failed result for a task
    pub fn failure(task: &Task, error: impl Into<String>) -> Self {
        Self {
            task_id: task.id.clone(),
            workflow_id: task.workflow_id.clone(),
            step_id: task.step_id.clone(),
            success: false,
            data: DataBag::new(),
            error: Some(error.into()),
            completed_at: Utc::now(),
        }
    }
}
