use async_trait::async_trait;
use opsflow_core::{
    CoreError, DataBag, HandlerKind, Task, TaskHandler, TaskHandlerBase, TaskResult,
    WorkflowDefinition, WorkflowOrchestrator,
};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

/// Nested workflow handler
///
/// Addresses the orchestrator itself as a handler: the task data carries a
/// child workflow definition under `"definition"`, which is created and
/// started. Fire-and-forget: the step completes as soon as the child is
/// launched, and the child's id is returned so later steps can look it up.
pub struct NestedWorkflowHandler {
    orchestrator: Arc<WorkflowOrchestrator>,
}

impl NestedWorkflowHandler {
    /// Create a nested workflow handler bound to an orchestrator
    pub fn new(orchestrator: Arc<WorkflowOrchestrator>) -> Self {
        Self { orchestrator }
    }
}

impl TaskHandlerBase for NestedWorkflowHandler {
    fn handler_kind(&self) -> HandlerKind {
        HandlerKind::Workflow
    }
}

#[async_trait]
impl TaskHandler for NestedWorkflowHandler {
    async fn execute(&self, task: Task) -> Result<TaskResult, CoreError> {
        let definition: WorkflowDefinition =
            task.data.get_as("definition").ok_or_else(|| {
                CoreError::HandlerExecutionError(
                    "Task data must carry a workflow definition under \"definition\"".to_string(),
                )
            })?;

        let child_id = self.orchestrator.create(definition).await?;
        self.orchestrator.start(&child_id).await?;
        info!(
            parent_workflow_id = %task.workflow_id.0,
            child_workflow_id = %child_id.0,
            "Nested workflow launched"
        );

        let data = DataBag::from_value(json!({
            "child_workflow_id": child_id.0,
        }));
        Ok(TaskResult::success(&task, data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::document::DocumentHandler;
    use opsflow_core::{
        EventChannel, HandlerRegistry, MemoryWorkflowStore, StepId, TaskPriority, WorkflowId,
        WorkflowStatus, WorkflowStore,
    };
    use std::time::Duration;

    fn child_definition() -> serde_json::Value {
        json!({
            "id": "child-wf",
            "name": "child",
            "steps": [
                {"id": "gen", "name": "gen", "handler": "document", "action": "generate"}
            ]
        })
    }

    fn engine() -> (Arc<WorkflowOrchestrator>, Arc<MemoryWorkflowStore>, Arc<HandlerRegistry>) {
        let store = Arc::new(MemoryWorkflowStore::new());
        let channel = Arc::new(EventChannel::new());
        let registry = Arc::new(HandlerRegistry::new(channel.clone()));
        let orchestrator = WorkflowOrchestrator::new(store.clone(), channel, registry.clone());
        orchestrator.attach();
        (orchestrator, store, registry)
    }

    #[tokio::test]
    async fn test_launches_child_and_returns_its_id() {
        let (orchestrator, store, registry) = engine();
        registry.register(Arc::new(DocumentHandler::new()));
        let handler = NestedWorkflowHandler::new(orchestrator);

        let task = Task::new(
            "start_workflow",
            TaskPriority::Normal,
            DataBag::from_value(json!({"definition": child_definition()})),
            WorkflowId("parent".to_string()),
            StepId("launch".to_string()),
        );
        let result = handler.execute(task).await.unwrap();

        assert!(result.success);
        assert_eq!(result.data.get_str("child_workflow_id").unwrap(), "child-wf");

        // The child runs to completion on its own
        let child_id = WorkflowId("child-wf".to_string());
        for _ in 0..200 {
            let child = store.get(&child_id).await.unwrap().unwrap();
            if child.status == WorkflowStatus::Completed {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("child workflow did not complete");
    }

    #[tokio::test]
    async fn test_missing_definition_is_error() {
        let (orchestrator, _, _) = engine();
        let handler = NestedWorkflowHandler::new(orchestrator);

        let task = Task::new(
            "start_workflow",
            TaskPriority::Normal,
            DataBag::new(),
            WorkflowId("parent".to_string()),
            StepId("launch".to_string()),
        );
        let err = handler.execute(task).await.unwrap_err();
        assert!(matches!(err, CoreError::HandlerExecutionError(_)));
    }

    #[tokio::test]
    async fn test_invalid_child_definition_is_error() {
        let (orchestrator, _, _) = engine();
        let handler = NestedWorkflowHandler::new(orchestrator);

        // Empty step list fails validation at create
        let task = Task::new(
            "start_workflow",
            TaskPriority::Normal,
            DataBag::from_value(json!({
                "definition": {"id": "bad", "name": "bad", "steps": []}
            })),
            WorkflowId("parent".to_string()),
            StepId("launch".to_string()),
        );
        let err = handler.execute(task).await.unwrap_err();
        assert!(matches!(err, CoreError::DefinitionError(_)));
    }
}
