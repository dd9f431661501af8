use async_trait::async_trait;
use chrono::Utc;
use opsflow_core::{CoreError, DataBag, HandlerKind, Task, TaskHandler, TaskHandlerBase, TaskResult};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

/// Document handler
///
/// Generates documents from a named template and archives them. Template
/// selection comes through the step config merged into the task data.
#[derive(Debug, Default)]
pub struct DocumentHandler {}

impl DocumentHandler {
    /// Create a new document handler
    pub fn new() -> Self {
        Self {}
    }
}

impl TaskHandlerBase for DocumentHandler {
    fn handler_kind(&self) -> HandlerKind {
        HandlerKind::Document
    }
}

#[async_trait]
impl TaskHandler for DocumentHandler {
    async fn execute(&self, task: Task) -> Result<TaskResult, CoreError> {
        match task.action.as_str() {
            "generate" => {
                let template = task.data.get_str("template").unwrap_or("standard").to_string();
                let document_id = Uuid::new_v4().to_string();
                info!(document_id = %document_id, template = %template, "Document generated");

                let data = DataBag::from_value(json!({
                    "document_id": document_id,
                    "template": template,
                    "generated_at": Utc::now().to_rfc3339(),
                }));
                Ok(TaskResult::success(&task, data))
            }
            "archive" => {
                let document_id = task.data.get_str("document_id").ok_or_else(|| {
                    CoreError::HandlerExecutionError(
                        "document_id is required to archive".to_string(),
                    )
                })?;
                info!(document_id = %document_id, "Document archived");

                let data = DataBag::from_value(json!({
                    "document_id": document_id,
                    "archived": true,
                }));
                Ok(TaskResult::success(&task, data))
            }
            other => Err(CoreError::HandlerExecutionError(format!(
                "Unknown document action: {}",
                other
            ))),
        }
    }
}
