use async_trait::async_trait;
use opsflow_core::{CoreError, DataBag, HandlerKind, Task, TaskHandler, TaskHandlerBase, TaskResult};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

/// Customer interaction handler
///
/// Covers outbound messaging to a customer: welcome mails, notifications
/// and feedback requests. Delivery here is simulated; the produced
/// `message_id` stands in for the provider's receipt.
#[derive(Debug, Default)]
pub struct CustomerInteractionHandler {}

impl CustomerInteractionHandler {
    /// Create a new customer interaction handler
    pub fn new() -> Self {
        Self {}
    }
}

impl TaskHandlerBase for CustomerInteractionHandler {
    fn handler_kind(&self) -> HandlerKind {
        HandlerKind::CustomerInteraction
    }
}

#[async_trait]
impl TaskHandler for CustomerInteractionHandler {
    async fn execute(&self, task: Task) -> Result<TaskResult, CoreError> {
        let recipient = task
            .data
            .get_str("customer_email")
            .or_else(|| task.data.get_str("customer_id"))
            .ok_or_else(|| {
                CoreError::HandlerExecutionError(
                    "customer_email or customer_id is required".to_string(),
                )
            })?
            .to_string();

        let channel = task.data.get_str("channel").unwrap_or("email").to_string();

        match task.action.as_str() {
            "send_welcome" | "send_message" | "request_feedback" => {
                let message_id = Uuid::new_v4().to_string();
                info!(
                    action = %task.action,
                    recipient = %recipient,
                    channel = %channel,
                    message_id = %message_id,
                    "Customer message sent"
                );

                let data = DataBag::from_value(json!({
                    "message_id": message_id,
                    "recipient": recipient,
                    "channel": channel,
                }));
                Ok(TaskResult::success(&task, data))
            }
            other => Err(CoreError::HandlerExecutionError(format!(
                "Unknown customer interaction action: {}",
                other
            ))),
        }
    }
}
