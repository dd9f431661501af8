use async_trait::async_trait;
use chrono::Utc;
use opsflow_core::{CoreError, DataBag, HandlerKind, Task, TaskHandler, TaskHandlerBase, TaskResult};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

/// Billing handler
///
/// Issues invoices and records payments against them. Amounts are plain
/// numbers in the task data; currency defaults to USD.
#[derive(Debug, Default)]
pub struct BillingHandler {}

impl BillingHandler {
    /// Create a new billing handler
    pub fn new() -> Self {
        Self {}
    }
}

impl TaskHandlerBase for BillingHandler {
    fn handler_kind(&self) -> HandlerKind {
        HandlerKind::Billing
    }
}

#[async_trait]
impl TaskHandler for BillingHandler {
    async fn execute(&self, task: Task) -> Result<TaskResult, CoreError> {
        match task.action.as_str() {
            "create_invoice" => {
                let amount = task
                    .data
                    .get("amount")
                    .and_then(|v| v.as_f64())
                    .ok_or_else(|| {
                        CoreError::HandlerExecutionError(
                            "amount is required to create an invoice".to_string(),
                        )
                    })?;
                if amount <= 0.0 {
                    return Err(CoreError::HandlerExecutionError(format!(
                        "Invoice amount must be positive, got {}",
                        amount
                    )));
                }

                let currency = task.data.get_str("currency").unwrap_or("USD").to_string();
                let invoice_id = Uuid::new_v4().to_string();
                info!(invoice_id = %invoice_id, amount, currency = %currency, "Invoice created");

                let data = DataBag::from_value(json!({
                    "invoice_id": invoice_id,
                    "amount": amount,
                    "currency": currency,
                    "issued_at": Utc::now().to_rfc3339(),
                }));
                Ok(TaskResult::success(&task, data))
            }
            "record_payment" => {
                let invoice_id = task.data.get_str("invoice_id").ok_or_else(|| {
                    CoreError::HandlerExecutionError(
                        "invoice_id is required to record a payment".to_string(),
                    )
                })?;
                info!(invoice_id = %invoice_id, "Payment recorded");

                let data = DataBag::from_value(json!({
                    "invoice_id": invoice_id,
                    "paid": true,
                    "paid_at": Utc::now().to_rfc3339(),
                }));
                Ok(TaskResult::success(&task, data))
            }
            other => Err(CoreError::HandlerExecutionError(format!(
                "Unknown billing action: {}",
                other
            ))),
        }
    }
}
