use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use opsflow_core::{CoreError, DataBag, HandlerKind, Task, TaskHandler, TaskHandlerBase, TaskResult};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

/// Scheduling handler
///
/// Books and cancels appointments. The requested time comes from the task
/// data as RFC 3339; without one the appointment is placed one business day
/// out.
#[derive(Debug, Default)]
pub struct SchedulingHandler {}

impl SchedulingHandler {
    /// Create a new scheduling handler
    pub fn new() -> Self {
        Self {}
    }

    fn requested_time(task: &Task) -> Result<DateTime<Utc>, CoreError> {
        match task.data.get_str("requested_time") {
            Some(raw) => raw
                .parse::<DateTime<Utc>>()
                .map_err(|e| {
                    CoreError::HandlerExecutionError(format!(
                        "Invalid requested_time {:?}: {}",
                        raw, e
                    ))
                }),
            None => Ok(Utc::now() + Duration::days(1)),
        }
    }
}

impl TaskHandlerBase for SchedulingHandler {
    fn handler_kind(&self) -> HandlerKind {
        HandlerKind::Scheduling
    }
}

#[async_trait]
impl TaskHandler for SchedulingHandler {
    async fn execute(&self, task: Task) -> Result<TaskResult, CoreError> {
        match task.action.as_str() {
            "book_appointment" => {
                let scheduled_for = Self::requested_time(&task)?;
                let duration_minutes = task
                    .data
                    .get("duration_minutes")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(30);
                let appointment_id = Uuid::new_v4().to_string();
                info!(
                    appointment_id = %appointment_id,
                    scheduled_for = %scheduled_for,
                    duration_minutes,
                    "Appointment booked"
                );

                let data = DataBag::from_value(json!({
                    "appointment_id": appointment_id,
                    "scheduled_for": scheduled_for.to_rfc3339(),
                    "duration_minutes": duration_minutes,
                }));
                Ok(TaskResult::success(&task, data))
            }
            "cancel_appointment" => {
                let appointment_id = task.data.get_str("appointment_id").ok_or_else(|| {
                    CoreError::HandlerExecutionError(
                        "appointment_id is required to cancel".to_string(),
                    )
                })?;
                info!(appointment_id = %appointment_id, "Appointment cancelled");

                let data = DataBag::from_value(json!({
                    "appointment_id": appointment_id,
                    "cancelled": true,
                }));
                Ok(TaskResult::success(&task, data))
            }
            other => Err(CoreError::HandlerExecutionError(format!(
                "Unknown scheduling action: {}",
                other
            ))),
        }
    }
}
