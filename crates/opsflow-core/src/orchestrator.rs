//! Workflow orchestrator
//!
//! The core scheduler: materializes workflows from definitions, dispatches
//! eligible steps to handlers over the event channel, consumes results as
//! they arrive and advances the dependency graph until every step reaches a
//! terminal status.
//!
//! All state mutations happen inside event-handler callbacks; a single async
//! mutex serializes them, so per-workflow state never sees interleaved
//! check-then-act sequences even on a multi-threaded runtime.

use crate::channel::{EventChannel, EventSubscriber};
use crate::domain::events::{topics, LifecycleCommand, WorkflowEvent, WorkflowNotification};
use crate::domain::store::WorkflowStore;
use crate::domain::task::{Task, TaskPriority, TaskResult};
use crate::domain::workflow::{
    StepId, StepStatus, Workflow, WorkflowDefinition, WorkflowId, WorkflowStatus,
};
use crate::registry::HandlerRegistry;
use crate::CoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// The core workflow scheduler
pub struct WorkflowOrchestrator {
    store: Arc<dyn WorkflowStore>,
    channel: Arc<EventChannel>,
    registry: Arc<HandlerRegistry>,
    mutation_lock: Mutex<()>,
}

impl WorkflowOrchestrator {
    /// Create an orchestrator over a store, channel and handler registry
    pub fn new(
        store: Arc<dyn WorkflowStore>,
        channel: Arc<EventChannel>,
        registry: Arc<HandlerRegistry>,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            channel,
            registry,
            mutation_lock: Mutex::new(()),
        })
    }

    /// Subscribe the orchestrator to its lifecycle and results topics
    pub fn attach(self: &Arc<Self>) {
        self.channel.subscribe(
            topics::LIFECYCLE,
            Arc::new(LifecycleListener {
                orchestrator: self.clone(),
            }),
        );
        self.channel.subscribe(
            topics::RESULTS,
            Arc::new(ResultListener {
                orchestrator: self.clone(),
            }),
        );
    }

    /// Load a workflow snapshot from the store
    pub async fn workflow(&self, id: &WorkflowId) -> Result<Option<Workflow>, CoreError> {
        self.store.get(id).await
    }

    /// Materialize and store a workflow from a definition
    ///
    /// The definition is validated first; a cyclic or dangling dependency
    /// graph is rejected here rather than left to stall at runtime. An
    /// explicit pre-chosen id overwrites any stored entry with the same id;
    /// callers must avoid id reuse.
    pub async fn create(&self, definition: WorkflowDefinition) -> Result<WorkflowId, CoreError> {
        definition.validate()?;

        let workflow = Workflow::from_definition(definition);
        let workflow_id = workflow.id.clone();
        info!(workflow_id = %workflow_id.0, name = %workflow.name, "Workflow created");

        self.store.put(workflow).await?;

        self.channel.publish(
            topics::NOTIFICATIONS,
            WorkflowEvent::Notification(WorkflowNotification::Created {
                workflow_id: workflow_id.clone(),
            }),
        )?;

        Ok(workflow_id)
    }

    /// Start a workflow: dispatch its frontier
    pub async fn start(&self, workflow_id: &WorkflowId) -> Result<(), CoreError> {
        let _guard = self.mutation_lock.lock().await;

        let mut workflow = self.load(workflow_id).await?;
        if workflow.status.is_terminal() {
            return Err(CoreError::LifecycleError(format!(
                "Cannot start workflow in status: {:?}",
                workflow.status
            )));
        }

        workflow.status = WorkflowStatus::Active;
        debug!(workflow_id = %workflow_id.0, "Workflow started");

        for step_id in workflow.ready_steps() {
            self.execute_step(&mut workflow, &step_id)?;
        }

        self.finalize_if_done(&mut workflow)?;
        workflow.touch();
        self.store.put(workflow).await
    }

    /// Pause a workflow: no new steps are dispatched until resume
    ///
    /// In-flight dispatches are not recalled; their results are still
    /// accepted.
    pub async fn pause(&self, workflow_id: &WorkflowId) -> Result<(), CoreError> {
        let _guard = self.mutation_lock.lock().await;

        let mut workflow = self.load(workflow_id).await?;
        if workflow.status.is_terminal() {
            return Err(CoreError::LifecycleError(format!(
                "Cannot pause workflow in status: {:?}",
                workflow.status
            )));
        }

        workflow.status = WorkflowStatus::Paused;
        workflow.touch();
        debug!(workflow_id = %workflow_id.0, "Workflow paused");
        self.store.put(workflow).await
    }

    /// Resume a paused workflow: dispatch every step whose dependencies are
    /// satisfied now
    pub async fn resume(&self, workflow_id: &WorkflowId) -> Result<(), CoreError> {
        let _guard = self.mutation_lock.lock().await;

        let mut workflow = self.load(workflow_id).await?;
        if workflow.status.is_terminal() {
            return Err(CoreError::LifecycleError(format!(
                "Cannot resume workflow in status: {:?}",
                workflow.status
            )));
        }

        workflow.status = WorkflowStatus::Active;
        debug!(workflow_id = %workflow_id.0, "Workflow resumed");

        for step_id in workflow.ready_steps() {
            self.execute_step(&mut workflow, &step_id)?;
        }

        self.finalize_if_done(&mut workflow)?;
        workflow.touch();
        self.store.put(workflow).await
    }

    /// Cancel a workflow: terminal, in-progress steps fail, pending steps
    /// are skipped
    ///
    /// Cancelling an already-terminal workflow is a no-op.
    pub async fn cancel(&self, workflow_id: &WorkflowId) -> Result<(), CoreError> {
        let _guard = self.mutation_lock.lock().await;

        let mut workflow = self.load(workflow_id).await?;
        if workflow.status.is_terminal() {
            debug!(workflow_id = %workflow_id.0, "Cancel on terminal workflow ignored");
            return Ok(());
        }

        workflow.cancel()?;
        info!(workflow_id = %workflow_id.0, "Workflow cancelled");
        self.store.put(workflow).await?;

        self.channel.publish(
            topics::NOTIFICATIONS,
            WorkflowEvent::Notification(WorkflowNotification::Cancelled {
                workflow_id: workflow_id.clone(),
            }),
        )
    }

    /// Consume a handler result, advance the graph and run the completion
    /// sweep
    ///
    /// Results for unknown workflows or steps are dropped; results arriving
    /// after the workflow reached a terminal status are accepted but have no
    /// effect.
    pub async fn on_task_result(&self, result: &TaskResult) -> Result<(), CoreError> {
        let _guard = self.mutation_lock.lock().await;

        let Some(mut workflow) = self.store.get(&result.workflow_id).await? else {
            debug!(workflow_id = %result.workflow_id.0, "Dropping result for unknown workflow");
            return Ok(());
        };

        if workflow.status.is_terminal() {
            debug!(
                workflow_id = %workflow.id.0,
                step_id = %result.step_id.0,
                "Dropping late result for terminal workflow"
            );
            return Ok(());
        }

        let Some(step) = workflow.step_mut(&result.step_id) else {
            debug!(
                workflow_id = %workflow.id.0,
                step_id = %result.step_id.0,
                "Dropping result for unknown step"
            );
            return Ok(());
        };

        step.status = if result.success {
            StepStatus::Completed
        } else {
            StepStatus::Failed
        };
        step.result = Some(result.clone());
        debug!(
            workflow_id = %workflow.id.0,
            step_id = %result.step_id.0,
            success = result.success,
            "Step result recorded"
        );

        if result.success {
            // Handler writes flow back into the shared bag before fan-out
            workflow.data.merge(&result.data);

            for dependent in workflow.pending_dependents_of(&result.step_id) {
                self.execute_step(&mut workflow, &dependent)?;
            }
        }

        self.finalize_if_done(&mut workflow)?;
        workflow.touch();
        self.store.put(workflow).await
    }

    /// Dispatch one step if the workflow is active and the step is eligible
    ///
    /// Silently returns when the workflow is not active (this is how pause
    /// takes effect for not-yet-dispatched steps) or when dependencies are
    /// not all completed. A step whose handler kind has no registration
    /// fails immediately without a dispatch. Fire-and-forget: never blocks
    /// on the result.
    fn execute_step(&self, workflow: &mut Workflow, step_id: &StepId) -> Result<(), CoreError> {
        if workflow.status != WorkflowStatus::Active {
            return Ok(());
        }

        let Some(step) = workflow.step(step_id) else {
            return Err(CoreError::StepNotFound(step_id.0.clone()));
        };
        if step.status != StepStatus::Pending || !workflow.dependencies_satisfied(step) {
            return Ok(());
        }

        let kind = step.handler;
        if !self.registry.contains(kind) {
            warn!(
                workflow_id = %workflow.id.0,
                step_id = %step_id.0,
                kind = %kind,
                "No handler registered; step fails without dispatch"
            );
            if let Some(step) = workflow.step_mut(step_id) {
                step.status = StepStatus::Failed;
            }
            return Ok(());
        }

        let priority = step
            .config
            .get_str("priority")
            .map(TaskPriority::parse)
            .unwrap_or_default();
        let data = workflow.data.merged(&step.config);
        let task = Task::new(
            step.action.clone(),
            priority,
            data,
            workflow.id.clone(),
            step_id.clone(),
        );
        // Step config key "deadline" (RFC 3339) rides along on the task
        let task = match step.config.get_str("deadline") {
            Some(raw) => match raw.parse::<DateTime<Utc>>() {
                Ok(deadline) => task.with_deadline(deadline),
                Err(e) => {
                    warn!(
                        workflow_id = %workflow.id.0,
                        step_id = %step_id.0,
                        error = %e,
                        "Ignoring unparsable step deadline"
                    );
                    task
                }
            },
            None => task,
        };

        if let Some(step) = workflow.step_mut(step_id) {
            step.status = StepStatus::InProgress;
        }
        debug!(
            workflow_id = %workflow.id.0,
            step_id = %step_id.0,
            task_id = %task.id.0,
            kind = %kind,
            "Dispatching step"
        );

        self.channel
            .publish(&topics::dispatch(kind), WorkflowEvent::Dispatch(task))
    }

    /// Completion sweep: once every step is terminal, finish the workflow
    /// and notify observers with the aggregate success flag
    fn finalize_if_done(&self, workflow: &mut Workflow) -> Result<(), CoreError> {
        workflow.skip_unreachable_steps();

        if workflow.status.is_terminal() || !workflow.all_steps_terminal() {
            return Ok(());
        }

        let success = !workflow.any_step_failed();
        if success {
            workflow.complete()?;
        } else {
            workflow.fail()?;
        }
        info!(workflow_id = %workflow.id.0, success, "Workflow finished");

        self.channel.publish(
            topics::NOTIFICATIONS,
            WorkflowEvent::Notification(WorkflowNotification::Completed {
                workflow_id: workflow.id.clone(),
                success,
            }),
        )
    }

    async fn load(&self, workflow_id: &WorkflowId) -> Result<Workflow, CoreError> {
        self.store
            .get(workflow_id)
            .await?
            .ok_or_else(|| CoreError::WorkflowNotFound(workflow_id.0.clone()))
    }
}

/// Subscriber translating lifecycle commands into orchestrator calls
///
/// Failures are reported in logs, never thrown past the channel boundary.
struct LifecycleListener {
    orchestrator: Arc<WorkflowOrchestrator>,
}

#[async_trait]
impl EventSubscriber for LifecycleListener {
    async fn on_event(&self, _topic: &str, event: Arc<WorkflowEvent>) {
        let WorkflowEvent::Lifecycle(command) = event.as_ref() else {
            return;
        };

        let outcome = match command {
            LifecycleCommand::Create(definition) => self
                .orchestrator
                .create(definition.clone())
                .await
                .map(|_| ()),
            LifecycleCommand::Start { workflow_id } => self.orchestrator.start(workflow_id).await,
            LifecycleCommand::Pause { workflow_id } => self.orchestrator.pause(workflow_id).await,
            LifecycleCommand::Resume { workflow_id } => self.orchestrator.resume(workflow_id).await,
            LifecycleCommand::Cancel { workflow_id } => self.orchestrator.cancel(workflow_id).await,
        };

        if let Err(e) = outcome {
            warn!(error = %e, "Lifecycle command failed");
        }
    }
}

/// Subscriber feeding handler results into the orchestrator
struct ResultListener {
    orchestrator: Arc<WorkflowOrchestrator>,
}

#[async_trait]
impl EventSubscriber for ResultListener {
    async fn on_event(&self, _topic: &str, event: Arc<WorkflowEvent>) {
        let WorkflowEvent::Result(result) = event.as_ref() else {
            return;
        };

        if let Err(e) = self.orchestrator.on_task_result(result).await {
            warn!(error = %e, task_id = %result.task_id.0, "Result processing failed");
        }
    }
}
