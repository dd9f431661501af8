use async_trait::async_trait;
use opsflow_core::{
    topics, CoreError, DataBag, EventChannel, EventSubscriber, HandlerKind, HandlerRegistry,
    LifecycleCommand, MemoryWorkflowStore, StepDefinition, StepId, StepStatus, Task, TaskHandler,
    TaskHandlerBase, TaskPriority, TaskResult, WorkflowDefinition, WorkflowEvent, WorkflowId,
    WorkflowNotification, WorkflowOrchestrator, WorkflowStatus, WorkflowStore,
};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::sleep;

/// Records every dispatched task, in delivery order
struct DispatchRecorder {
    tasks: Mutex<Vec<(String, Task)>>,
}

impl DispatchRecorder {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            tasks: Mutex::new(Vec::new()),
        })
    }

    fn tasks(&self) -> Vec<(String, Task)> {
        self.tasks.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventSubscriber for DispatchRecorder {
    async fn on_event(&self, topic: &str, event: Arc<WorkflowEvent>) {
        if let WorkflowEvent::Dispatch(task) = event.as_ref() {
            self.tasks
                .lock()
                .unwrap()
                .push((topic.to_string(), task.clone()));
        }
    }
}

/// Records workflow notifications
struct NotificationRecorder {
    notifications: Mutex<Vec<WorkflowNotification>>,
}

impl NotificationRecorder {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            notifications: Mutex::new(Vec::new()),
        })
    }

    fn entries(&self) -> Vec<WorkflowNotification> {
        self.notifications.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventSubscriber for NotificationRecorder {
    async fn on_event(&self, _topic: &str, event: Arc<WorkflowEvent>) {
        if let WorkflowEvent::Notification(notification) = event.as_ref() {
            self.notifications.lock().unwrap().push(notification.clone());
        }
    }
}

/// Handler whose completions are released one at a time from the test body
struct GatedHandler {
    kind: HandlerKind,
    gate: Arc<Semaphore>,
}

impl TaskHandlerBase for GatedHandler {
    fn handler_kind(&self) -> HandlerKind {
        self.kind
    }
}

#[async_trait]
impl TaskHandler for GatedHandler {
    async fn execute(&self, task: Task) -> Result<TaskResult, CoreError> {
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| CoreError::HandlerExecutionError(e.to_string()))?;
        permit.forget();
        let mut data = DataBag::new();
        data.insert(format!("{}_done", task.step_id.0), json!(true));
        Ok(TaskResult::success(&task, data))
    }
}

/// Handler that completes immediately, echoing its payload
struct EchoHandler(HandlerKind);

impl TaskHandlerBase for EchoHandler {
    fn handler_kind(&self) -> HandlerKind {
        self.0
    }
}

#[async_trait]
impl TaskHandler for EchoHandler {
    async fn execute(&self, task: Task) -> Result<TaskResult, CoreError> {
        let data = task.data.clone();
        Ok(TaskResult::success(&task, data))
    }
}

/// Handler that never returns; dispatched steps stay in progress
struct StalledHandler(HandlerKind);

impl TaskHandlerBase for StalledHandler {
    fn handler_kind(&self) -> HandlerKind {
        self.0
    }
}

#[async_trait]
impl TaskHandler for StalledHandler {
    async fn execute(&self, _task: Task) -> Result<TaskResult, CoreError> {
        futures::future::pending().await
    }
}

struct Engine {
    orchestrator: Arc<WorkflowOrchestrator>,
    store: Arc<MemoryWorkflowStore>,
    channel: Arc<EventChannel>,
    registry: Arc<HandlerRegistry>,
    dispatches: Arc<DispatchRecorder>,
    notifications: Arc<NotificationRecorder>,
}

/// Initialize tracing for tests with a default configuration
fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("opsflow_core=debug")
        .try_init();
}

fn engine() -> Engine {
    init_test_tracing();
    let store = Arc::new(MemoryWorkflowStore::new());
    let channel = Arc::new(EventChannel::new());
    let registry = Arc::new(HandlerRegistry::new(channel.clone()));
    let orchestrator = WorkflowOrchestrator::new(store.clone(), channel.clone(), registry.clone());
    orchestrator.attach();

    let dispatches = DispatchRecorder::new();
    channel.subscribe("task.dispatch.*", dispatches.clone());
    let notifications = NotificationRecorder::new();
    channel.subscribe(topics::NOTIFICATIONS, notifications.clone());

    Engine {
        orchestrator,
        store,
        channel,
        registry,
        dispatches,
        notifications,
    }
}

fn step(id: &str, kind: HandlerKind, deps: &[&str]) -> StepDefinition {
    StepDefinition {
        id: Some(StepId(id.to_string())),
        name: id.to_string(),
        handler: kind,
        action: "run".to_string(),
        config: DataBag::new(),
        depends_on: deps.iter().map(|d| StepId(d.to_string())).collect(),
    }
}

fn definition(id: &str, steps: Vec<StepDefinition>) -> WorkflowDefinition {
    WorkflowDefinition {
        id: Some(WorkflowId(id.to_string())),
        name: format!("{}-flow", id),
        description: None,
        steps,
        data: DataBag::new(),
    }
}

async fn wait_until<F: Fn() -> bool>(predicate: F) {
    for _ in 0..400 {
        if predicate() {
            return;
        }
        sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached within timeout");
}

async fn wait_for_status(store: &MemoryWorkflowStore, id: &WorkflowId, status: WorkflowStatus) {
    for _ in 0..400 {
        if let Some(workflow) = store.get(id).await.unwrap() {
            if workflow.status == status {
                return;
            }
        }
        sleep(Duration::from_millis(5)).await;
    }
    panic!("workflow {} never reached {:?}", id.0, status);
}

async fn wait_for_step_status(
    store: &MemoryWorkflowStore,
    id: &WorkflowId,
    step_id: &str,
    status: StepStatus,
) {
    let step_id = StepId(step_id.to_string());
    for _ in 0..400 {
        if let Some(workflow) = store.get(id).await.unwrap() {
            if workflow.step(&step_id).map(|s| s.status) == Some(status) {
                return;
            }
        }
        sleep(Duration::from_millis(5)).await;
    }
    panic!("step {} of {} never reached {:?}", step_id.0, id.0, status);
}

#[tokio::test]
async fn test_independent_steps_dispatched_in_declaration_order() {
    let env = engine();
    env.registry
        .register(Arc::new(StalledHandler(HandlerKind::Document)));

    let def = definition(
        "wf-order",
        vec![
            step("first", HandlerKind::Document, &[]),
            step("second", HandlerKind::Document, &[]),
            step("third", HandlerKind::Document, &[]),
        ],
    );
    let id = env.orchestrator.create(def).await.unwrap();
    env.orchestrator.start(&id).await.unwrap();

    wait_until(|| env.dispatches.tasks().len() == 3).await;

    let step_ids: Vec<String> = env
        .dispatches
        .tasks()
        .into_iter()
        .map(|(_, t)| t.step_id.0)
        .collect();
    assert_eq!(step_ids, vec!["first", "second", "third"]);
    assert!(env
        .dispatches
        .tasks()
        .iter()
        .all(|(topic, _)| topic == "task.dispatch.document"));
}

#[tokio::test]
async fn test_dispatch_carries_priority_and_deadline_from_config() {
    let env = engine();
    env.registry
        .register(Arc::new(StalledHandler(HandlerKind::Billing)));

    let mut config = DataBag::new();
    config.insert("priority", json!("high"));
    config.insert("deadline", json!("2026-09-10T12:00:00Z"));
    let mut charge = step("charge", HandlerKind::Billing, &[]);
    charge.config = config;
    let def = definition("wf-deadline", vec![charge]);

    let id = env.orchestrator.create(def).await.unwrap();
    env.orchestrator.start(&id).await.unwrap();
    wait_until(|| env.dispatches.tasks().len() == 1).await;

    let (_, task) = env.dispatches.tasks().remove(0);
    assert_eq!(task.priority, TaskPriority::High);
    assert_eq!(
        task.deadline.unwrap().to_rfc3339(),
        "2026-09-10T12:00:00+00:00"
    );
    // The step config also rides in the task payload
    assert_eq!(task.data.get_str("priority").unwrap(), "high");
}

#[tokio::test]
async fn test_chain_runs_to_completion_through_results() -> anyhow::Result<()> {
    let env = engine();
    env.registry
        .register(Arc::new(EchoHandler(HandlerKind::Document)));

    let def = definition(
        "wf-chain",
        vec![
            step("a", HandlerKind::Document, &[]),
            step("b", HandlerKind::Document, &["a"]),
            step("c", HandlerKind::Document, &["b"]),
        ],
    );
    let id = env.orchestrator.create(def).await?;
    env.orchestrator.start(&id).await?;

    wait_for_status(&env.store, &id, WorkflowStatus::Completed).await;

    let workflow = env.store.get(&id).await?.unwrap();
    assert!(workflow
        .steps
        .iter()
        .all(|s| s.status == StepStatus::Completed));
    assert!(workflow.completed_at.is_some());

    // Strict chain order: each dispatch only after the previous result
    let step_ids: Vec<String> = env
        .dispatches
        .tasks()
        .into_iter()
        .map(|(_, t)| t.step_id.0)
        .collect();
    assert_eq!(step_ids, vec!["a", "b", "c"]);

    let entries = env.notifications.entries();
    assert!(entries.iter().any(|n| matches!(
        n,
        WorkflowNotification::Completed { success: true, .. }
    )));
    Ok(())
}

#[tokio::test]
async fn test_fan_out_after_shared_dependency() {
    let env = engine();
    env.registry
        .register(Arc::new(EchoHandler(HandlerKind::Document)));

    let def = definition(
        "wf-fanout",
        vec![
            step("root", HandlerKind::Document, &[]),
            step("left", HandlerKind::Document, &["root"]),
            step("right", HandlerKind::Document, &["root"]),
            step("join", HandlerKind::Document, &["left", "right"]),
        ],
    );
    let id = env.orchestrator.create(def).await.unwrap();
    env.orchestrator.start(&id).await.unwrap();

    wait_for_status(&env.store, &id, WorkflowStatus::Completed).await;

    let step_ids: Vec<String> = env
        .dispatches
        .tasks()
        .into_iter()
        .map(|(_, t)| t.step_id.0)
        .collect();
    assert_eq!(step_ids[0], "root");
    assert_eq!(step_ids[3], "join");
    assert!(step_ids[1..3].contains(&"left".to_string()));
    assert!(step_ids[1..3].contains(&"right".to_string()));
}

#[tokio::test]
async fn test_pause_blocks_new_dispatch_but_accepts_inflight_result() {
    let env = engine();
    let gate = Arc::new(Semaphore::new(0));
    env.registry.register(Arc::new(GatedHandler {
        kind: HandlerKind::Document,
        gate: gate.clone(),
    }));

    let def = definition(
        "wf-pause",
        vec![
            step("a", HandlerKind::Document, &[]),
            step("b", HandlerKind::Document, &["a"]),
        ],
    );
    let id = env.orchestrator.create(def).await.unwrap();
    env.orchestrator.start(&id).await.unwrap();
    wait_until(|| env.dispatches.tasks().len() == 1).await;

    env.orchestrator.pause(&id).await.unwrap();

    // Release step a while paused: its result lands, b is not dispatched
    gate.add_permits(1);
    wait_for_step_status(&env.store, &id, "a", StepStatus::Completed).await;

    sleep(Duration::from_millis(30)).await;
    let workflow = env.store.get(&id).await.unwrap().unwrap();
    assert_eq!(workflow.status, WorkflowStatus::Paused);
    assert_eq!(
        workflow.step(&StepId("b".to_string())).unwrap().status,
        StepStatus::Pending
    );
    assert_eq!(env.dispatches.tasks().len(), 1);

    // Resume dispatches the now-ready frontier
    env.orchestrator.resume(&id).await.unwrap();
    wait_until(|| env.dispatches.tasks().len() == 2).await;
    gate.add_permits(1);

    wait_for_status(&env.store, &id, WorkflowStatus::Completed).await;
}

#[tokio::test]
async fn test_cancel_relabels_steps_and_second_cancel_is_noop() {
    let env = engine();
    env.registry
        .register(Arc::new(StalledHandler(HandlerKind::Billing)));

    let def = definition(
        "wf-cancel",
        vec![
            step("charge", HandlerKind::Billing, &[]),
            step("receipt", HandlerKind::Billing, &["charge"]),
        ],
    );
    let id = env.orchestrator.create(def).await.unwrap();
    env.orchestrator.start(&id).await.unwrap();
    wait_until(|| env.dispatches.tasks().len() == 1).await;

    env.orchestrator.cancel(&id).await.unwrap();

    let workflow = env.store.get(&id).await.unwrap().unwrap();
    assert_eq!(workflow.status, WorkflowStatus::Failed);
    assert_eq!(
        workflow.step(&StepId("charge".to_string())).unwrap().status,
        StepStatus::Failed
    );
    assert_eq!(
        workflow.step(&StepId("receipt".to_string())).unwrap().status,
        StepStatus::Skipped
    );
    let completed_at = workflow.completed_at.unwrap();

    env.orchestrator.cancel(&id).await.unwrap();
    let again = env.store.get(&id).await.unwrap().unwrap();
    assert_eq!(again.completed_at.unwrap(), completed_at);

    wait_until(|| {
        env.notifications
            .entries()
            .iter()
            .any(|n| matches!(n, WorkflowNotification::Cancelled { .. }))
    })
    .await;
    let cancelled_count = env
        .notifications
        .entries()
        .iter()
        .filter(|n| matches!(n, WorkflowNotification::Cancelled { .. }))
        .count();
    assert_eq!(cancelled_count, 1);
}

#[tokio::test]
async fn test_step_failure_fails_workflow_and_skips_descendants() {
    let env = engine();

    struct FailingHandler;
    impl TaskHandlerBase for FailingHandler {
        fn handler_kind(&self) -> HandlerKind {
            HandlerKind::Scheduling
        }
    }
    #[async_trait]
    impl TaskHandler for FailingHandler {
        async fn execute(&self, _task: Task) -> Result<TaskResult, CoreError> {
            Err(CoreError::HandlerExecutionError("calendar offline".to_string()))
        }
    }
    env.registry.register(Arc::new(FailingHandler));
    env.registry
        .register(Arc::new(EchoHandler(HandlerKind::Document)));

    let def = definition(
        "wf-fail",
        vec![
            step("book", HandlerKind::Scheduling, &[]),
            step("confirm", HandlerKind::Document, &["book"]),
        ],
    );
    let id = env.orchestrator.create(def).await.unwrap();
    env.orchestrator.start(&id).await.unwrap();

    wait_for_status(&env.store, &id, WorkflowStatus::Failed).await;

    let workflow = env.store.get(&id).await.unwrap().unwrap();
    let failed = workflow.step(&StepId("book".to_string())).unwrap();
    assert_eq!(failed.status, StepStatus::Failed);
    assert!(failed
        .result
        .as_ref()
        .unwrap()
        .error
        .as_ref()
        .unwrap()
        .contains("calendar offline"));
    assert_eq!(
        workflow.step(&StepId("confirm".to_string())).unwrap().status,
        StepStatus::Skipped
    );

    let entries = env.notifications.entries();
    assert!(entries.iter().any(|n| matches!(
        n,
        WorkflowNotification::Completed { success: false, .. }
    )));
}

#[tokio::test]
async fn test_lifecycle_commands_drive_the_engine_over_the_channel() {
    let env = engine();
    env.registry
        .register(Arc::new(EchoHandler(HandlerKind::Document)));

    let def = definition("wf-cmd", vec![step("only", HandlerKind::Document, &[])]);
    env.channel
        .publish(
            topics::LIFECYCLE,
            WorkflowEvent::Lifecycle(LifecycleCommand::Create(def)),
        )
        .unwrap();

    wait_until(|| {
        env.notifications
            .entries()
            .iter()
            .any(|n| matches!(n, WorkflowNotification::Created { .. }))
    })
    .await;

    let id = WorkflowId("wf-cmd".to_string());
    env.channel
        .publish(
            topics::LIFECYCLE,
            WorkflowEvent::Lifecycle(LifecycleCommand::Start {
                workflow_id: id.clone(),
            }),
        )
        .unwrap();

    wait_for_status(&env.store, &id, WorkflowStatus::Completed).await;
}

#[tokio::test]
async fn test_commands_for_unknown_workflow_do_not_poison_the_engine() {
    let env = engine();
    env.registry
        .register(Arc::new(EchoHandler(HandlerKind::Document)));

    // Reported in logs only; the listener keeps serving later commands
    env.channel
        .publish(
            topics::LIFECYCLE,
            WorkflowEvent::Lifecycle(LifecycleCommand::Start {
                workflow_id: WorkflowId("ghost".to_string()),
            }),
        )
        .unwrap();

    let def = definition("wf-alive", vec![step("only", HandlerKind::Document, &[])]);
    let id = env.orchestrator.create(def).await.unwrap();
    env.channel
        .publish(
            topics::LIFECYCLE,
            WorkflowEvent::Lifecycle(LifecycleCommand::Start {
                workflow_id: id.clone(),
            }),
        )
        .unwrap();

    wait_for_status(&env.store, &id, WorkflowStatus::Completed).await;
}

#[tokio::test]
async fn test_stray_result_is_ignored() {
    let env = engine();
    env.registry
        .register(Arc::new(StalledHandler(HandlerKind::Document)));

    let def = definition("wf-stray", vec![step("a", HandlerKind::Document, &[])]);
    let id = env.orchestrator.create(def).await.unwrap();
    env.orchestrator.start(&id).await.unwrap();
    wait_until(|| env.dispatches.tasks().len() == 1).await;

    // A result correlated to a workflow the engine never created
    let stray_task = Task::new(
        "run",
        Default::default(),
        DataBag::new(),
        WorkflowId("never-created".to_string()),
        StepId("a".to_string()),
    );
    env.channel
        .publish(
            topics::RESULTS,
            WorkflowEvent::Result(TaskResult::success(&stray_task, DataBag::new())),
        )
        .unwrap();

    sleep(Duration::from_millis(30)).await;
    let workflow = env.store.get(&id).await.unwrap().unwrap();
    assert_eq!(workflow.status, WorkflowStatus::Active);
    assert_eq!(workflow.steps[0].status, StepStatus::InProgress);
}
