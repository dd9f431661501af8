//! Step handler registry
//!
//! Maps each [`HandlerKind`] to exactly one active handler instance and
//! wires that instance to its dispatch topic. Execution is spawned per
//! task; success or failure, exactly one result is published back on the
//! results topic — handler errors are converted to failed results, never
//! left unreported.

use crate::channel::{EventChannel, EventSubscriber};
use crate::domain::events::{topics, WorkflowEvent};
use crate::domain::task::TaskResult;
use crate::handler::{HandlerKind, TaskHandler};
use crate::CoreError;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, error, warn};

type HandlerMap = Arc<DashMap<HandlerKind, Arc<dyn TaskHandler>>>;

/// Registry of task handlers, keyed by kind
pub struct HandlerRegistry {
    channel: Arc<EventChannel>,
    handlers: HandlerMap,
}

impl HandlerRegistry {
    /// Create a registry bound to an event channel
    pub fn new(channel: Arc<EventChannel>) -> Self {
        Self {
            channel,
            handlers: Arc::new(DashMap::new()),
        }
    }

    /// Register a handler for its kind and subscribe it to the kind's
    /// dispatch topic
    ///
    /// One active instance per kind: re-registering a kind replaces the
    /// previous handler.
    pub fn register(&self, handler: Arc<dyn TaskHandler>) {
        let kind = handler.handler_kind();
        let replaced = self.handlers.insert(kind, handler).is_some();
        if replaced {
            warn!(kind = %kind, "Replacing previously registered handler");
            // The existing listener resolves the handler at dispatch time,
            // so no new subscription is needed.
            return;
        }

        self.channel.subscribe(
            &topics::dispatch(kind),
            Arc::new(DispatchListener {
                kind,
                channel: self.channel.clone(),
                handlers: self.handlers.clone(),
            }),
        );
        debug!(kind = %kind, "Registered handler");
    }

    /// Whether a handler is registered for the kind
    pub fn contains(&self, kind: HandlerKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// Look up the handler for a kind
    pub fn get(&self, kind: HandlerKind) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.get(&kind).map(|h| h.clone())
    }
}

/// Subscriber on one kind's dispatch topic
struct DispatchListener {
    kind: HandlerKind,
    channel: Arc<EventChannel>,
    handlers: HandlerMap,
}

#[async_trait]
impl EventSubscriber for DispatchListener {
    async fn on_event(&self, _topic: &str, event: Arc<WorkflowEvent>) {
        let WorkflowEvent::Dispatch(task) = event.as_ref() else {
            return;
        };

        let Some(handler) = self.handlers.get(&self.kind).map(|h| h.clone()) else {
            // Registration removed between dispatch and delivery; still
            // report exactly one result for the task.
            let result = TaskResult::failure(
                task,
                CoreError::HandlerNotFound(self.kind.to_string()).to_string(),
            );
            if let Err(e) = self
                .channel
                .publish(topics::RESULTS, WorkflowEvent::Result(result))
            {
                error!(error = %e, "Failed to publish missing-handler result");
            }
            return;
        };

        // Spawn so many tasks can be in flight concurrently; delivery order
        // on this topic still follows publish order.
        let task = task.clone();
        let channel = self.channel.clone();
        tokio::spawn(async move {
            let result = match handler.execute(task.clone()).await {
                Ok(result) => result,
                Err(e) => TaskResult::failure(&task, e.to_string()),
            };

            if let Err(e) = channel.publish(topics::RESULTS, WorkflowEvent::Result(result)) {
                error!(error = %e, task_id = %task.id.0, "Failed to publish task result");
            }
        });
    }
}
