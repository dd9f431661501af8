//! In-process publish/subscribe event channel
//!
//! Volatile signaling only: no retry, no persistence, no delivery guarantee
//! beyond "all currently subscribed handlers are invoked once". Each topic
//! has its own queue and dispatcher task, so delivery follows publish order
//! within a topic and a subscriber may publish further events (including to
//! the topic it is currently handling) without deadlocking.

use crate::domain::events::WorkflowEvent;
use crate::CoreError;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::{Arc, RwLock, Weak};
use tokio::sync::mpsc;
use tracing::trace;

/// A registered consumer of channel events
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    /// Handle one delivered event
    async fn on_event(&self, topic: &str, event: Arc<WorkflowEvent>);
}

/// Topic selector for subscriptions: an exact name or a trailing-`*` prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicPattern {
    /// Matches one topic exactly
    Exact(String),

    /// Matches every topic starting with the prefix
    Prefix(String),
}

impl TopicPattern {
    /// Parse a pattern string; `"task.dispatch.*"` becomes a prefix match
    pub fn parse(pattern: &str) -> Self {
        match pattern.strip_suffix('*') {
            Some(prefix) => TopicPattern::Prefix(prefix.to_string()),
            None => TopicPattern::Exact(pattern.to_string()),
        }
    }

    /// Whether this pattern matches a concrete topic name
    pub fn matches(&self, topic: &str) -> bool {
        match self {
            TopicPattern::Exact(name) => name == topic,
            TopicPattern::Prefix(prefix) => topic.starts_with(prefix.as_str()),
        }
    }
}

struct Subscription {
    pattern: TopicPattern,
    subscriber: Arc<dyn EventSubscriber>,
}

struct ChannelInner {
    subscribers: RwLock<Vec<Subscription>>,
    topics: DashMap<String, mpsc::UnboundedSender<Arc<WorkflowEvent>>>,
}

impl ChannelInner {
    /// Snapshot the subscribers matching a topic, in registration order
    fn matching_subscribers(&self, topic: &str) -> Vec<Arc<dyn EventSubscriber>> {
        let subscriptions = self
            .subscribers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        subscriptions
            .iter()
            .filter(|s| s.pattern.matches(topic))
            .map(|s| s.subscriber.clone())
            .collect()
    }
}

/// The process-wide event channel, explicitly constructed and injected
///
/// Never a global singleton: the process entry point owns the instance and
/// passes it to every component at construction.
pub struct EventChannel {
    inner: Arc<ChannelInner>,
}

impl EventChannel {
    /// Create a new event channel
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ChannelInner {
                subscribers: RwLock::new(Vec::new()),
                topics: DashMap::new(),
            }),
        }
    }

    /// Register a subscriber for a topic or trailing-`*` pattern
    pub fn subscribe(&self, pattern: &str, subscriber: Arc<dyn EventSubscriber>) {
        let mut subscriptions = self
            .inner
            .subscribers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        subscriptions.push(Subscription {
            pattern: TopicPattern::parse(pattern),
            subscriber,
        });
    }

    /// Publish an event to a topic
    ///
    /// Enqueues and returns immediately; the topic's dispatcher task delivers
    /// to every matching subscriber in publish order. Safe to call from
    /// inside a subscriber.
    pub fn publish(&self, topic: &str, event: WorkflowEvent) -> Result<(), CoreError> {
        trace!(topic, "publish");
        let sender = self
            .inner
            .topics
            .entry(topic.to_string())
            .or_insert_with(|| Self::spawn_dispatcher(topic.to_string(), Arc::downgrade(&self.inner)))
            .clone();

        sender
            .send(Arc::new(event))
            .map_err(|_| CoreError::ChannelError(format!("Topic queue closed: {}", topic)))
    }

    /// Spawn the dispatcher task for one topic
    fn spawn_dispatcher(
        topic: String,
        inner: Weak<ChannelInner>,
    ) -> mpsc::UnboundedSender<Arc<WorkflowEvent>> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Arc<WorkflowEvent>>();

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let Some(inner) = inner.upgrade() else {
                    // Channel dropped, stop delivering
                    return;
                };
                let subscribers = inner.matching_subscribers(&topic);
                drop(inner);

                for subscriber in subscribers {
                    subscriber.on_event(&topic, event.clone()).await;
                }
            }
        });

        tx
    }
}

impl Default for EventChannel {
    fn default() -> Self {
        Self::new()
    }
}
