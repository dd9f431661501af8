//! Workflow store abstraction
//!
//! The orchestrator owns workflow state through this trait so a durable
//! backing implementation can be substituted without touching orchestration
//! logic. The shipped implementation is in-memory.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

use crate::domain::workflow::{Workflow, WorkflowId};
use crate::CoreError;

/// Store for workflow state, exclusively mutated by the orchestrator
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Find a workflow by ID
    async fn get(&self, id: &WorkflowId) -> Result<Option<Workflow>, CoreError>;

    /// Save a workflow, overwriting any existing entry with the same ID
    async fn put(&self, workflow: Workflow) -> Result<(), CoreError>;

    /// Delete a workflow
    async fn delete(&self, id: &WorkflowId) -> Result<(), CoreError>;

    /// List all stored workflow IDs
    async fn list(&self) -> Result<Vec<WorkflowId>, CoreError>;
}

/// In-memory implementation of the workflow store
pub struct MemoryWorkflowStore {
    workflows: Arc<DashMap<String, Workflow>>,
}

impl MemoryWorkflowStore {
    /// Create a new memory workflow store
    pub fn new() -> Self {
        Self {
            workflows: Arc::new(DashMap::with_capacity(16)),
        }
    }
}

impl Default for MemoryWorkflowStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkflowStore for MemoryWorkflowStore {
    async fn get(&self, id: &WorkflowId) -> Result<Option<Workflow>, CoreError> {
        Ok(self.workflows.get(&id.0).map(|w| w.clone()))
    }

    async fn put(&self, workflow: Workflow) -> Result<(), CoreError> {
        self.workflows.insert(workflow.id.0.clone(), workflow);
        Ok(())
    }

    async fn delete(&self, id: &WorkflowId) -> Result<(), CoreError> {
        self.workflows.remove(&id.0);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<WorkflowId>, CoreError> {
        Ok(self
            .workflows
            .iter()
            .map(|entry| WorkflowId(entry.key().clone()))
            .collect())
    }
}
