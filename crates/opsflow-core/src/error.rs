use thiserror::Error;

/// Core error type for the Opsflow engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Workflow not found in the store
    #[error("Workflow not found: {0}")]
    WorkflowNotFound(String),

    /// Step not found within a workflow
    #[error("Step not found: {0}")]
    StepNotFound(String),

    /// No handler registered for a step's handler kind
    #[error("No handler registered for kind: {0}")]
    HandlerNotFound(String),

    /// Workflow definition is structurally invalid
    #[error("Definition error: {0}")]
    DefinitionError(String),

    /// Operation not allowed in the workflow's current status
    #[error("Lifecycle error: {0}")]
    LifecycleError(String),

    /// Workflow store error
    ///
    /// The shipped in-memory store never fails; durable `WorkflowStore`
    /// implementations report their backend failures through this variant.
    #[error("Store error: {0}")]
    StoreError(String),

    /// Event channel error
    #[error("Channel error: {0}")]
    ChannelError(String),

    /// Handler execution error
    #[error("Handler execution error: {0}")]
    HandlerExecutionError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::SerializationError(err.to_string())
    }
}

impl From<String> for CoreError {
    fn from(err: String) -> Self {
        CoreError::Other(err)
    }
}

impl From<&str> for CoreError {
    fn from(err: &str) -> Self {
        CoreError::Other(err.to_string())
    }
}
