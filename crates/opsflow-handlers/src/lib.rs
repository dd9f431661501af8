//!
//! Stock task handlers for the Opsflow Platform
//!
//! One handler per handler kind: customer interaction, scheduling, billing,
//! document handling and nested workflow launching. Each handler implements
//! the single `execute` capability; the engine treats them all uniformly.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use opsflow_core::{HandlerRegistry, WorkflowOrchestrator};
use std::sync::Arc;

pub mod handlers;

pub use handlers::billing::BillingHandler;
pub use handlers::customer_interaction::CustomerInteractionHandler;
pub use handlers::document::DocumentHandler;
pub use handlers::nested::NestedWorkflowHandler;
pub use handlers::scheduling::SchedulingHandler;

/// Register every stock handler on a registry
///
/// The nested workflow handler needs the orchestrator it launches children
/// on, so registration happens after the orchestrator is constructed.
pub fn register_stock_handlers(
    registry: &HandlerRegistry,
    orchestrator: Arc<WorkflowOrchestrator>,
) {
    registry.register(Arc::new(CustomerInteractionHandler::new()));
    registry.register(Arc::new(SchedulingHandler::new()));
    registry.register(Arc::new(BillingHandler::new()));
    registry.register(Arc::new(DocumentHandler::new()));
    registry.register(Arc::new(NestedWorkflowHandler::new(orchestrator)));
}
