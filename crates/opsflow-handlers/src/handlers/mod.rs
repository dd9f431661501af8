//! Stock task handlers, one module per handler kind

/// Invoicing and payments
pub mod billing;

/// Outbound customer messaging
pub mod customer_interaction;

/// Document generation and archiving
pub mod document;

/// Nested workflow launching
pub mod nested;

/// Appointment booking
pub mod scheduling;
