// Processor protocol
pub mod gateway;

// Authorization state and routing
pub mod challenge_router;
pub mod pending_payments;

// Terminal state handling
pub mod order_finalizer;

// Entry points
pub mod checkout;
pub mod donations;
pub mod notifications;

// Outside collaborators
pub mod collaborators;
