//! Investigation core
//!
//! The event-sourced state, the orchestrating state machine, the durable
//! store, and the service facade collaborators call.

pub mod orchestrator;
pub mod service;
pub mod state;
pub mod store;

pub use orchestrator::{
    CancellationToken, EventSink, InvestigationOrchestrator, NullSink, OrchestratorConfig,
};
pub use service::InvestigationService;
pub use state::{Event, EventType, InvestigationState, InvestigationStatus};
pub use store::SqliteEventStore;
