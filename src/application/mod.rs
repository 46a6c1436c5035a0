pub mod charging;
pub mod commands;
pub mod events;
pub mod handlers;
pub mod ingest;
pub mod phase;
pub mod registry;
pub mod services;
pub mod session;
pub mod simulation;

// Re-export key types for convenience
pub use charging::TransactionMachine;
pub use commands::{CommandError, CommandSender, SharedCommandSender};
pub use events::{create_event_bus, Event, EventBus, EventSubscriber, SharedEventBus};
pub use handlers::{OcppHandlerV16, OcppServices};
pub use ingest::{ExternalEvent, ExternalEventIngest};
pub use phase::{ConnectionPhaseOrchestrator, SharedPhaseOrchestrator};
pub use registry::{SharedStationRegistry, StationRegistry};
pub use services::LivenessMonitor;
pub use session::{SessionManager, SessionRegistry, SharedSessionManager, SharedSessionRegistry};
pub use simulation::{SimulateStart, SimulationEngine};
