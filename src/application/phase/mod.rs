//! Connection-phase orchestration for start/stop requests

mod orchestrator;

pub use orchestrator::{ConnectionPhaseOrchestrator, SharedPhaseOrchestrator};
