//! Demo / simulation engine

pub mod engine;
pub mod meter_model;

pub use engine::{SharedSimulationEngine, SimulateStart, SimulationEngine, Superseded};
pub use meter_model::{MeterModel, TickInput};
