//! # EV Fleet CSMS
//!
//! OCPP 1.6 central system core for a fleet of EV charging stations.
//!
//! ## Architecture
//!
//! - **domain**: station, transaction and event types, domain errors
//! - **application**: registry, session manager, transaction machine,
//!   pending-call tracker, simulation engine, phase orchestrator, ingest
//! - **infrastructure**: persistence port and the in-memory store
//! - **interfaces**: OCPP WebSocket server
//! - **support**: OCPP-J framing, timers, shutdown, telemetry

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod interfaces;
pub mod server;
pub mod support;

pub use config::{default_config_path, AppConfig};
pub use server::{Csms, ServerHandle};
