//! WebSocket interfaces
//!
//! - `ocpp_server`: OCPP WebSocket server
//! - `negotiator`: subprotocol negotiation

pub mod negotiator;
pub mod ocpp_server;

pub use negotiator::{Negotiated, ProtocolNegotiator};
pub use ocpp_server::{extract_station_id, OcppServer};
