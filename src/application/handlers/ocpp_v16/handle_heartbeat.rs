//! Heartbeat handler

use chrono::Utc;
use rust_ocpp::v1_6::messages::heart_beat::HeartbeatResponse;
use serde_json::Value;
use tracing::{debug, warn};

use crate::application::handlers::OcppHandlerV16;

pub fn handle_heartbeat(handler: &OcppHandlerV16, station_id: &str, _payload: &Value) -> Value {
    debug!(station_id, "Heartbeat");
    if let Err(e) = handler.services.machine.heartbeat(station_id) {
        warn!(station_id, error = %e, "Heartbeat for unknown station");
    }

    let response = HeartbeatResponse {
        current_time: Utc::now(),
    };
    serde_json::to_value(&response).unwrap_or_default()
}
