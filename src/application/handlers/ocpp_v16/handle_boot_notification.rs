//! BootNotification handler

use chrono::Utc;
use rust_ocpp::v1_6::messages::boot_notification::{
    BootNotificationRequest, BootNotificationResponse,
};
use rust_ocpp::v1_6::types::RegistrationStatus;
use serde_json::Value;
use tracing::error;

use crate::application::charging::BootInfo;
use crate::application::handlers::OcppHandlerV16;

pub fn handle_boot_notification(
    handler: &OcppHandlerV16,
    station_id: &str,
    payload: &Value,
) -> Value {
    let req: BootNotificationRequest = match serde_json::from_value(payload.clone()) {
        Ok(r) => r,
        Err(e) => {
            error!(station_id, error = %e, "Failed to deserialize BootNotificationRequest");
            return registration(handler, RegistrationStatus::Rejected);
        }
    };

    let info = BootInfo {
        vendor: req.charge_point_vendor,
        model: req.charge_point_model,
        serial_number: req.charge_point_serial_number,
        firmware_version: req.firmware_version,
    };
    if let Err(e) = handler.services.machine.boot(station_id, info) {
        error!(station_id, error = %e, "Boot not applied");
        return registration(handler, RegistrationStatus::Rejected);
    }

    registration(handler, RegistrationStatus::Accepted)
}

/// Answer for a Boot that could not identify the session.
pub fn boot_rejected(handler: &OcppHandlerV16) -> Value {
    registration(handler, RegistrationStatus::Pending)
}

fn registration(handler: &OcppHandlerV16, status: RegistrationStatus) -> Value {
    let response = BootNotificationResponse {
        current_time: Utc::now(),
        interval: handler.services.heartbeat_interval,
        status,
    };
    serde_json::to_value(&response).unwrap_or_default()
}
