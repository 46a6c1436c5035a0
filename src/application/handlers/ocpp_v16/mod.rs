//! OCPP 1.6 action handlers
//!
//! One module per charger-initiated action. Request payloads are decoded
//! inside each handler; responses are built from `rust_ocpp::v1_6` types.

use serde_json::{json, Value};
use tracing::{info, warn};

use crate::application::handlers::OcppHandlerV16;

mod handle_authorize;
mod handle_boot_notification;
mod handle_data_transfer;
mod handle_heartbeat;
mod handle_meter_values;
mod handle_start_transaction;
mod handle_status_notification;
mod handle_stop_transaction;

pub use handle_authorize::handle_authorize;
pub use handle_boot_notification::{boot_rejected, handle_boot_notification};
pub use handle_data_transfer::handle_data_transfer;
pub use handle_heartbeat::handle_heartbeat;
pub use handle_meter_values::handle_meter_values;
pub use handle_start_transaction::handle_start_transaction;
pub use handle_status_notification::handle_status_notification;
pub use handle_stop_transaction::handle_stop_transaction;

/// Actions a charge point may initiate.
pub const CP_TO_CS_ACTIONS: &[&str] = &[
    "Authorize",
    "BootNotification",
    "DataTransfer",
    "DiagnosticsStatusNotification",
    "FirmwareStatusNotification",
    "Heartbeat",
    "MeterValues",
    "StartTransaction",
    "StatusNotification",
    "StopTransaction",
];

const CS_TO_CP_ACTIONS: &[&str] = &[
    "CancelReservation",
    "ChangeAvailability",
    "ChangeConfiguration",
    "ClearCache",
    "ClearChargingProfile",
    "GetCompositeSchedule",
    "GetConfiguration",
    "GetDiagnostics",
    "GetLocalListVersion",
    "RemoteStartTransaction",
    "RemoteStopTransaction",
    "ReserveNow",
    "Reset",
    "SendLocalList",
    "SetChargingProfile",
    "TriggerMessage",
    "UnlockConnector",
    "UpdateFirmware",
];

/// Central-system commands that a charger must never send us.
pub fn is_cs_to_cp_action(action: &str) -> bool {
    CS_TO_CP_ACTIONS.contains(&action)
}

/// Routes an identified station's Call to its handler.
pub fn action_matcher(
    handler: &OcppHandlerV16,
    station_id: &str,
    action: &str,
    payload: &Value,
) -> Value {
    match action {
        "Authorize" => handle_authorize(handler, station_id, payload),
        "BootNotification" => handle_boot_notification(handler, station_id, payload),
        "DataTransfer" => handle_data_transfer(handler, station_id, payload),
        "Heartbeat" => handle_heartbeat(handler, station_id, payload),
        "MeterValues" => handle_meter_values(handler, station_id, payload),
        "StartTransaction" => handle_start_transaction(handler, station_id, payload),
        "StatusNotification" => handle_status_notification(handler, station_id, payload),
        "StopTransaction" => handle_stop_transaction(handler, station_id, payload),

        "DiagnosticsStatusNotification" | "FirmwareStatusNotification" => {
            info!(station_id, action, status = ?payload.get("status"), "Notification");
            json!({})
        }

        cs_to_cp if is_cs_to_cp_action(cs_to_cp) => {
            warn!(
                station_id,
                action = cs_to_cp,
                "Received CS->CP action from charge point (protocol error)"
            );
            json!({})
        }

        unknown => {
            warn!(station_id, action = unknown, "Unknown action");
            json!({})
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_direction() {
        assert!(is_cs_to_cp_action("RemoteStartTransaction"));
        assert!(!is_cs_to_cp_action("StartTransaction"));
        assert!(CP_TO_CS_ACTIONS.contains(&"MeterValues"));
    }
}
