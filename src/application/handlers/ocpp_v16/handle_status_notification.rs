//! StatusNotification handler

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info};

use crate::application::handlers::OcppHandlerV16;

/// Status is kept as a raw string so vendor vocabulary passes through.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusNotification {
    #[serde(default)]
    connector_id: u32,
    status: String,
    error_code: Option<String>,
    info: Option<String>,
}

pub fn handle_status_notification(
    handler: &OcppHandlerV16,
    station_id: &str,
    payload: &Value,
) -> Value {
    let req: StatusNotification = match serde_json::from_value(payload.clone()) {
        Ok(r) => r,
        Err(e) => {
            error!(station_id, error = %e, "Failed to parse StatusNotification");
            return json!({});
        }
    };

    info!(
        station_id,
        connector_id = req.connector_id,
        status = req.status.as_str(),
        error_code = ?req.error_code,
        info = ?req.info,
        "StatusNotification"
    );

    if let Err(e) = handler
        .services
        .machine
        .status_notification(station_id, &req.status)
    {
        error!(station_id, error = %e, "Status not applied");
    }
    json!({})
}
