//! MeterValues handler

use rust_ocpp::v1_6::messages::meter_values::MeterValuesResponse;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::application::charging::{parse_meter_values, MeterValue};
use crate::application::handlers::OcppHandlerV16;
use crate::domain::DomainError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MeterValues {
    #[serde(default)]
    connector_id: u32,
    transaction_id: Option<i32>,
    #[serde(default)]
    meter_value: Vec<MeterValue>,
}

pub fn handle_meter_values(handler: &OcppHandlerV16, station_id: &str, payload: &Value) -> Value {
    let empty = serde_json::to_value(&MeterValuesResponse {}).unwrap_or_default();

    let req: MeterValues = match serde_json::from_value(payload.clone()) {
        Ok(r) => r,
        Err(e) => {
            error!(station_id, error = %e, "Failed to parse MeterValues");
            return empty;
        }
    };

    let reading = parse_meter_values(&req.meter_value);
    debug!(
        station_id,
        connector_id = req.connector_id,
        transaction_id = ?req.transaction_id,
        meter_value = ?reading.meter_value,
        power = ?reading.power,
        soc = ?reading.soc,
        "MeterValues"
    );
    if reading.is_empty() {
        return empty;
    }

    match handler.services.machine.apply_meter_reading(station_id, reading) {
        Ok(tx) => {
            if req.transaction_id.is_some_and(|id| id != tx.id) {
                warn!(
                    station_id,
                    reported = ?req.transaction_id,
                    active = tx.id,
                    "MeterValues transaction id mismatch"
                );
            }
        }
        Err(DomainError::NoActiveTransaction(_)) => {
            debug!(station_id, "MeterValues outside a transaction ignored");
        }
        Err(e) => error!(station_id, error = %e, "MeterValues not applied"),
    }
    empty
}
