//! StopTransaction handler

use chrono::{DateTime, Utc};
use rust_ocpp::v1_6::messages::stop_transaction::StopTransactionResponse;
use rust_ocpp::v1_6::types::{AuthorizationStatus, IdTagInfo};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::application::charging::{parse_meter_values, MeterValue, StopRequest};
use crate::application::handlers::OcppHandlerV16;
use crate::domain::DomainError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StopTransaction {
    transaction_id: Option<i32>,
    meter_stop: Option<f64>,
    timestamp: Option<DateTime<Utc>>,
    reason: Option<String>,
    #[serde(default)]
    transaction_data: Vec<MeterValue>,
}

pub fn handle_stop_transaction(
    handler: &OcppHandlerV16,
    station_id: &str,
    payload: &Value,
) -> Value {
    match serde_json::from_value::<StopTransaction>(payload.clone()) {
        Ok(req) => {
            info!(
                station_id,
                transaction_id = ?req.transaction_id,
                meter_stop = ?req.meter_stop,
                reason = ?req.reason,
                "StopTransaction"
            );

            // Trailing samples carried on the stop message.
            let trailing = parse_meter_values(&req.transaction_data);
            if !trailing.is_empty() {
                match handler.services.machine.apply_meter_reading(station_id, trailing) {
                    Ok(_) => {}
                    Err(DomainError::NoActiveTransaction(_)) => {
                        debug!(station_id, "Trailing samples outside a transaction ignored");
                    }
                    Err(e) => warn!(station_id, error = %e, "Trailing samples not applied"),
                }
            }

            let request = StopRequest {
                meter_stop: req.meter_stop,
                timestamp: req.timestamp,
                transaction_id: req.transaction_id,
                reason: req.reason,
            };
            if let Err(e) = handler.services.machine.stop_transaction(station_id, request) {
                warn!(station_id, error = %e, "StopTransaction not applied");
            }
        }
        Err(e) => warn!(station_id, error = %e, "Failed to parse StopTransaction"),
    }

    let response = StopTransactionResponse {
        id_tag_info: Some(IdTagInfo {
            status: AuthorizationStatus::Accepted,
            expiry_date: None,
            parent_id_tag: None,
        }),
    };
    serde_json::to_value(&response).unwrap_or_default()
}
