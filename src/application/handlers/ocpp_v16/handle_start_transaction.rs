//! StartTransaction handler

use chrono::{DateTime, Utc};
use rust_ocpp::v1_6::messages::start_transaction::StartTransactionResponse;
use rust_ocpp::v1_6::types::{AuthorizationStatus, IdTagInfo};
use serde::Deserialize;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::application::charging::StartRequest;
use crate::application::handlers::OcppHandlerV16;
use crate::domain::ConnectionSource;

/// Some chargers send `meterStart` as a float.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartTransaction {
    #[serde(default)]
    connector_id: u32,
    id_tag: String,
    #[serde(default)]
    meter_start: f64,
    timestamp: Option<DateTime<Utc>>,
}

pub fn handle_start_transaction(
    handler: &OcppHandlerV16,
    station_id: &str,
    payload: &Value,
) -> Value {
    let req: StartTransaction = match serde_json::from_value(payload.clone()) {
        Ok(r) => r,
        Err(e) => {
            error!(station_id, error = %e, "Failed to parse StartTransaction");
            return response(0, AuthorizationStatus::Invalid);
        }
    };

    info!(
        station_id,
        connector_id = req.connector_id,
        id_tag = req.id_tag.as_str(),
        meter_start = req.meter_start,
        "StartTransaction"
    );

    let request = StartRequest {
        id_tag: req.id_tag,
        meter_start: req.meter_start,
        timestamp: req.timestamp,
        transaction_id: None,
        soc: None,
    };
    match handler
        .services
        .machine
        .start_transaction(station_id, request, ConnectionSource::Ocpp)
    {
        Ok(tx) => response(tx.id, AuthorizationStatus::Accepted),
        Err(e) => {
            warn!(station_id, error = %e, "StartTransaction rejected");
            response(0, AuthorizationStatus::ConcurrentTx)
        }
    }
}

fn response(transaction_id: i32, status: AuthorizationStatus) -> Value {
    let response = StartTransactionResponse {
        transaction_id,
        id_tag_info: IdTagInfo {
            status,
            expiry_date: None,
            parent_id_tag: None,
        },
    };
    serde_json::to_value(&response).unwrap_or_default()
}
