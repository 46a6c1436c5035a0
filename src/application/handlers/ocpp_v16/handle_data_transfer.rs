//! DataTransfer handler

use rust_ocpp::v1_6::messages::data_transfer::{DataTransferRequest, DataTransferResponse};
use rust_ocpp::v1_6::types::DataTransferStatus;
use serde_json::Value;
use tracing::{info, warn};

use crate::application::handlers::OcppHandlerV16;

pub fn handle_data_transfer(_handler: &OcppHandlerV16, station_id: &str, payload: &Value) -> Value {
    match serde_json::from_value::<DataTransferRequest>(payload.clone()) {
        Ok(req) => info!(
            station_id,
            vendor_id = req.vendor_string.as_str(),
            message_id = ?req.message_id,
            "DataTransfer"
        ),
        Err(e) => warn!(station_id, error = %e, "Malformed DataTransfer"),
    }

    let response = DataTransferResponse {
        status: DataTransferStatus::Accepted,
        data: None,
    };
    serde_json::to_value(&response).unwrap_or_default()
}
