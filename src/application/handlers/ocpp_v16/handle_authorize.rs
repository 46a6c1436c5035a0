//! Authorize handler

use rust_ocpp::v1_6::messages::authorize::{AuthorizeRequest, AuthorizeResponse};
use rust_ocpp::v1_6::types::{AuthorizationStatus, IdTagInfo};
use serde_json::Value;
use tracing::{info, warn};

use crate::application::handlers::OcppHandlerV16;

/// Every tag is accepted.
pub fn handle_authorize(_handler: &OcppHandlerV16, station_id: &str, payload: &Value) -> Value {
    match serde_json::from_value::<AuthorizeRequest>(payload.clone()) {
        Ok(req) => info!(station_id, id_tag = req.id_tag.as_str(), "Authorize"),
        Err(e) => warn!(station_id, error = %e, "Malformed Authorize, accepting anyway"),
    }

    let response = AuthorizeResponse {
        id_tag_info: IdTagInfo {
            status: AuthorizationStatus::Accepted,
            expiry_date: None,
            parent_id_tag: None,
        },
    };
    serde_json::to_value(&response).unwrap_or_default()
}
