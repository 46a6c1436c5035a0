//! Reset command

use rust_ocpp::v1_6::messages::reset::{ResetRequest, ResetResponse};
use rust_ocpp::v1_6::types::ResetRequestStatus;
use tracing::info;

use super::{from_payload, to_payload, CommandError, SharedCommandSender};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetKind {
    Soft,
    Hard,
}

pub async fn reset(
    command_sender: &SharedCommandSender,
    station_id: &str,
    reset_type: ResetKind,
) -> Result<String, CommandError> {
    info!(station_id, ?reset_type, "Reset");

    let kind = match reset_type {
        ResetKind::Soft => ResetRequestStatus::Soft,
        ResetKind::Hard => ResetRequestStatus::Hard,
    };
    let payload = to_payload(&ResetRequest { kind })?;

    let result = command_sender.send_command(station_id, "Reset", payload).await?;

    let response: ResetResponse = from_payload(result)?;
    Ok(format!("{:?}", response.status))
}
