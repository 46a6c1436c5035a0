//! Trigger Message command

use rust_ocpp::v1_6::messages::trigger_message::{TriggerMessageRequest, TriggerMessageResponse};
use rust_ocpp::v1_6::types::MessageTrigger;
use tracing::info;

use super::{from_payload, to_payload, CommandError, SharedCommandSender};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerType {
    BootNotification,
    DiagnosticsStatusNotification,
    FirmwareStatusNotification,
    Heartbeat,
    MeterValues,
    StatusNotification,
}

pub async fn trigger_message(
    command_sender: &SharedCommandSender,
    station_id: &str,
    requested_message: TriggerType,
    connector_id: Option<u32>,
) -> Result<String, CommandError> {
    info!(station_id, ?requested_message, ?connector_id, "TriggerMessage");

    let requested_message = match requested_message {
        TriggerType::BootNotification => MessageTrigger::BootNotification,
        TriggerType::DiagnosticsStatusNotification => MessageTrigger::DiagnosticsStatusNotification,
        TriggerType::FirmwareStatusNotification => MessageTrigger::FirmwareStatusNotification,
        TriggerType::Heartbeat => MessageTrigger::Heartbeat,
        TriggerType::MeterValues => MessageTrigger::MeterValues,
        TriggerType::StatusNotification => MessageTrigger::StatusNotification,
    };
    let payload = to_payload(&TriggerMessageRequest {
        requested_message,
        connector_id,
    })?;

    let result = command_sender
        .send_command(station_id, "TriggerMessage", payload)
        .await?;

    let response: TriggerMessageResponse = from_payload(result)?;
    Ok(format!("{:?}", response.status))
}
