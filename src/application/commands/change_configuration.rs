//! Change Configuration command

use rust_ocpp::v1_6::messages::change_configuration::{
    ChangeConfigurationRequest, ChangeConfigurationResponse,
};
use tracing::info;

use super::{from_payload, to_payload, CommandError, SharedCommandSender};

pub async fn change_configuration(
    command_sender: &SharedCommandSender,
    station_id: &str,
    key: String,
    value: String,
) -> Result<String, CommandError> {
    info!(station_id, key = key.as_str(), value = value.as_str(), "ChangeConfiguration");

    let payload = to_payload(&ChangeConfigurationRequest { key, value })?;
    let result = command_sender
        .send_command(station_id, "ChangeConfiguration", payload)
        .await?;

    let response: ChangeConfigurationResponse = from_payload(result)?;
    Ok(format!("{:?}", response.status))
}
