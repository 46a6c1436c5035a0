//! Unlock Connector command

use rust_ocpp::v1_6::messages::unlock_connector::{UnlockConnectorRequest, UnlockConnectorResponse};
use tracing::info;

use super::{from_payload, to_payload, CommandError, SharedCommandSender};

pub async fn unlock_connector(
    command_sender: &SharedCommandSender,
    station_id: &str,
    connector_id: u32,
) -> Result<String, CommandError> {
    info!(station_id, connector_id, "UnlockConnector");

    let payload = to_payload(&UnlockConnectorRequest { connector_id })?;
    let result = command_sender
        .send_command(station_id, "UnlockConnector", payload)
        .await?;

    let response: UnlockConnectorResponse = from_payload(result)?;
    Ok(format!("{:?}", response.status))
}
