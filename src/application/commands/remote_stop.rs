//! Remote Stop Transaction command

use rust_ocpp::v1_6::messages::remote_stop_transaction::{
    RemoteStopTransactionRequest, RemoteStopTransactionResponse,
};
use serde_json::Value;
use tracing::info;

use super::{from_payload, to_payload, CommandError, SharedCommandSender};

pub const ACTION: &str = "RemoteStopTransaction";

pub fn request(transaction_id: i32) -> Result<Value, CommandError> {
    to_payload(&RemoteStopTransactionRequest { transaction_id })
}

pub async fn remote_stop_transaction(
    command_sender: &SharedCommandSender,
    station_id: &str,
    transaction_id: i32,
) -> Result<String, CommandError> {
    info!(station_id, transaction_id, "RemoteStopTransaction");

    let result = command_sender
        .send_command(station_id, ACTION, request(transaction_id)?)
        .await?;

    let response: RemoteStopTransactionResponse = from_payload(result)?;
    Ok(format!("{:?}", response.status))
}
