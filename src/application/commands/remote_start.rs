//! Remote Start Transaction command

use rust_ocpp::v1_6::messages::remote_start_transaction::{
    RemoteStartTransactionRequest, RemoteStartTransactionResponse,
};
use serde_json::Value;
use tracing::info;

use super::{from_payload, to_payload, CommandError, SharedCommandSender};

pub const ACTION: &str = "RemoteStartTransaction";

/// RemoteStartTransaction payload. The connector is left to the charger when absent.
pub fn request(id_tag: &str, connector_id: Option<u32>) -> Result<Value, CommandError> {
    to_payload(&RemoteStartTransactionRequest {
        connector_id,
        id_tag: id_tag.to_string(),
        charging_profile: None,
    })
}

pub async fn remote_start_transaction(
    command_sender: &SharedCommandSender,
    station_id: &str,
    id_tag: &str,
    connector_id: Option<u32>,
) -> Result<String, CommandError> {
    info!(station_id, id_tag, ?connector_id, "RemoteStartTransaction");

    let result = command_sender
        .send_command(station_id, ACTION, request(id_tag, connector_id)?)
        .await?;

    let response: RemoteStartTransactionResponse = from_payload(result)?;
    Ok(format!("{:?}", response.status))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::commands::test_support::{harness, next_call};
    use serde_json::json;

    #[test]
    fn connector_is_optional() {
        assert_eq!(request("TAG", None).unwrap(), json!({"idTag": "TAG"}));
        assert_eq!(request("TAG", Some(2)).unwrap()["connectorId"], 2);
    }

    #[tokio::test]
    async fn status_is_read_from_typed_response() {
        let mut h = harness("CP1");
        let sender = h.sender.clone();
        let call =
            tokio::spawn(async move { remote_start_transaction(&sender, "CP1", "TAG", None).await });
        tokio::task::yield_now().await;

        let (id, action, payload) = next_call(&mut h.outbox);
        assert_eq!(action, ACTION);
        assert_eq!(payload, json!({"idTag": "TAG"}));

        h.sender.handle_response("CP1", &id, json!({"status": "Rejected"}));
        assert_eq!(call.await.unwrap().unwrap(), "Rejected");
    }
}
