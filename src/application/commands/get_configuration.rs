//! Get Configuration command
//!
//! The station record is filled by the tracker when the result arrives;
//! this wrapper only hands the keys back to the caller.

use rust_ocpp::v1_6::messages::get_configuration::{
    GetConfigurationRequest, GetConfigurationResponse,
};
use tracing::info;

use super::{from_payload, to_payload, CommandError, SharedCommandSender, GET_CONFIGURATION};
use crate::domain::ConfigEntry;

#[derive(Debug, Clone, PartialEq)]
pub struct ConfigurationResult {
    pub configuration_key: Vec<(String, ConfigEntry)>,
    pub unknown_key: Vec<String>,
}

pub async fn get_configuration(
    command_sender: &SharedCommandSender,
    station_id: &str,
    keys: Option<Vec<String>>,
) -> Result<ConfigurationResult, CommandError> {
    info!(station_id, ?keys, "GetConfiguration");

    let payload = to_payload(&GetConfigurationRequest { key: keys })?;
    let result = command_sender
        .send_command(station_id, GET_CONFIGURATION, payload)
        .await?;

    let response: GetConfigurationResponse = from_payload(result)?;
    Ok(ConfigurationResult {
        configuration_key: response
            .configuration_key
            .unwrap_or_default()
            .into_iter()
            .map(|kv| {
                (
                    kv.key,
                    ConfigEntry {
                        value: kv.value,
                        readonly: kv.readonly,
                    },
                )
            })
            .collect(),
        unknown_key: response.unknown_key.unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::commands::test_support::{harness, next_call};
    use serde_json::json;

    #[tokio::test]
    async fn result_reaches_caller_and_station() {
        let mut h = harness("CP1");
        let sender = h.sender.clone();
        let call = tokio::spawn(async move {
            get_configuration(&sender, "CP1", Some(vec!["HeartbeatInterval".into()])).await
        });
        tokio::task::yield_now().await;

        let (id, action, payload) = next_call(&mut h.outbox);
        assert_eq!(action, GET_CONFIGURATION);
        assert_eq!(payload["key"], json!(["HeartbeatInterval"]));

        h.sender.handle_response(
            "CP1",
            &id,
            json!({
                "configurationKey": [{"key": "HeartbeatInterval", "readonly": false, "value": "300"}],
                "unknownKey": ["Foo"]
            }),
        );

        let result = call.await.unwrap().unwrap();
        assert_eq!(result.configuration_key.len(), 1);
        assert_eq!(result.unknown_key, vec!["Foo"]);
        let station = h.machine.registry().get("CP1").unwrap();
        assert_eq!(
            station.configuration["HeartbeatInterval"].value.as_deref(),
            Some("300")
        );
    }
}
