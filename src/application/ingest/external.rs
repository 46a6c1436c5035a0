//! External event ingest
//!
//! A third-party OCPP gateway forwards charger events to us as webhooks.
//! They drive the same transaction machine as our own WebSocket sessions,
//! with `connection_source = citrineos`. A station held by a live OCPP
//! session on this server is never driven from outside.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::application::charging::{
    parse_meter_values, BootInfo, MeterValue, StartRequest, StopRequest, TransactionMachine,
};
use crate::application::events::{Event, StationConnectedEvent, StationDisconnectedEvent};
use crate::application::simulation::SharedSimulationEngine;
use crate::domain::{ConnectionSource, DomainError, DomainResult, Station};

const SOURCE: ConnectionSource = ConnectionSource::Citrineos;

/// One forwarded charger event.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalEvent {
    pub station_id: String,
    pub action: String,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BootPayload {
    #[serde(default)]
    charge_point_vendor: String,
    #[serde(default)]
    charge_point_model: String,
    charge_point_serial_number: Option<String>,
    firmware_version: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusPayload {
    status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartPayload {
    id_tag: String,
    #[serde(default)]
    meter_start: f64,
    transaction_id: Option<i32>,
    timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StopPayload {
    transaction_id: Option<i32>,
    meter_stop: Option<f64>,
    timestamp: Option<DateTime<Utc>>,
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MeterPayload {
    #[serde(default)]
    meter_value: Vec<MeterValue>,
}

/// A gateway event whose action and payload have been validated.
enum GatewayCommand {
    Boot(BootPayload),
    Heartbeat,
    Status(StatusPayload),
    Start(StartPayload),
    Stop(StopPayload),
    Meter(MeterPayload),
}

impl GatewayCommand {
    fn decode(action: &str, payload: &Value) -> DomainResult<Self> {
        Ok(match action {
            "BootNotification" => Self::Boot(decode(payload)?),
            "Heartbeat" => Self::Heartbeat,
            "StatusNotification" => Self::Status(decode(payload)?),
            "StartTransaction" => Self::Start(decode(payload)?),
            "StopTransaction" => Self::Stop(decode(payload)?),
            "MeterValues" => Self::Meter(decode(payload)?),
            other => {
                return Err(DomainError::Validation(format!("Unsupported event: {other}")));
            }
        })
    }
}

pub struct ExternalEventIngest {
    machine: Arc<TransactionMachine>,
    simulation: SharedSimulationEngine,
}

pub type SharedExternalEventIngest = Arc<ExternalEventIngest>;

impl ExternalEventIngest {
    pub fn new(machine: Arc<TransactionMachine>, simulation: SharedSimulationEngine) -> Self {
        Self { machine, simulation }
    }

    /// Apply one event and return the resulting station snapshot.
    ///
    /// The action and payload are checked before the station is touched, so
    /// a rejected event leaves no trace.
    pub fn ingest(&self, event: ExternalEvent) -> DomainResult<Station> {
        let station_id = event.station_id.trim();
        if station_id.is_empty() {
            return Err(DomainError::Validation("stationId is required".into()));
        }
        let registry = self.machine.registry();

        if event.action == "Disconnect" {
            self.ensure_not_hardware(station_id, &event.action)?;
            self.disconnect(station_id)?;
            return registry.get(station_id);
        }

        let command = GatewayCommand::decode(&event.action, &event.payload)?;
        self.ensure_not_hardware(station_id, &event.action)?;

        registry.ensure(station_id);
        let current = registry.get(station_id)?;
        self.attach(station_id, &current)?;
        registry.update(station_id, |station| station.touch(Utc::now()))?;
        info!(station_id, action = %event.action, "External event");

        match command {
            GatewayCommand::Boot(p) => self.machine.boot(
                station_id,
                BootInfo {
                    vendor: p.charge_point_vendor,
                    model: p.charge_point_model,
                    serial_number: p.charge_point_serial_number,
                    firmware_version: p.firmware_version,
                },
            )?,
            GatewayCommand::Heartbeat => self.machine.heartbeat(station_id)?,
            GatewayCommand::Status(p) => {
                self.machine.status_notification(station_id, &p.status)?;
            }
            GatewayCommand::Start(p) => {
                self.machine.start_transaction(
                    station_id,
                    StartRequest {
                        id_tag: p.id_tag,
                        meter_start: p.meter_start,
                        timestamp: p.timestamp,
                        transaction_id: p.transaction_id,
                        soc: None,
                    },
                    SOURCE,
                )?;
            }
            GatewayCommand::Stop(p) => {
                self.machine.stop_transaction(
                    station_id,
                    StopRequest {
                        meter_stop: p.meter_stop,
                        timestamp: p.timestamp,
                        transaction_id: p.transaction_id,
                        reason: p.reason,
                    },
                )?;
            }
            GatewayCommand::Meter(p) => {
                self.machine
                    .apply_meter_reading(station_id, parse_meter_values(&p.meter_value))?;
            }
        }
        registry.get(station_id)
    }

    fn ensure_not_hardware(&self, station_id: &str, action: &str) -> DomainResult<()> {
        let on_hardware = self
            .machine
            .registry()
            .get(station_id)
            .is_ok_and(|s| s.connected && s.connection_source == ConnectionSource::Ocpp);
        if on_hardware {
            warn!(station_id, action, "Webhook for a station on a live OCPP session");
            return Err(DomainError::HardwareConnected(station_id.to_string()));
        }
        Ok(())
    }

    /// The gateway reports the charger gone. Idempotent.
    pub fn disconnect(&self, station_id: &str) -> DomainResult<()> {
        let registry = self.machine.registry();
        let station = registry.get(station_id)?;
        if !station.connected || station.connection_source != SOURCE {
            return Ok(());
        }

        self.machine.finalize_dangling(station_id, "EVDisconnected");
        registry.update(station_id, |s| {
            if s.connection_source == SOURCE {
                s.mark_offline();
            }
        })?;
        registry
            .event_bus()
            .publish(Event::StationDisconnected(StationDisconnectedEvent {
                station_id: station_id.to_string(),
                source: SOURCE,
                reason: Some("gateway disconnect".into()),
                timestamp: Utc::now(),
            }));
        Ok(())
    }

    /// First event from the gateway takes the station over.
    fn attach(&self, station_id: &str, current: &Station) -> DomainResult<()> {
        if current.connected && current.connection_source == SOURCE {
            return Ok(());
        }
        if let Some(superseded) = self.simulation.supersede(station_id) {
            if superseded.was_charging {
                self.machine.finalize_dangling(station_id, "superseded");
            }
        }
        self.machine
            .registry()
            .update(station_id, |s| s.mark_connected(SOURCE, Utc::now()))?;
        self.machine
            .registry()
            .event_bus()
            .publish(Event::StationConnected(StationConnectedEvent {
                station_id: station_id.to_string(),
                source: SOURCE,
                ocpp_version: None,
                timestamp: Utc::now(),
            }));
        Ok(())
    }
}

fn decode<T: serde::de::DeserializeOwned>(payload: &Value) -> DomainResult<T> {
    serde_json::from_value(payload.clone())
        .map_err(|e| DomainError::Validation(format!("Invalid payload: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::application::events::create_event_bus;
    use crate::application::registry::StationRegistry;
    use crate::application::simulation::SimulationEngine;
    use crate::config::SimulationConfig;
    use crate::domain::StationStatus;

    fn ingest() -> ExternalEventIngest {
        let registry = Arc::new(StationRegistry::new(create_event_bus(), 0.35));
        let machine = Arc::new(TransactionMachine::new(registry));
        let simulation = SimulationEngine::new(machine.clone(), SimulationConfig::default()).shared();
        ExternalEventIngest::new(machine, simulation)
    }

    fn event(station_id: &str, action: &str, payload: Value) -> ExternalEvent {
        ExternalEvent {
            station_id: station_id.into(),
            action: action.into(),
            payload,
        }
    }

    #[tokio::test]
    async fn drives_transaction_under_gateway_source() {
        let ingest = ingest();
        let s = ingest
            .ingest(event("GW1", "StatusNotification", json!({"status": "Available"})))
            .unwrap();
        assert!(s.connected);
        assert_eq!(s.connection_source, ConnectionSource::Citrineos);

        let s = ingest
            .ingest(event(
                "GW1",
                "StartTransaction",
                json!({"idTag": "T", "meterStart": 500, "transactionId": 9001}),
            ))
            .unwrap();
        assert_eq!(s.current_transaction.as_ref().unwrap().id, 9001);
        assert_eq!(s.status, StationStatus::Charging);

        let s = ingest
            .ingest(event("GW1", "StopTransaction", json!({"meterStop": 1500})))
            .unwrap();
        assert!(s.current_transaction.is_none());
        assert_eq!(s.session_history[0].energy_delivered, "1.00");
    }

    #[tokio::test]
    async fn refuses_station_on_live_ocpp_session() {
        let ingest = ingest();
        let registry = ingest.machine.registry();
        registry.ensure("CP1");
        registry
            .update("CP1", |s| s.mark_connected(ConnectionSource::Ocpp, Utc::now()))
            .unwrap();

        let err = ingest
            .ingest(event("CP1", "Heartbeat", json!({})))
            .unwrap_err();
        assert_eq!(err, DomainError::HardwareConnected("CP1".into()));
    }

    #[tokio::test]
    async fn unsupported_action_and_bad_payload_are_validation_errors() {
        let ingest = ingest();
        assert!(matches!(
            ingest.ingest(event("GW1", "Reset", json!({}))),
            Err(DomainError::Validation(_))
        ));
        assert!(matches!(
            ingest.ingest(event("GW1", "StatusNotification", json!({"nope": 1}))),
            Err(DomainError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn rejected_event_leaves_station_untouched() {
        let ingest = ingest();
        let registry = ingest.machine.registry();

        let err = ingest.ingest(event("GHOST", "Bogus", json!({}))).unwrap_err();
        assert_eq!(err, DomainError::Validation("Unsupported event: Bogus".into()));
        assert!(!registry.contains("GHOST"));

        registry.ensure("GW2");
        let err = ingest
            .ingest(event("GW2", "StartTransaction", json!({"meterStart": 5})))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        let s = registry.get("GW2").unwrap();
        assert!(!s.connected);
        assert_eq!(s.connection_source, ConnectionSource::None);
        assert_eq!(s.status, StationStatus::Offline);
        assert_eq!(s.message_count, 0);
    }

    #[tokio::test]
    async fn disconnect_finalizes_and_is_idempotent() {
        let ingest = ingest();
        ingest
            .ingest(event("GW1", "StartTransaction", json!({"idTag": "T", "meterStart": 0})))
            .unwrap();

        let s = ingest.ingest(event("GW1", "Disconnect", json!({}))).unwrap();
        assert!(!s.connected);
        assert_eq!(s.status, StationStatus::Offline);
        assert_eq!(s.session_history.len(), 1);

        ingest.disconnect("GW1").unwrap();
        assert_eq!(ingest.machine.registry().get("GW1").unwrap().session_history.len(), 1);
    }
}
