//! Transaction state machine
//!
//! The single place where station status, transactions and telemetry change
//! in response to charger traffic. Real OCPP sessions, the simulator and the
//! webhook ingest all drive stations through these operations, so their
//! transitions are indistinguishable to observers.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::capabilities::derive_capabilities;
use crate::application::events::{
    Event, MeterValuesEvent, TransactionStartedEvent, TransactionStoppedEvent,
};
use crate::application::registry::SharedStationRegistry;
use crate::domain::{
    Capabilities, CompletedSession, ConfigEntry, ConnectionSource, DomainError, DomainResult,
    MeterReading, StationStatus, Transaction,
};

/// Identity reported by a BootNotification.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BootInfo {
    pub vendor: String,
    pub model: String,
    pub serial_number: Option<String>,
    pub firmware_version: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StartRequest {
    pub id_tag: String,
    /// Wh
    pub meter_start: f64,
    pub timestamp: Option<DateTime<Utc>>,
    /// Externally assigned id; the registry counter is used when absent.
    pub transaction_id: Option<i32>,
    pub soc: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StopRequest {
    /// Wh; the last known register value is used when absent.
    pub meter_stop: Option<f64>,
    pub timestamp: Option<DateTime<Utc>>,
    pub transaction_id: Option<i32>,
    pub reason: Option<String>,
}

pub struct TransactionMachine {
    registry: SharedStationRegistry,
}

impl TransactionMachine {
    pub fn new(registry: SharedStationRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &SharedStationRegistry {
        &self.registry
    }

    pub fn boot(&self, station_id: &str, info: BootInfo) -> DomainResult<()> {
        info!(
            station_id,
            vendor = %info.vendor,
            model = %info.model,
            firmware = ?info.firmware_version,
            "BootNotification"
        );
        self.registry.update(station_id, |station| {
            station.vendor = Some(info.vendor);
            station.model = Some(info.model);
            if info.serial_number.is_some() {
                station.serial_number = info.serial_number;
            }
            if info.firmware_version.is_some() {
                station.firmware_version = info.firmware_version;
            }
            // A rebooting charger replays its own StopTransaction later.
            if station.is_charging() {
                debug!(station_id, "Boot during transaction, keeping status");
            } else {
                station.status = StationStatus::Available;
            }
        })
    }

    /// Liveness only.
    pub fn heartbeat(&self, station_id: &str) -> DomainResult<()> {
        self.registry.update(station_id, |station| {
            station.last_heartbeat = Some(Utc::now());
        })
    }

    /// Map the charger's vocabulary and apply it. While a transaction is
    /// active, statuses that cannot carry one are not applied.
    pub fn status_notification(
        &self,
        station_id: &str,
        raw_status: &str,
    ) -> DomainResult<StationStatus> {
        let status = StationStatus::from_ocpp(raw_status);
        if let StationStatus::Other(ref raw) = status {
            warn!(station_id, status = %raw, "Unknown status vocabulary, passing through");
        }
        self.registry.update(station_id, |station| {
            if station.is_charging() && !status.allows_transaction() {
                debug!(
                    station_id,
                    status = %status,
                    "Status deferred until the active transaction stops"
                );
            } else {
                station.status = status.clone();
            }
            station.status.clone()
        })
    }

    pub fn start_transaction(
        &self,
        station_id: &str,
        request: StartRequest,
        source: ConnectionSource,
    ) -> DomainResult<Transaction> {
        let tx = self.registry.try_update(station_id, |station| {
            if station.is_charging() {
                return Err(DomainError::AlreadyCharging(station_id.to_string()));
            }
            let id = request
                .transaction_id
                .unwrap_or_else(|| self.registry.next_transaction_id());
            let start_time = request.timestamp.unwrap_or_else(Utc::now);
            let tx = Transaction::new(id, request.id_tag.clone(), request.meter_start, start_time)
                .with_soc(request.soc);

            station.meter_history.clear();
            station.push_meter_sample(tx.sample(start_time));
            station.current_transaction = Some(tx.clone());
            station.status = StationStatus::Charging;
            Ok(tx)
        })?;

        info!(
            station_id,
            transaction_id = tx.id,
            id_tag = %tx.id_tag,
            meter_start = tx.meter_start,
            source = %source,
            "Transaction started"
        );
        self.registry
            .event_bus()
            .publish(Event::TransactionStarted(TransactionStartedEvent {
                station_id: station_id.to_string(),
                transaction_id: tx.id,
                id_tag: tx.id_tag.clone(),
                meter_start: tx.meter_start,
                source,
                timestamp: tx.start_time,
            }));
        Ok(tx)
    }

    /// Fold one reading into the active transaction and record a history sample.
    pub fn apply_meter_reading(
        &self,
        station_id: &str,
        reading: MeterReading,
    ) -> DomainResult<Transaction> {
        let tx = self.registry.try_update(station_id, |station| {
            let Some(mut tx) = station.current_transaction.clone() else {
                return Err(DomainError::NoActiveTransaction(station_id.to_string()));
            };
            tx.apply_reading(&reading);
            station.push_meter_sample(tx.sample(reading.timestamp.unwrap_or_else(Utc::now)));
            station.current_transaction = Some(tx.clone());
            Ok(tx)
        })?;

        debug!(
            station_id,
            transaction_id = tx.id,
            meter_value = tx.meter_value,
            power = tx.power,
            soc = ?tx.soc,
            "Meter values applied"
        );
        self.registry
            .event_bus()
            .publish(Event::MeterValuesReceived(MeterValuesEvent {
                station_id: station_id.to_string(),
                transaction_id: tx.id,
                meter_value: tx.meter_value,
                power: tx.power,
                energy: tx.energy,
                soc: tx.soc,
                timestamp: Utc::now(),
            }));
        Ok(tx)
    }

    /// Finalize the active transaction at the station's own price.
    pub fn stop_transaction(
        &self,
        station_id: &str,
        request: StopRequest,
    ) -> DomainResult<CompletedSession> {
        let session = self.registry.try_update(station_id, |station| {
            let Some(tx) = station.current_transaction.take() else {
                return Err(DomainError::NoActiveTransaction(station_id.to_string()));
            };
            if let Some(requested) = request.transaction_id {
                if requested != tx.id {
                    warn!(
                        station_id,
                        requested,
                        active = tx.id,
                        "StopTransaction id mismatch, stopping the active transaction"
                    );
                }
            }
            let meter_stop = request.meter_stop.unwrap_or(tx.meter_value);
            let stop_time = request.timestamp.unwrap_or_else(Utc::now);
            let session = tx.finalize(meter_stop, stop_time, station.price_per_kwh);

            station.push_session(session.clone());
            station.meter_history.clear();
            if station.connected {
                station.status = StationStatus::Available;
            }
            Ok(session)
        })?;

        info!(
            station_id,
            transaction_id = session.id,
            energy_kwh = %session.energy_delivered,
            cost = %session.cost,
            duration_secs = session.duration_secs,
            "Transaction stopped"
        );
        self.registry
            .event_bus()
            .publish(Event::TransactionStopped(TransactionStoppedEvent {
                station_id: station_id.to_string(),
                transaction_id: session.id,
                energy_delivered: session.energy_delivered.clone(),
                cost: session.cost.clone(),
                duration_secs: session.duration_secs,
                reason: request.reason,
                timestamp: session.stop_time,
            }));
        Ok(session)
    }

    /// Close a transaction left behind by a lost connection, if there is one.
    pub fn finalize_dangling(&self, station_id: &str, reason: &str) -> Option<CompletedSession> {
        let request = StopRequest {
            reason: Some(reason.to_string()),
            ..Default::default()
        };
        match self.stop_transaction(station_id, request) {
            Ok(session) => {
                warn!(
                    station_id,
                    transaction_id = session.id,
                    reason,
                    "Dangling transaction finalized"
                );
                Some(session)
            }
            Err(_) => None,
        }
    }

    /// Merge a GetConfiguration result and re-derive capabilities.
    pub fn apply_configuration(
        &self,
        station_id: &str,
        entries: BTreeMap<String, ConfigEntry>,
        unknown_keys: &[String],
    ) -> DomainResult<Capabilities> {
        if !unknown_keys.is_empty() {
            debug!(station_id, ?unknown_keys, "Charger reported unknown configuration keys");
        }
        let count = entries.len();
        let caps = self.registry.update(station_id, |station| {
            station.configuration.extend(entries);
            station.capabilities = derive_capabilities(&station.configuration);
            station.capabilities.clone()
        })?;
        info!(station_id, keys = count, "Configuration stored");
        Ok(caps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::events::create_event_bus;
    use crate::application::registry::StationRegistry;
    use crate::domain::{StationPatch, MAX_SESSION_HISTORY};
    use std::sync::Arc;

    fn machine() -> TransactionMachine {
        let registry = Arc::new(StationRegistry::new(create_event_bus(), 0.35));
        registry.ensure("CP1");
        registry
            .update("CP1", |s| s.mark_connected(ConnectionSource::Ocpp, Utc::now()))
            .unwrap();
        TransactionMachine::new(registry)
    }

    fn start(machine: &TransactionMachine, meter_start: f64) -> DomainResult<Transaction> {
        machine.start_transaction(
            "CP1",
            StartRequest {
                id_tag: "TAG".into(),
                meter_start,
                ..Default::default()
            },
            ConnectionSource::Ocpp,
        )
    }

    #[test]
    fn boot_records_identity() {
        let m = machine();
        m.boot(
            "CP1",
            BootInfo {
                vendor: "ACME".into(),
                model: "Volt22".into(),
                serial_number: Some("SN-1".into()),
                firmware_version: Some("1.2.3".into()),
            },
        )
        .unwrap();
        let s = m.registry().get("CP1").unwrap();
        assert_eq!(s.vendor.as_deref(), Some("ACME"));
        assert_eq!(s.serial_number.as_deref(), Some("SN-1"));
        assert_eq!(s.status, StationStatus::Available);
    }

    #[test]
    fn start_then_stop_round_trip() {
        let m = machine();
        let tx = start(&m, 1_000.0).unwrap();
        let s = m.registry().get("CP1").unwrap();
        assert_eq!(s.status, StationStatus::Charging);
        assert_eq!(s.current_transaction.as_ref().unwrap().id, tx.id);
        assert_eq!(s.current_transaction.as_ref().unwrap().meter_value, 1_000.0);

        let err = start(&m, 1_000.0).unwrap_err();
        assert_eq!(err.to_string(), "Already charging");

        let done = m
            .stop_transaction(
                "CP1",
                StopRequest {
                    meter_stop: Some(1_000.0),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(done.energy_delivered, "0.00");
        assert_eq!(done.cost, "0.00");

        let s = m.registry().get("CP1").unwrap();
        assert!(s.current_transaction.is_none());
        assert_eq!(s.status, StationStatus::Available);
        assert!(s.meter_history.is_empty());
        assert_eq!(s.session_history.len(), 1);
    }

    #[test]
    fn stop_without_transaction_is_rejected() {
        let m = machine();
        let err = m.stop_transaction("CP1", StopRequest::default()).unwrap_err();
        assert_eq!(err, DomainError::NoActiveTransaction("CP1".into()));
    }

    #[test]
    fn meter_readings_are_monotonic_and_recorded() {
        let m = machine();
        start(&m, 2_000.0).unwrap();

        m.apply_meter_reading(
            "CP1",
            MeterReading {
                meter_value: Some(3_000.0),
                power: Some(11_000.0),
                ..Default::default()
            },
        )
        .unwrap();
        let tx = m
            .apply_meter_reading(
                "CP1",
                MeterReading {
                    meter_value: Some(2_500.0),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(tx.meter_value, 3_000.0);
        assert!((tx.energy - 1.0).abs() < 1e-9);

        let s = m.registry().get("CP1").unwrap();
        assert_eq!(s.meter_history.len(), 3);
    }

    #[test]
    fn meter_reading_without_transaction_fails() {
        let m = machine();
        let err = m
            .apply_meter_reading("CP1", MeterReading::default())
            .unwrap_err();
        assert_eq!(err.to_string(), "No active transaction");
    }

    #[test]
    fn cost_uses_station_price() {
        let m = machine();
        m.registry()
            .patch(
                "CP1",
                StationPatch {
                    price_per_kwh: Some(0.5),
                    ..Default::default()
                },
            )
            .unwrap();
        start(&m, 0.0).unwrap();
        let done = m
            .stop_transaction(
                "CP1",
                StopRequest {
                    meter_stop: Some(10_000.0),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(done.energy_delivered, "10.00");
        assert_eq!(done.cost, "5.00");
    }

    #[test]
    fn status_mapping_preserves_transaction_invariant() {
        let m = machine();
        assert_eq!(
            m.status_notification("CP1", "SuspendedEVSE").unwrap(),
            StationStatus::Suspended
        );
        assert_eq!(
            m.status_notification("CP1", "Vendor42").unwrap(),
            StationStatus::Other("Vendor42".into())
        );

        start(&m, 0.0).unwrap();
        assert_eq!(
            m.status_notification("CP1", "SuspendedEV").unwrap(),
            StationStatus::Suspended
        );
        assert_eq!(
            m.status_notification("CP1", "Finishing").unwrap(),
            StationStatus::Suspended
        );
    }

    #[test]
    fn history_is_capped() {
        let m = machine();
        for _ in 0..(MAX_SESSION_HISTORY + 5) {
            start(&m, 0.0).unwrap();
            m.stop_transaction("CP1", StopRequest::default()).unwrap();
        }
        let s = m.registry().get("CP1").unwrap();
        assert_eq!(s.session_history.len(), MAX_SESSION_HISTORY);
        assert!(s.session_history[0].id > s.session_history[1].id);
    }

    #[test]
    fn configuration_updates_capabilities() {
        let m = machine();
        let entries = [("SupportedFeatureProfiles", "Core,Reservation")]
            .into_iter()
            .map(|(k, v)| {
                (
                    k.to_string(),
                    ConfigEntry {
                        value: Some(v.to_string()),
                        readonly: true,
                    },
                )
            })
            .collect();
        let caps = m.apply_configuration("CP1", entries, &[]).unwrap();
        assert!(caps.reservation);
        let s = m.registry().get("CP1").unwrap();
        assert!(s.configuration.contains_key("SupportedFeatureProfiles"));
    }

    #[tokio::test]
    async fn start_publishes_transaction_started() {
        let m = machine();
        let mut sub = m.registry().event_bus().subscribe();
        start(&m, 0.0).unwrap();

        let mut saw_started = false;
        while let Some(msg) = sub.try_recv() {
            if let Event::TransactionStarted(e) = msg.event {
                assert_eq!(e.station_id, "CP1");
                saw_started = true;
            }
        }
        assert!(saw_started);
    }
}
