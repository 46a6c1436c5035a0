//! Station domain model

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::status::{ConnectionSource, StationStatus};
use super::transaction::{CompletedSession, MeterSample, Transaction};

/// Newest-first session history bound.
pub const MAX_SESSION_HISTORY: usize = 50;
/// Meter history bound.
pub const MAX_METER_HISTORY: usize = 100;

pub const DEFAULT_POWER_KW: f64 = 22.0;

/// A configuration value reported by the charger (GetConfiguration).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub value: Option<String>,
    pub readonly: bool,
}

/// Summary derived from well-known configuration keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    pub feature_profiles: Vec<String>,
    pub connector_count: Option<u32>,
    pub smart_charging: bool,
    pub reservation: bool,
    pub local_auth_list: bool,
}

/// Charging station as seen by observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Station {
    pub id: String,
    pub name: Option<String>,
    /// Rated power in kW
    pub power_kw: f64,
    pub price_per_kwh: f64,

    pub connected: bool,
    pub status: StationStatus,
    pub connection_source: ConnectionSource,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub connected_at: Option<DateTime<Utc>>,
    pub message_count: u64,

    pub vendor: Option<String>,
    pub model: Option<String>,
    pub serial_number: Option<String>,
    pub firmware_version: Option<String>,

    pub current_transaction: Option<Transaction>,
    pub last_transaction: Option<CompletedSession>,
    pub session_history: Vec<CompletedSession>,
    pub meter_history: Vec<MeterSample>,

    pub configuration: BTreeMap<String, ConfigEntry>,
    pub capabilities: Capabilities,
}

/// Admin-supplied metadata for a new station.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStation {
    pub id: String,
    pub name: Option<String>,
    pub power_kw: Option<f64>,
    pub price_per_kwh: Option<f64>,
}

/// Partial metadata update from the admin surface.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationPatch {
    pub name: Option<String>,
    pub power_kw: Option<f64>,
    pub price_per_kwh: Option<f64>,
}

/// Fields that survive a restart; written through the persistence port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationRecord {
    pub id: String,
    pub name: Option<String>,
    pub power_kw: f64,
    pub price_per_kwh: f64,
    pub vendor: Option<String>,
    pub model: Option<String>,
    pub serial_number: Option<String>,
    pub firmware_version: Option<String>,
    pub session_history: Vec<CompletedSession>,
}

impl Station {
    /// A never-seen station: disconnected, offline.
    pub fn new(id: impl Into<String>, price_per_kwh: f64) -> Self {
        Self {
            id: id.into(),
            name: None,
            power_kw: DEFAULT_POWER_KW,
            price_per_kwh,
            connected: false,
            status: StationStatus::Offline,
            connection_source: ConnectionSource::None,
            last_heartbeat: None,
            connected_at: None,
            message_count: 0,
            vendor: None,
            model: None,
            serial_number: None,
            firmware_version: None,
            current_transaction: None,
            last_transaction: None,
            session_history: Vec::new(),
            meter_history: Vec::new(),
            configuration: BTreeMap::new(),
            capabilities: Capabilities::default(),
        }
    }

    pub fn from_new(new: NewStation, default_price: f64) -> Self {
        let mut station = Self::new(new.id, new.price_per_kwh.unwrap_or(default_price));
        station.name = new.name;
        if let Some(power) = new.power_kw {
            station.power_kw = power;
        }
        station
    }

    pub fn from_record(record: StationRecord) -> Self {
        let mut station = Self::new(record.id, record.price_per_kwh);
        station.name = record.name;
        station.power_kw = record.power_kw;
        station.vendor = record.vendor;
        station.model = record.model;
        station.serial_number = record.serial_number;
        station.firmware_version = record.firmware_version;
        station.last_transaction = record.session_history.first().cloned();
        station.session_history = record.session_history;
        station
    }

    pub fn record(&self) -> StationRecord {
        StationRecord {
            id: self.id.clone(),
            name: self.name.clone(),
            power_kw: self.power_kw,
            price_per_kwh: self.price_per_kwh,
            vendor: self.vendor.clone(),
            model: self.model.clone(),
            serial_number: self.serial_number.clone(),
            firmware_version: self.firmware_version.clone(),
            session_history: self.session_history.clone(),
        }
    }

    pub fn apply_patch(&mut self, patch: StationPatch) {
        if let Some(name) = patch.name {
            self.name = Some(name);
        }
        if let Some(power) = patch.power_kw {
            self.power_kw = power;
        }
        if let Some(price) = patch.price_per_kwh {
            self.price_per_kwh = price;
        }
    }

    pub fn is_charging(&self) -> bool {
        self.current_transaction.is_some()
    }

    /// Liveness refresh shared by every inbound message.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_heartbeat = Some(now);
        self.message_count += 1;
    }

    pub fn mark_connected(&mut self, source: ConnectionSource, now: DateTime<Utc>) {
        self.connected = true;
        self.connection_source = source;
        self.connected_at = Some(now);
        self.last_heartbeat = Some(now);
        if matches!(self.status, StationStatus::Offline) {
            self.status = StationStatus::Available;
        }
    }

    pub fn mark_offline(&mut self) {
        self.connected = false;
        self.status = StationStatus::Offline;
    }

    /// Newest-first, bounded.
    pub fn push_session(&mut self, session: CompletedSession) {
        self.session_history.insert(0, session.clone());
        self.session_history.truncate(MAX_SESSION_HISTORY);
        self.last_transaction = Some(session);
    }

    pub fn push_meter_sample(&mut self, sample: MeterSample) {
        self.meter_history.push(sample);
        if self.meter_history.len() > MAX_METER_HISTORY {
            let excess = self.meter_history.len() - MAX_METER_HISTORY;
            self.meter_history.drain(..excess);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(id: i32) -> CompletedSession {
        let now = Utc::now();
        Transaction::new(id, "TAG", 0.0, now).finalize(0.0, now, 0.35)
    }

    #[test]
    fn session_history_is_newest_first_and_bounded() {
        let mut station = Station::new("CP1", 0.35);
        for id in 1..=51 {
            station.push_session(session(id));
        }
        assert_eq!(station.session_history.len(), MAX_SESSION_HISTORY);
        assert_eq!(station.session_history[0].id, 51);
        assert_eq!(station.session_history.last().unwrap().id, 2);
        assert_eq!(station.last_transaction.as_ref().unwrap().id, 51);
    }

    #[test]
    fn meter_history_keeps_latest_entries() {
        let mut station = Station::new("CP1", 0.35);
        let tx = Transaction::new(1, "TAG", 0.0, Utc::now());
        for i in 0..120 {
            let mut sample = tx.sample(Utc::now());
            sample.meter_value = i as f64;
            station.push_meter_sample(sample);
        }
        assert_eq!(station.meter_history.len(), MAX_METER_HISTORY);
        assert_eq!(station.meter_history[0].meter_value, 20.0);
    }

    #[test]
    fn record_round_trips_durable_fields() {
        let mut station = Station::from_new(
            NewStation {
                id: "CP2".into(),
                name: Some("Depot".into()),
                power_kw: Some(50.0),
                price_per_kwh: None,
            },
            0.35,
        );
        station.vendor = Some("ACME".into());
        station.connected = true;

        let restored = Station::from_record(station.record());
        assert_eq!(restored.name.as_deref(), Some("Depot"));
        assert_eq!(restored.power_kw, 50.0);
        assert_eq!(restored.price_per_kwh, 0.35);
        assert_eq!(restored.vendor.as_deref(), Some("ACME"));
        assert!(!restored.connected);
    }
}
