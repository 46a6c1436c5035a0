//! Notification events
//!
//! Defines every event the core emits for observers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::phase::ConnectionPhase;
use crate::domain::station::{ConnectionSource, Station};

/// Event types for notifications
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Event {
    /// Fired after every registry mutation with the resulting snapshot.
    StationChanged(StationChangedEvent),
    StationRemoved(StationRemovedEvent),
    StationConnected(StationConnectedEvent),
    StationDisconnected(StationDisconnectedEvent),
    TransactionStarted(TransactionStartedEvent),
    TransactionStopped(TransactionStoppedEvent),
    MeterValuesReceived(MeterValuesEvent),
    ConnectionPhaseChanged(ConnectionPhaseChangedEvent),
}

impl Event {
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::StationChanged(_) => "station_changed",
            Event::StationRemoved(_) => "station_removed",
            Event::StationConnected(_) => "station_connected",
            Event::StationDisconnected(_) => "station_disconnected",
            Event::TransactionStarted(_) => "transaction_started",
            Event::TransactionStopped(_) => "transaction_stopped",
            Event::MeterValuesReceived(_) => "meter_values_received",
            Event::ConnectionPhaseChanged(_) => "connection_phase_changed",
        }
    }

    pub fn station_id(&self) -> &str {
        match self {
            Event::StationChanged(e) => &e.station.id,
            Event::StationRemoved(e) => &e.station_id,
            Event::StationConnected(e) => &e.station_id,
            Event::StationDisconnected(e) => &e.station_id,
            Event::TransactionStarted(e) => &e.station_id,
            Event::TransactionStopped(e) => &e.station_id,
            Event::MeterValuesReceived(e) => &e.station_id,
            Event::ConnectionPhaseChanged(e) => &e.station_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationChangedEvent {
    pub station: Box<Station>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationRemovedEvent {
    pub station_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationConnectedEvent {
    pub station_id: String,
    pub source: ConnectionSource,
    pub ocpp_version: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationDisconnectedEvent {
    pub station_id: String,
    pub source: ConnectionSource,
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionStartedEvent {
    pub station_id: String,
    pub transaction_id: i32,
    pub id_tag: String,
    pub meter_start: f64,
    pub source: ConnectionSource,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionStoppedEvent {
    pub station_id: String,
    pub transaction_id: i32,
    pub energy_delivered: String,
    pub cost: String,
    pub duration_secs: i64,
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeterValuesEvent {
    pub station_id: String,
    pub transaction_id: i32,
    pub meter_value: f64,
    pub power: f64,
    pub energy: f64,
    pub soc: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionPhaseChangedEvent {
    pub station_id: String,
    pub phase: ConnectionPhase,
    pub timestamp: DateTime<Utc>,
}

/// Wrapper for sending events with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMessage {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: Event,
}

impl EventMessage {
    pub fn new(event: Event) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event,
        }
    }
}
