pub mod error;
pub mod events;
pub mod ocpp;
pub mod phase;
pub mod station;

pub use error::{DomainError, DomainResult, ErrorBody};
pub use ocpp::OcppVersion;
pub use phase::ConnectionPhase;
pub use station::{
    energy_kwh, Capabilities, CompletedSession, ConfigEntry, ConnectionSource, MeterReading,
    MeterSample, NewStation, Station, StationPatch, StationRecord, StationStatus, Transaction,
    DEFAULT_POWER_KW, MAX_METER_HISTORY, MAX_SESSION_HISTORY,
};
