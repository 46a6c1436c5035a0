mod model;
mod status;
mod transaction;

pub use model::{
    Capabilities, ConfigEntry, NewStation, Station, StationPatch, StationRecord,
    DEFAULT_POWER_KW, MAX_METER_HISTORY, MAX_SESSION_HISTORY,
};
pub use status::{ConnectionSource, StationStatus};
pub use transaction::{energy_kwh, CompletedSession, MeterReading, MeterSample, Transaction};
